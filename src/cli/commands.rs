use std::collections::BTreeMap;
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser::session::NodeBrowserSession;
use crate::browser::{CapturedPage, capture_page};
use crate::config::GeneratorConfig;
use crate::extract::page_model::PageAnalysis;
use crate::generate::pipeline::{Pipeline, PipelineSettings};
use crate::llm::{build_generator, retry_policy};
use crate::report::console::format_generation_report;
use crate::repo::access::{AppRepo, TestRepo};
use crate::repo::writer::ArtifactWriter;
use crate::trace::logger::PipelineTrace;

/// Characters of the application README passed to prompts.
const README_EXCERPT_CHARS: usize = 2000;

// ============================================================================
// analyze subcommand
// ============================================================================

/// Capture the page, analyse it and persist the analysis document.
pub async fn cmd_analyze(
    config: &GeneratorConfig,
    url: &str,
    markup: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = build_pipeline(config)?;
    let page = capture(config, url, markup).await?;
    let analysis = pipeline.analyze(url, &page.markup, page.probes).await?;
    let path = pipeline.writer().write_analysis(&analysis)?;

    println!(
        "Analysed {}: {} elements, {} forms, {} flows",
        analysis.url,
        analysis.elements.len(),
        analysis.forms.len(),
        analysis.flows.len()
    );
    for flow in &analysis.flows {
        println!("  - {} ({} steps)", flow.name, flow.steps.len());
    }
    println!("Wrote {}", path.display());
    Ok(())
}

// ============================================================================
// generate subcommand
// ============================================================================

/// Generate the suite and return whether every flow was written.
pub async fn cmd_generate(
    config: &GeneratorConfig,
    url: &str,
    analysis_path: Option<&Path>,
    markup: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<bool, Box<dyn std::error::Error>> {
    let pipeline = build_pipeline(config)?;

    let analysis = match analysis_path {
        Some(path) => {
            let analysis = read_analysis(path)?;
            if analysis.url != url {
                warn!(analysed = %analysis.url, requested = url, "analysis was captured from a different URL");
            }
            analysis
        }
        None => {
            let page = capture(config, url, markup).await?;
            let analysis = pipeline.analyze(url, &page.markup, page.probes).await?;
            if let Err(e) = pipeline.writer().write_analysis(&analysis) {
                warn!(error = %e, "could not persist analysis document");
            }
            analysis
        }
    };

    let report = pipeline.run(&analysis, cancel).await;
    print!("{}", format_generation_report(&report));
    Ok(report.all_written())
}

// ============================================================================
// init subcommand
// ============================================================================

pub fn cmd_init(config: &GeneratorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let app = open_app_repo(config)?;
    let repo = TestRepo::open(&config.repos.test_repo_path, app.as_ref())?;
    let writer = ArtifactWriter::new(repo);
    let created = writer.scaffold(&config.app_name)?;

    if created.is_empty() {
        println!("{} is already initialised", writer.repo().root().display());
    } else {
        println!("Initialised {}:", writer.repo().root().display());
        for path in &created {
            println!("  + {}", path.display());
        }
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn open_app_repo(config: &GeneratorConfig) -> Result<Option<AppRepo>, Box<dyn std::error::Error>> {
    match &config.repos.app_repo_path {
        Some(path) => Ok(Some(AppRepo::open(path)?)),
        None => Ok(None),
    }
}

/// Wire the repositories, generative client and trace into a pipeline.
pub fn build_pipeline(config: &GeneratorConfig) -> Result<Pipeline, Box<dyn std::error::Error>> {
    let app = open_app_repo(config)?;
    let repo = TestRepo::open(&config.repos.test_repo_path, app.as_ref())?;
    let app_context = app.as_ref().and_then(|a| a.readme_excerpt(README_EXCERPT_CHARS));

    let trace = match &config.trace_path {
        Some(path) => PipelineTrace::new(path),
        None => PipelineTrace::disabled(),
    };

    info!(
        provider = ?config.llm.provider,
        model = %config.llm.model,
        test_repo = %repo.root().display(),
        "pipeline ready"
    );

    Ok(Pipeline::new(
        build_generator(&config.llm),
        ArtifactWriter::new(repo),
        retry_policy(&config.llm),
        PipelineSettings::from_config(config),
    )
    .with_trace(trace)
    .with_app_context(app_context))
}

/// Page markup from a file, or from a live browser session.
async fn capture(
    config: &GeneratorConfig,
    url: &str,
    markup: Option<&Path>,
) -> Result<CapturedPage, Box<dyn std::error::Error>> {
    if let Some(path) = markup {
        return Ok(CapturedPage {
            url: url.to_string(),
            markup: std::fs::read_to_string(path)?,
            probes: BTreeMap::new(),
        });
    }

    let mut session = NodeBrowserSession::launch(&config.browser_script).await?;
    let captured = capture_page(&mut session, url).await;
    session.quit().await;
    Ok(captured?)
}

fn read_analysis(path: &Path) -> Result<PageAnalysis, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
