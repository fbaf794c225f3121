use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::GeneratorConfig;
use crate::error::{ExtractionError, FailureReason};
use crate::extract::extractor::{DEFAULT_MARKUP_BUDGET, analyze_markup};
use crate::extract::page_model::{PageAnalysis, UserFlow};
use crate::generate::bindings::{check_coverage, ensure_scenarios_binding, synthesize_stubs};
use crate::generate::cleaner::{ArtifactKind, Confidence, clean};
use crate::generate::common_steps::reuse_for_missing;
use crate::generate::flows::synthesize_flows;
use crate::generate::prompts::{BINDINGS_SYSTEM, SCENARIO_SYSTEM, bindings_prompt, scenario_prompt};
use crate::generate::scenario::{
    StepPhrase, extract_step_phrases, mentions_title, smoke_bindings, smoke_scenario,
    smoke_scenario_block,
};
use crate::generate::validator::validate_pair;
use crate::llm::client::{GenerationOptions, TextGenerator};
use crate::llm::retry::{RetryPolicy, complete_with_retry};
use crate::report::report_model::GenerationReport;
use crate::repo::writer::{ArtifactSlot, ArtifactWriter, plan_slots, url_slug};
use crate::trace::logger::PipelineTrace;
use crate::trace::trace::StageEvent;

/// Flow reference used for the generic pass.
pub const GENERIC_FLOW_REF: &str = "generic";

fn list_steps(steps: &[StepPhrase]) -> String {
    steps
        .iter()
        .map(|p| format!("{} {}", p.keyword.title(), p.phrase))
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Per-flow state machine
// ============================================================================

/// Stage of one flow's pipeline.
///
/// `Pending -> Analyzing -> SynthesizingScenario -> Cleaning ->
/// ExtractingSteps -> SynthesizingSteps -> Cleaning -> Validating ->
/// Written | Failed`. The generic pass skips `Analyzing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlowStage {
    Pending,
    Analyzing,
    SynthesizingScenario,
    Cleaning,
    ExtractingSteps,
    SynthesizingSteps,
    Validating,
    Written,
    Failed,
}

/// What one pipeline generates for: a detected flow or the whole page.
#[derive(Debug, Clone)]
pub enum FlowTarget {
    Detected(UserFlow),
    Generic,
}

impl FlowTarget {
    pub fn flow_ref(&self) -> &str {
        match self {
            FlowTarget::Detected(flow) => &flow.name,
            FlowTarget::Generic => GENERIC_FLOW_REF,
        }
    }

    pub fn flow(&self) -> Option<&UserFlow> {
        match self {
            FlowTarget::Detected(flow) => Some(flow),
            FlowTarget::Generic => None,
        }
    }

    /// Name the artifact slug is derived from.
    fn slug_base(&self, url: &str) -> String {
        match self {
            FlowTarget::Detected(flow) => flow.name.clone(),
            FlowTarget::Generic => url_slug(url),
        }
    }
}

/// A validated scenario document and the step module that binds it.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationArtifactPair {
    pub flow_ref: String,
    pub scenario_text: String,
    pub step_phrases: Vec<StepPhrase>,
    pub step_binding_text: String,
}

/// Terminal state of one flow.
#[derive(Debug, Clone)]
pub enum FlowOutcome {
    Written {
        flow_ref: String,
        scenario_path: PathBuf,
        steps_path: PathBuf,
        /// Non-fatal notes: low-confidence cleaning, stubs, fallbacks
        warnings: Vec<String>,
    },
    Failed {
        flow_ref: String,
        reason: FailureReason,
    },
}

impl FlowOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, FlowOutcome::Written { .. })
    }

    pub fn flow_ref(&self) -> &str {
        match self {
            FlowOutcome::Written { flow_ref, .. } | FlowOutcome::Failed { flow_ref, .. } => {
                flow_ref
            }
        }
    }
}

/// Tracks one flow through its stages; checks cancellation on every
/// transition.
struct FlowRun<'a> {
    flow_ref: String,
    cancel: CancellationToken,
    trace: &'a PipelineTrace,
    attempt: u32,
    stage: FlowStage,
    warnings: Vec<String>,
}

impl<'a> FlowRun<'a> {
    fn new(flow_ref: &str, cancel: CancellationToken, trace: &'a PipelineTrace) -> Self {
        let run = Self {
            flow_ref: flow_ref.to_string(),
            cancel,
            trace,
            attempt: 1,
            stage: FlowStage::Pending,
            warnings: Vec::new(),
        };
        run.record(None);
        run
    }

    fn check(&self, stage: FlowStage) -> Result<(), FailureReason> {
        if self.cancel.is_cancelled() {
            return Err(FailureReason::Cancelled(stage));
        }
        Ok(())
    }

    fn enter(&mut self, stage: FlowStage) -> Result<(), FailureReason> {
        self.check(stage)?;
        self.stage = stage;
        self.record(None);
        debug!(stage = ?stage, attempt = self.attempt, "stage");
        Ok(())
    }

    fn finish(&mut self, stage: FlowStage, detail: Option<String>) {
        self.stage = stage;
        self.record(detail);
    }

    fn record(&self, detail: Option<String>) {
        let mut event = StageEvent::now(&self.flow_ref, self.stage, self.attempt);
        if let Some(detail) = detail {
            event = event.with_detail(detail);
        }
        self.trace.log(&event);
    }

    fn warn(&mut self, warning: String) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Knobs that shape one generation run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub app_name: String,
    pub workers: usize,
    pub markup_budget: usize,
    pub flow_options: GenerationOptions,
    pub scenario_options: GenerationOptions,
    pub binding_options: GenerationOptions,
    /// Validation attempts per flow, the first included
    pub max_validation_attempts: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            app_name: "web application".to_string(),
            workers: 4,
            markup_budget: DEFAULT_MARKUP_BUDGET,
            flow_options: GenerationOptions {
                temperature: 0.3,
                max_tokens: 4000,
            },
            scenario_options: GenerationOptions {
                temperature: 0.6,
                max_tokens: 4000,
            },
            binding_options: GenerationOptions {
                temperature: 0.4,
                max_tokens: 4000,
            },
            max_validation_attempts: 2,
        }
    }
}

impl PipelineSettings {
    /// Structured stages run cooler than free-form scenario writing.
    pub fn from_config(config: &GeneratorConfig) -> Self {
        let llm = &config.llm;
        let at = |temperature: f32| GenerationOptions {
            temperature,
            max_tokens: llm.max_tokens,
        };
        Self {
            app_name: config.app_name.clone(),
            workers: config.workers.max(1),
            markup_budget: config.markup_budget,
            flow_options: at(llm.temperature.min(0.3)),
            scenario_options: at(llm.temperature),
            binding_options: at(llm.temperature.min(0.4)),
            max_validation_attempts: 2,
        }
    }
}

/// Page-to-suite generation: analysis, then one bounded-concurrency pipeline
/// per flow.
pub struct Pipeline {
    generator: Arc<dyn TextGenerator>,
    writer: Arc<ArtifactWriter>,
    policy: RetryPolicy,
    settings: PipelineSettings,
    trace: Arc<PipelineTrace>,
    app_context: Option<String>,
}

impl Pipeline {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        writer: ArtifactWriter,
        policy: RetryPolicy,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            generator,
            writer: Arc::new(writer),
            policy,
            settings,
            trace: Arc::new(PipelineTrace::disabled()),
            app_context: None,
        }
    }

    pub fn with_trace(mut self, trace: PipelineTrace) -> Self {
        self.trace = Arc::new(trace);
        self
    }

    /// Application notes (README excerpt) included in prompts.
    pub fn with_app_context(mut self, context: Option<String>) -> Self {
        self.app_context = context;
        self
    }

    pub fn writer(&self) -> &ArtifactWriter {
        &self.writer
    }

    /// Extract structure and synthesize flows. Only extraction can fail.
    pub async fn analyze(
        &self,
        url: &str,
        markup: &str,
        probes: BTreeMap<String, serde_json::Value>,
    ) -> Result<PageAnalysis, ExtractionError> {
        let mut analysis = analyze_markup(url, markup, probes, self.settings.markup_budget)?;
        analysis.flows = synthesize_flows(
            self.generator.as_ref(),
            &self.policy,
            &analysis,
            &self.settings.app_name,
            self.app_context.as_deref(),
            self.settings.flow_options,
        )
        .await;
        info!(
            url,
            elements = analysis.elements.len(),
            flows = analysis.flows.len(),
            "page analysed"
        );
        Ok(analysis)
    }

    /// Analyse, persist the analysis document, then generate every flow.
    pub async fn generate(
        &self,
        url: &str,
        markup: &str,
        probes: BTreeMap<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<GenerationReport, ExtractionError> {
        let analysis = self.analyze(url, markup, probes).await?;
        if let Err(e) = self.writer.write_analysis(&analysis) {
            warn!(error = %e, "could not persist analysis document");
        }
        Ok(self.run(&analysis, cancel).await)
    }

    /// Slots for each target, in target order.
    pub fn plan(&self, analysis: &PageAnalysis) -> Vec<(FlowTarget, ArtifactSlot)> {
        let targets: Vec<FlowTarget> = if analysis.flows.is_empty() {
            vec![FlowTarget::Generic]
        } else {
            analysis
                .flows
                .iter()
                .cloned()
                .map(FlowTarget::Detected)
                .collect()
        };
        let names: Vec<(String, String)> = targets
            .iter()
            .map(|t| (t.flow_ref().to_string(), t.slug_base(&analysis.url)))
            .collect();
        targets.into_iter().zip(plan_slots(&names)).collect()
    }

    /// Generate every planned flow with at most `workers` in flight.
    ///
    /// Each flow gets a child of `cancel`; outcomes come back in plan order.
    /// Zero detected flows means exactly one generic pass.
    pub async fn run(&self, analysis: &PageAnalysis, cancel: &CancellationToken) -> GenerationReport {
        let start = Instant::now();
        let planned = self.plan(analysis);
        info!(flows = planned.len(), workers = self.settings.workers, "generating");

        let outcomes: Vec<FlowOutcome> = stream::iter(planned)
            .map(|(target, slot)| {
                let token = cancel.child_token();
                async move { self.run_flow(analysis, &target, &slot, token).await }
            })
            .buffered(self.settings.workers.max(1))
            .collect()
            .await;

        GenerationReport::from_outcomes(&analysis.url, outcomes)
            .with_duration(start.elapsed().as_millis())
    }

    /// Run one flow to `Written` or `Failed`. Never panics a sibling.
    pub async fn run_flow(
        &self,
        analysis: &PageAnalysis,
        target: &FlowTarget,
        slot: &ArtifactSlot,
        cancel: CancellationToken,
    ) -> FlowOutcome {
        let span = info_span!("flow", flow = %target.flow_ref(), slug = %slot.slug);
        async move {
            let mut run = FlowRun::new(target.flow_ref(), cancel, &self.trace);

            let pair = match self.produce(&mut run, analysis, target, slot).await {
                Ok(pair) => pair,
                Err(reason) if !matches!(target, FlowTarget::Generic) => {
                    return self.fail(&mut run, reason);
                }
                Err(FailureReason::Cancelled(stage)) => {
                    return self.fail(&mut run, FailureReason::Cancelled(stage));
                }
                Err(reason) => {
                    warn!(error = %reason, "generic generation failed, using built-in smoke suite");
                    run.warn(format!(
                        "generative pass failed ({}); wrote built-in smoke scenario",
                        reason
                    ));
                    self.smoke_pair(analysis, slot)
                }
            };

            if let Err(reason) = run.check(FlowStage::Written) {
                return self.fail(&mut run, reason);
            }
            match self
                .writer
                .write_pair(slot, &pair.scenario_text, &pair.step_binding_text)
                .await
            {
                Ok((scenario_path, steps_path)) => {
                    run.finish(FlowStage::Written, None);
                    info!(
                        phrases = pair.step_phrases.len(),
                        warnings = run.warnings.len(),
                        "artifact pair written"
                    );
                    FlowOutcome::Written {
                        flow_ref: pair.flow_ref,
                        scenario_path,
                        steps_path,
                        warnings: run.warnings,
                    }
                }
                Err(e) => self.fail(&mut run, FailureReason::RepositoryWrite(e.to_string())),
            }
        }
        .instrument(span)
        .await
    }

    fn fail(&self, run: &mut FlowRun<'_>, reason: FailureReason) -> FlowOutcome {
        warn!(error = %reason, "flow failed");
        run.finish(FlowStage::Failed, Some(reason.to_string()));
        FlowOutcome::Failed {
            flow_ref: run.flow_ref.clone(),
            reason,
        }
    }

    /// Scenario, bindings and validation with bounded regeneration.
    async fn produce(
        &self,
        run: &mut FlowRun<'_>,
        analysis: &PageAnalysis,
        target: &FlowTarget,
        slot: &ArtifactSlot,
    ) -> Result<GenerationArtifactPair, FailureReason> {
        if let Some(flow) = target.flow() {
            run.enter(FlowStage::Analyzing)?;
            debug!(
                steps = flow.steps.len(),
                elements = flow.referenced_elements().len(),
                "flow context"
            );
        }

        let (mut scenario, mut phrases) = self.scenario(run, analysis, target).await?;
        let mut bindings = self.bindings(run, analysis, &scenario, &phrases, slot).await?;
        let attempts = self.settings.max_validation_attempts.max(1);

        loop {
            run.enter(FlowStage::Validating)?;
            let report = validate_pair(&scenario, &phrases, &bindings);
            if report.is_valid() {
                return Ok(GenerationArtifactPair {
                    flow_ref: target.flow_ref().to_string(),
                    scenario_text: scenario,
                    step_phrases: phrases,
                    step_binding_text: bindings,
                });
            }

            let details = report.describe();
            if run.attempt >= attempts {
                return Err(FailureReason::Validation {
                    attempts: run.attempt,
                    details,
                });
            }
            info!(attempt = run.attempt, details = %details, "validation failed, regenerating");
            run.attempt += 1;

            if report.scenario_invalid() {
                (scenario, phrases) = self.scenario(run, analysis, target).await?;
            }
            bindings = self.bindings(run, analysis, &scenario, &phrases, slot).await?;
        }
    }

    async fn scenario(
        &self,
        run: &mut FlowRun<'_>,
        analysis: &PageAnalysis,
        target: &FlowTarget,
    ) -> Result<(String, Vec<StepPhrase>), FailureReason> {
        run.enter(FlowStage::SynthesizingScenario)?;
        let prompt = scenario_prompt(
            analysis,
            target.flow(),
            &self.settings.app_name,
            self.app_context.as_deref(),
        );
        let raw = complete_with_retry(
            self.generator.as_ref(),
            SCENARIO_SYSTEM,
            &prompt,
            self.settings.scenario_options,
            &self.policy,
            "scenario",
        )
        .await
        .map_err(|source| FailureReason::GenerativeService {
            stage: FlowStage::SynthesizingScenario,
            source,
        })?;

        run.enter(FlowStage::Cleaning)?;
        let cleaned = clean(&raw, ArtifactKind::Scenario);
        if cleaned.confidence == Confidence::Low {
            run.warn("scenario cleaning found no feature boundary; response kept as-is".into());
        }
        let mut text = cleaned.text;

        run.enter(FlowStage::ExtractingSteps)?;
        let mut phrases = extract_step_phrases(&text);
        if phrases.is_empty() {
            return Err(FailureReason::NoStepPhrases);
        }

        if matches!(target, FlowTarget::Generic) && !mentions_title(&phrases) {
            text = format!("{}\n\n{}", text.trim_end(), smoke_scenario_block(analysis));
            phrases = extract_step_phrases(&text);
        }

        debug!(phrases = phrases.len(), "extracted step phrases");
        Ok((text, phrases))
    }

    async fn bindings(
        &self,
        run: &mut FlowRun<'_>,
        analysis: &PageAnalysis,
        scenario: &str,
        phrases: &[StepPhrase],
        slot: &ArtifactSlot,
    ) -> Result<String, FailureReason> {
        let feature_ref = slot.feature_ref();

        run.enter(FlowStage::SynthesizingSteps)?;
        let prompt = bindings_prompt(analysis, scenario, phrases, &feature_ref, &[]);
        let raw = self.request_bindings(&prompt).await?;

        run.enter(FlowStage::Cleaning)?;
        let mut code = self.clean_bindings(run, &raw, &feature_ref);
        let mut coverage = check_coverage(phrases, &code);

        if coverage.missing.is_empty() {
            return Ok(code);
        }

        info!(missing = coverage.missing.len(), "step coverage incomplete, retrying bindings");
        run.enter(FlowStage::SynthesizingSteps)?;
        let prompt = bindings_prompt(analysis, scenario, phrases, &feature_ref, &coverage.missing);
        match self.request_bindings(&prompt).await {
            Ok(raw) => {
                run.enter(FlowStage::Cleaning)?;
                let retried = self.clean_bindings(run, &raw, &feature_ref);
                let retried_coverage = check_coverage(phrases, &retried);
                if retried_coverage.missing.len() <= coverage.missing.len() {
                    code = retried;
                    coverage = retried_coverage;
                }
            }
            Err(e) => warn!(error = %e, "binding retry failed, keeping first attempt"),
        }

        // The common library is synchronous; async modules go straight to stubs.
        let async_style = code.contains("async def");
        if !coverage.missing.is_empty() && !async_style {
            let (common, bound) = reuse_for_missing(phrases, &coverage.missing);
            if !bound.is_empty() {
                code.push_str(&common);
                coverage.missing.retain(|p| !bound.contains(p));
                run.warn(format!(
                    "common step bindings added for {} step(s): {}",
                    bound.len(),
                    list_steps(&bound)
                ));
            }
        }

        if !coverage.missing.is_empty() {
            code.push_str(&synthesize_stubs(&coverage.missing, async_style));
            run.warn(format!(
                "stub bindings added for {} step(s): {}",
                coverage.missing.len(),
                list_steps(&coverage.missing)
            ));
        }
        Ok(code)
    }

    async fn request_bindings(&self, prompt: &str) -> Result<String, FailureReason> {
        complete_with_retry(
            self.generator.as_ref(),
            BINDINGS_SYSTEM,
            prompt,
            self.settings.binding_options,
            &self.policy,
            "bindings",
        )
        .await
        .map_err(|source| FailureReason::GenerativeService {
            stage: FlowStage::SynthesizingSteps,
            source,
        })
    }

    fn clean_bindings(&self, run: &mut FlowRun<'_>, raw: &str, feature_ref: &str) -> String {
        let cleaned = clean(raw, ArtifactKind::StepBinding);
        if cleaned.confidence == Confidence::Low {
            run.warn("step binding cleaning found no code boundary; response kept as-is".into());
        }
        let mut code = cleaned.text;
        if !code.contains("from pytest_bdd import") && !code.contains("import pytest_bdd") {
            code = format!("from pytest_bdd import given, when, then, parsers\n{}", code);
        }
        ensure_scenarios_binding(&code, feature_ref)
    }

    /// Built-in page-load and title pair for the generic slot.
    fn smoke_pair(&self, analysis: &PageAnalysis, slot: &ArtifactSlot) -> GenerationArtifactPair {
        let scenario_text = smoke_scenario(analysis);
        GenerationArtifactPair {
            flow_ref: GENERIC_FLOW_REF.to_string(),
            step_phrases: extract_step_phrases(&scenario_text),
            scenario_text,
            step_binding_text: smoke_bindings(&slot.feature_ref()),
        }
    }
}
