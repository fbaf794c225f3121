use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::config::{GeneratorConfig, LlmConfig, Provider, RepositoryLocation};
use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "frontend-tester.yaml";

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "frontend-tester",
    version,
    about = "Generate pytest-bdd suites from live web pages"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: frontend-tester.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Generative provider: ollama, openai or anthropic
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Model name
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Provider API endpoint
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Application repository (read-only context)
    #[arg(long, global = true)]
    pub app_repo: Option<PathBuf>,

    /// Test repository the suite is written to
    #[arg(long, global = true)]
    pub test_repo: Option<PathBuf>,

    /// Write a JSONL stage trace to this file
    #[arg(long, global = true)]
    pub trace: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture a page and persist its analysis document
    Analyze {
        /// Page URL
        url: String,

        /// Read page markup from a file instead of launching a browser
        #[arg(long)]
        markup: Option<PathBuf>,
    },

    /// Generate scenario and step files for every flow on a page
    Generate {
        /// Page URL
        url: String,

        /// Reuse a persisted analysis document instead of capturing the page
        #[arg(long)]
        analysis: Option<PathBuf>,

        /// Read page markup from a file instead of launching a browser
        #[arg(long, conflicts_with = "analysis")]
        markup: Option<PathBuf>,

        /// Concurrent flow pipelines
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Scaffold an empty test repository
    Init,
}

// ============================================================================
// Config File Model (optional YAML)
// ============================================================================

/// Optional YAML config file: `frontend-tester.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub repos: ReposSection,
    pub app_name: Option<String>,
    pub workers: Option<usize>,
    pub markup_budget: Option<usize>,
    pub trace_path: Option<PathBuf>,
    pub browser_script: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmSection {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReposSection {
    pub app_repo: Option<PathBuf>,
    pub test_repo: Option<PathBuf>,
}

// ============================================================================
// Config File Loading
// ============================================================================

/// Load the YAML config. A missing default file yields defaults; an
/// explicitly named file must exist and parse.
pub fn load_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let (config_path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };

    let content = match std::fs::read_to_string(&config_path) {
        Ok(content) => content,
        Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(FileConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: config_path,
                source: e,
            });
        }
    };

    if content.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: config_path,
        source: e,
    })
}

/// Values taken from the environment once, at startup.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    /// API keys keyed by provider
    pub api_keys: BTreeMap<Provider, String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let api_keys = [Provider::Ollama, Provider::OpenAi, Provider::Anthropic]
            .into_iter()
            .filter_map(|provider| {
                let value = std::env::var(provider.api_key_env()?).ok()?;
                (!value.trim().is_empty()).then(|| (provider, value.trim().to_string()))
            })
            .collect();
        Self { api_keys }
    }

    fn api_key(&self, provider: Provider) -> Option<String> {
        self.api_keys.get(&provider).cloned()
    }
}

// ============================================================================
// Config resolution (CLI > file > env > defaults)
// ============================================================================

/// Merge CLI flags, the config file and the environment into one explicit
/// `GeneratorConfig`.
pub fn resolve_config(
    cli: &Cli,
    file: &FileConfig,
    env: &EnvOverrides,
) -> Result<GeneratorConfig, ConfigError> {
    let test_repo = cli
        .test_repo
        .clone()
        .or_else(|| file.repos.test_repo.clone())
        .ok_or(ConfigError::MissingTestRepo)?;

    let mut config = GeneratorConfig::new(RepositoryLocation {
        app_repo_path: cli.app_repo.clone().or_else(|| file.repos.app_repo.clone()),
        test_repo_path: test_repo,
    });
    config.llm = resolve_llm(cli, &file.llm, env)?;

    if let Some(name) = &file.app_name {
        config.app_name = name.clone();
    }
    if let Some(workers) = file.workers {
        config.workers = workers.max(1);
    }
    if let Some(budget) = file.markup_budget {
        config.markup_budget = budget;
    }
    if let Some(script) = &file.browser_script {
        config.browser_script = script.clone();
    }
    config.trace_path = cli.trace.clone().or_else(|| file.trace_path.clone());

    Ok(config)
}

fn resolve_llm(cli: &Cli, file: &LlmSection, env: &EnvOverrides) -> Result<LlmConfig, ConfigError> {
    let defaults = LlmConfig::default();

    let provider = match cli.provider.as_deref().or(file.provider.as_deref()) {
        Some(name) => name.parse::<Provider>()?,
        None => defaults.provider,
    };

    // Endpoint and model defaults belong to the provider that was picked.
    let endpoint = cli
        .endpoint
        .clone()
        .or_else(|| file.endpoint.clone())
        .unwrap_or_else(|| provider.default_endpoint().to_string());
    let model = cli
        .model
        .clone()
        .or_else(|| file.model.clone())
        .unwrap_or_else(|| default_model(provider).to_string());

    Ok(LlmConfig {
        provider,
        model,
        endpoint,
        api_key: file.api_key.clone().or_else(|| env.api_key(provider)),
        temperature: file.temperature.unwrap_or(defaults.temperature),
        max_tokens: file.max_tokens.unwrap_or(defaults.max_tokens),
        timeout: file
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout),
        max_retries: file.max_retries.unwrap_or(defaults.max_retries),
    })
}

fn default_model(provider: Provider) -> &'static str {
    match provider {
        Provider::Ollama => "qwen2.5:1.5b",
        Provider::OpenAi => "gpt-4o-mini",
        Provider::Anthropic => "claude-3-5-haiku-latest",
    }
}
