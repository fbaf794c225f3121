use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::extract::extractor::DEFAULT_MARKUP_BUDGET;

// ============================================================================
// Generative service
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ollama,
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn default_endpoint(self) -> &'static str {
        match self {
            Provider::Ollama => "http://localhost:11434",
            Provider::OpenAi => "https://api.openai.com",
            Provider::Anthropic => "https://api.anthropic.com",
        }
    }

    /// Environment variable holding the provider's API key, if it takes one.
    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            Provider::Ollama => None,
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
        }
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Scenario temperature; flow and binding stages clamp it lower
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            model: "qwen2.5:1.5b".to_string(),
            endpoint: Provider::Ollama.default_endpoint().to_string(),
            api_key: None,
            temperature: 0.6,
            max_tokens: 4000,
            timeout: Duration::from_secs(120),
            max_retries: 2,
        }
    }
}

// ============================================================================
// Repositories and run settings
// ============================================================================

/// Where the application under test lives (read-only, optional) and where
/// the generated suite goes.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryLocation {
    pub app_repo_path: Option<PathBuf>,
    pub test_repo_path: PathBuf,
}

/// Fully resolved settings for one generation run.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub llm: LlmConfig,
    pub repos: RepositoryLocation,
    /// Used in prompts and the scaffolded conftest
    pub app_name: String,
    /// Concurrent flow pipelines
    pub workers: usize,
    pub markup_budget: usize,
    /// JSONL stage trace, disabled when `None`
    pub trace_path: Option<PathBuf>,
    /// Node.js browser server used by `analyze`/`generate`
    pub browser_script: PathBuf,
}

impl GeneratorConfig {
    pub fn new(repos: RepositoryLocation) -> Self {
        Self {
            llm: LlmConfig::default(),
            repos,
            app_name: "web application".to_string(),
            workers: 4,
            markup_budget: DEFAULT_MARKUP_BUDGET,
            trace_path: None,
            browser_script: PathBuf::from(crate::browser::session::DEFAULT_SERVER_SCRIPT),
        }
    }
}
