use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::generate::pipeline::FlowStage;

// ============================================================================
// Structural extraction
// ============================================================================

/// Page markup could not be turned into structural data. Fatal to the whole
/// run: no flow can proceed without it.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("page markup is empty")]
    EmptyMarkup,

    #[error("page markup is not parsable as HTML: {0}")]
    Unparsable(String),

    #[error("browser capture failed: {0}")]
    Browser(#[from] BrowserError),
}

// ============================================================================
// Generative service
// ============================================================================

/// Failure of a single call to the generative text service.
///
/// Each variant is either transient (worth retrying with backoff) or
/// permanent; see [`GenerationError::is_transient`].
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("generative call timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited by provider (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("provider server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    #[error("could not reach provider: {0}")]
    Connect(String),

    #[error("provider rejected credentials (HTTP {status})")]
    Auth { status: u16 },

    #[error("provider rejected request (HTTP {status}): {body}")]
    BadRequest { status: u16, body: String },

    #[error("undecodable provider response: {0}")]
    Decode(String),

    #[error("generator unavailable: {0}")]
    Unavailable(String),
}

impl GenerationError {
    /// Timeouts (including HTTP 408), rate limits, 5xx and connection failures
    /// are retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationError::Timeout(_)
                | GenerationError::RateLimited { .. }
                | GenerationError::Server { .. }
                | GenerationError::Connect(_)
        )
    }

    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            408 => GenerationError::Timeout(Duration::ZERO),
            429 => GenerationError::RateLimited { status },
            401 | 403 => GenerationError::Auth { status },
            s if s >= 500 => GenerationError::Server { status, body },
            _ => GenerationError::BadRequest { status, body },
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenerationError::Timeout(Duration::ZERO)
        } else if e.is_connect() {
            GenerationError::Connect(e.to_string())
        } else if e.is_decode() {
            GenerationError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            GenerationError::from_status(status.as_u16(), e.to_string())
        } else {
            GenerationError::Connect(e.to_string())
        }
    }
}

// ============================================================================
// Browser automation
// ============================================================================

#[derive(Debug, Error)]
pub enum BrowserError {
    /// Node.js subprocess failed to spawn
    #[error("failed to spawn {script} (is Node.js installed?): {source}")]
    Spawn {
        script: String,
        #[source]
        source: std::io::Error,
    },

    #[error("browser session I/O failed: {0}")]
    SessionIo(String),

    #[error("browser command '{command}' failed: {error}")]
    Protocol { command: String, error: String },

    #[error("JSON error ({context}): {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Repositories
// ============================================================================

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("test repository {test} overlaps application repository {app}")]
    Overlap { app: PathBuf, test: PathBuf },

    #[error("path {0} escapes the repository root")]
    OutsideRoot(PathBuf),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("analysis document {path} is invalid: {source}")]
    AnalysisFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("write task aborted: {0}")]
    Task(String),
}

impl RepositoryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RepositoryError::Io {
            path: path.into(),
            source,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown provider '{0}' (expected ollama, openai or anthropic)")]
    UnknownProvider(String),

    #[error("test repository path is required (--test-repo or repos.test_repo)")]
    MissingTestRepo,
}

// ============================================================================
// Per-flow failure diagnostics
// ============================================================================

/// Why a single flow ended in `Failed`. Sibling flows are unaffected.
#[derive(Debug, Clone, Error)]
pub enum FailureReason {
    #[error("generative service failed during {stage:?}: {source}")]
    GenerativeService {
        stage: FlowStage,
        #[source]
        source: GenerationError,
    },

    #[error("scenario document contained no step phrases")]
    NoStepPhrases,

    #[error("validation failed after {attempts} attempts: {details}")]
    Validation { attempts: u32, details: String },

    #[error("repository write failed: {0}")]
    RepositoryWrite(String),

    #[error("cancelled before {0:?}")]
    Cancelled(FlowStage),
}
