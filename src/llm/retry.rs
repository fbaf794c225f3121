use std::time::Duration;

use tracing::warn;

use crate::error::GenerationError;
use crate::llm::client::{GenerationOptions, TextGenerator};

/// Timeout and retry budget applied to every generative call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_retries: 2,
            base_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff; rate limits wait one step longer.
    pub fn backoff(&self, attempt: u32, error: &GenerationError) -> Duration {
        let exponent = match error {
            GenerationError::RateLimited { .. } => attempt + 1,
            _ => attempt,
        };
        self.base_backoff.saturating_mul(2u32.saturating_pow(exponent))
    }
}

/// Call the generator with a per-call timeout, retrying transient failures.
///
/// Permanent errors (auth, bad request, decode) are returned immediately.
/// `context` names the calling stage in log lines.
pub async fn complete_with_retry(
    generator: &dyn TextGenerator,
    system_prompt: &str,
    user_prompt: &str,
    options: GenerationOptions,
    policy: &RetryPolicy,
    context: &str,
) -> Result<String, GenerationError> {
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(
            policy.timeout,
            generator.complete(system_prompt, user_prompt, options),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(policy.timeout)),
        };

        match result {
            Ok(text) => return Ok(text),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let wait = policy.backoff(attempt, &e);
                warn!(
                    context,
                    attempt = attempt + 1,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "transient generative failure, retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
