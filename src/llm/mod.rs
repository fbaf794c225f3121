use std::sync::Arc;

use crate::config::LlmConfig;
use crate::llm::client::{HttpGenerator, TextGenerator};
use crate::llm::retry::RetryPolicy;

pub mod client;
pub mod retry;
pub mod scripted;

/// HTTP generator for the configured provider.
pub fn build_generator(config: &LlmConfig) -> Arc<dyn TextGenerator> {
    Arc::new(HttpGenerator::new(config))
}

pub fn retry_policy(config: &LlmConfig) -> RetryPolicy {
    RetryPolicy {
        timeout: config.timeout,
        max_retries: config.max_retries,
        ..RetryPolicy::default()
    }
}
