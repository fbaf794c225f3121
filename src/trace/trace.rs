use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::generate::pipeline::FlowStage;

/// One stage transition of one flow pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct StageEvent {
    pub timestamp_ms: u128,
    pub flow: String,
    pub stage: FlowStage,
    pub attempt: u32,
    pub detail: Option<String>,
}

impl StageEvent {
    pub fn now(flow: &str, stage: FlowStage, attempt: u32) -> Self {
        Self {
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default(),
            flow: flow.to_string(),
            stage,
            attempt,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl ToString) -> Self {
        self.detail = Some(detail.to_string());
        self
    }
}
