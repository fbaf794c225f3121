use crate::generate::pipeline::FlowOutcome;

// ============================================================================
// Generation report: aggregates per-flow outcomes
// ============================================================================

/// Result of one generation run over a page.
///
/// Built from the per-flow outcomes via `from_outcomes()`. Partial success
/// is normal: some flows may be `Written` while siblings `Failed`.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    /// Page the suite was generated for
    pub url: String,

    pub total: usize,

    /// Flows whose artifact pair was persisted
    pub written: usize,

    pub failed: usize,

    /// Total run duration in milliseconds (optional)
    pub duration_ms: Option<u128>,

    /// Per-flow outcomes in planning order
    pub outcomes: Vec<FlowOutcome>,
}

impl GenerationReport {
    pub fn from_outcomes(url: &str, outcomes: Vec<FlowOutcome>) -> Self {
        let total = outcomes.len();
        let written = outcomes.iter().filter(|o| o.is_written()).count();
        Self {
            url: url.to_string(),
            total,
            written,
            failed: total - written,
            duration_ms: None,
            outcomes,
        }
    }

    pub fn with_duration(mut self, duration_ms: u128) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn all_written(&self) -> bool {
        self.failed == 0
    }
}
