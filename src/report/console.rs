use crate::generate::pipeline::FlowOutcome;
use crate::report::report_model::GenerationReport;

// ============================================================================
// Console reporter: formatted terminal output
// ============================================================================

/// Format a generation report for terminal output.
///
/// Produces output like:
/// ```text
/// === Generated suite: https://example.com/login ===
///
/// ✓ WRITTEN  Login -> features/login.feature, steps/test_login.py
///     [WARN] stub bindings added for 1 step(s)
/// ✗ FAILED   Checkout
///     [ERROR] validation failed after 2 attempts: ...
///
/// === Results: 1 written, 1 failed (2 total) ===
/// ```
pub fn format_generation_report(report: &GenerationReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== Generated suite: {} ===\n\n", report.url));

    for outcome in &report.outcomes {
        match outcome {
            FlowOutcome::Written {
                flow_ref,
                scenario_path,
                steps_path,
                warnings,
            } => {
                out.push_str(&format!(
                    "\u{2713} WRITTEN  {} -> {}, {}\n",
                    flow_ref,
                    scenario_path.display(),
                    steps_path.display()
                ));
                for warning in warnings {
                    out.push_str(&format!("    [WARN] {}\n", warning));
                }
            }
            FlowOutcome::Failed { flow_ref, reason } => {
                out.push_str(&format!("\u{2717} FAILED   {}\n", flow_ref));
                out.push_str(&format!("    [ERROR] {}\n", reason));
            }
        }
    }

    out.push_str(&format!(
        "\n=== Results: {} written, {} failed ({} total)",
        report.written, report.failed, report.total
    ));

    if let Some(ms) = report.duration_ms {
        let secs = ms as f64 / 1000.0;
        out.push_str(&format!(" in {:.1}s", secs));
    }

    out.push_str(" ===\n");

    out
}
