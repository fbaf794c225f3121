use frontend_tester::error::GenerationError;
use frontend_tester::extract::page_model::{ActionKind, ElementId};
use frontend_tester::generate::flows::{first_balanced_json, parse_flows, synthesize_flows};
use frontend_tester::llm::client::GenerationOptions;
use frontend_tester::llm::scripted::ScriptedGenerator;

mod common;
use crate::common::utils::{LOGIN_FLOWS, fast_policy, login_analysis};

const OPTIONS: GenerationOptions = GenerationOptions {
    temperature: 0.3,
    max_tokens: 1000,
};

// ============================================================================
// JSON isolation
// ============================================================================

#[test]
fn balanced_json_ignores_brackets_in_strings() {
    let raw = r#"Flows: [{"name": "a ] tricky {name}", "steps": []}] trailing ]"#;
    assert_eq!(
        first_balanced_json(raw),
        Some(r#"[{"name": "a ] tricky {name}", "steps": []}]"#)
    );
}

#[test]
fn unclosed_json_yields_none() {
    assert_eq!(first_balanced_json("[{\"name\": \"x\""), None);
    assert_eq!(first_balanced_json("no json at all"), None);
}

// ============================================================================
// Tolerant flow parsing
// ============================================================================

#[test]
fn login_flow_resolves_targets() {
    let analysis = login_analysis();
    let flows = parse_flows(LOGIN_FLOWS, &analysis.elements);
    assert_eq!(flows.len(), 1);

    let flow = &flows[0];
    assert_eq!(flow.name, "Login");
    assert_eq!(flow.steps.len(), 5);
    let kinds: Vec<ActionKind> = flow.steps.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ActionKind::Navigate,
            ActionKind::Fill,
            ActionKind::Fill,
            ActionKind::Click,
            ActionKind::Assert,
        ]
    );
    assert_eq!(flow.steps[1].targets, vec![ElementId(2)]);
    assert_eq!(flow.steps[1].value.as_deref(), Some("alice"));
    assert_eq!(flow.steps[2].targets, vec![ElementId(3)]);
    assert_eq!(flow.steps[3].targets, vec![ElementId(4)]);
    assert_eq!(
        flow.referenced_elements(),
        vec![ElementId(2), ElementId(3), ElementId(4)]
    );
}

#[test]
fn wrapped_object_and_prose_are_tolerated() {
    let raw = r#"Here are the flows I found:
```json
{"user_flows": [
  {"title": "Get help", "summary": "Open the help page",
   "steps": ["Click the Help link", {"type": "verify", "text": "Help page is shown"}]}
]}
```"#;
    let analysis = login_analysis();
    let flows = parse_flows(raw, &analysis.elements);
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].name, "Get help");
    assert_eq!(flows[0].description, "Open the help page");
    assert_eq!(flows[0].steps[0].kind, ActionKind::Click);
    assert_eq!(flows[0].steps[1].kind, ActionKind::Assert);
}

#[test]
fn single_flow_object_is_accepted() {
    let raw = r#"{"steps": [{"action": "click", "target": 1}]}"#;
    let analysis = login_analysis();
    let flows = parse_flows(raw, &analysis.elements);
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].name, "Flow 1");
    assert_eq!(flows[0].steps[0].targets, vec![ElementId(1)]);
}

#[test]
fn label_targets_match_case_insensitively() {
    let raw = r#"[{"name": "Sign in", "steps": [{"action": "click", "target": "SIGN IN"}]}]"#;
    let analysis = login_analysis();
    let flows = parse_flows(raw, &analysis.elements);
    assert_eq!(flows[0].steps[0].targets, vec![ElementId(4)]);
}

#[test]
fn unknown_targets_are_dropped_not_fatal() {
    let raw = r##"[{"name": "X", "steps": [{"action": "click", "target": "#nope"}, {"action": "click", "target": 99}]}]"##;
    let analysis = login_analysis();
    let flows = parse_flows(raw, &analysis.elements);
    assert_eq!(flows[0].steps.len(), 2);
    assert!(flows[0].steps.iter().all(|s| s.targets.is_empty()));
}

#[test]
fn flows_without_usable_steps_are_dropped() {
    let raw = r##"[
      {"name": "Empty", "steps": []},
      {"name": "Junk", "steps": [42, {"target": "#username"}]},
      {"name": "No steps"},
      {"name": "Kept", "steps": ["Open the page"]}
    ]"##;
    let analysis = login_analysis();
    let flows = parse_flows(raw, &analysis.elements);
    let names: Vec<&str> = flows.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["Kept"]);
}

#[test]
fn malformed_responses_yield_zero_flows() {
    let analysis = login_analysis();
    for raw in ["", "I found no flows.", "[{\"name\": ", "{\"other\": 1}", "[1, 2, 3]"] {
        assert!(parse_flows(raw, &analysis.elements).is_empty(), "for {:?}", raw);
    }
}

// ============================================================================
// Synthesis against a scripted service
// ============================================================================

#[tokio::test]
async fn synthesis_parses_service_response() {
    let generator = ScriptedGenerator::new().on("user flow analyst", LOGIN_FLOWS);
    let analysis = login_analysis();

    let flows = synthesize_flows(&generator, &fast_policy(), &analysis, "Acme", Some("Acme is a shop"), OPTIONS).await;
    assert_eq!(flows.len(), 1);

    let prompt = &generator.calls()[0];
    assert!(prompt.contains("Application: Acme"));
    assert!(prompt.contains("Acme is a shop"));
    assert!(prompt.contains("[2] Input type=text \"Username\" -> #username"));
}

#[tokio::test]
async fn synthesis_failure_is_soft() {
    let generator = ScriptedGenerator::new().then_fail(GenerationError::Auth { status: 401 });
    let analysis = login_analysis();

    let flows = synthesize_flows(&generator, &fast_policy(), &analysis, "Acme", None, OPTIONS).await;
    assert!(flows.is_empty());
    assert_eq!(generator.call_count(), 1);
}
