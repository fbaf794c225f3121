use crate::extract::page_model::{PageAnalysis, UserFlow};
use crate::generate::scenario::StepPhrase;

// ============================================================================
// System prompts
// ============================================================================

pub const FLOWS_SYSTEM: &str = "You are a user flow analyst for web applications. \
Given a page's simplified HTML and its interactive element inventory, list the \
distinct end-to-end user flows a tester should cover. Respond with ONLY a JSON \
array, no prose and no code fences. Each flow is an object: \
{\"name\": \"...\", \"description\": \"...\", \"steps\": [{\"action\": \
\"navigate|click|fill|select|assert\", \"target\": \"<selector or element index>\", \
\"value\": \"optional\", \"description\": \"...\"}]}.";

pub const SCENARIO_SYSTEM: &str = "You are a BDD scenario author. Write one Gherkin \
feature file for the requested flow. Use Feature:, Scenario: and Given/When/Then/And \
steps. Put concrete values in double quotes so they can be parameterized. Output ONLY \
the feature file, no explanations and no markdown fences.";

pub const BINDINGS_SYSTEM: &str = "You are a pytest-bdd step definition author using \
Playwright's synchronous `page` fixture. Write one Python module implementing every \
listed step with @given/@when/@then decorators; use parsers.parse with \"{name}\" \
fields where a step contains quoted values. Use the provided selectors. Output ONLY \
Python code, no explanations and no markdown fences.";

// ============================================================================
// User prompts
// ============================================================================

/// One line per element: index, role, label and its most stable selector.
pub fn element_inventory(analysis: &PageAnalysis) -> String {
    if analysis.elements.is_empty() {
        return "(no interactive elements)".to_string();
    }
    analysis
        .elements
        .iter()
        .map(|e| {
            let selector = e.best_selector().map(|s| s.value.as_str()).unwrap_or("");
            let kind = e
                .attribute("type")
                .map(|t| format!(" type={}", t))
                .unwrap_or_default();
            format!(
                "[{}] {:?}{} \"{}\" -> {}",
                e.id.0,
                e.role,
                kind,
                e.label(),
                selector
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn context_block(app_context: Option<&str>) -> String {
    match app_context {
        Some(ctx) if !ctx.trim().is_empty() => {
            format!("\nApplication notes (from its repository):\n{}\n", ctx.trim())
        }
        _ => String::new(),
    }
}

pub fn flows_prompt(analysis: &PageAnalysis, app_name: &str, app_context: Option<&str>) -> String {
    format!(
        "Application: {}\nURL: {}\nTitle: {}\n{}\nInteractive elements:\n{}\n\nSimplified HTML:\n{}\n\nList the user flows as a JSON array.",
        app_name,
        analysis.url,
        analysis.title,
        context_block(app_context),
        element_inventory(analysis),
        analysis.simplified_markup
    )
}

fn describe_flow(flow: &UserFlow, analysis: &PageAnalysis) -> String {
    let steps = flow
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let targets = step
                .targets
                .iter()
                .filter_map(|id| analysis.element(*id))
                .map(|e| {
                    let selector = e.best_selector().map(|s| s.value.as_str()).unwrap_or("");
                    format!("\"{}\" ({})", e.label(), selector)
                })
                .collect::<Vec<_>>()
                .join(", ");
            let value = step
                .value
                .as_deref()
                .map(|v| format!(" value=\"{}\"", v))
                .unwrap_or_default();
            format!(
                "{}. {:?}: {}{}{}",
                i + 1,
                step.kind,
                step.description,
                if targets.is_empty() { String::new() } else { format!(" on {}", targets) },
                value
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("Flow: {}\nDescription: {}\nSteps:\n{}", flow.name, flow.description, steps)
}

/// Scenario request for a detected flow, or the generic page when `flow` is
/// `None`.
pub fn scenario_prompt(
    analysis: &PageAnalysis,
    flow: Option<&UserFlow>,
    app_name: &str,
    app_context: Option<&str>,
) -> String {
    let subject = match flow {
        Some(flow) => describe_flow(flow, analysis),
        None => "Flow: generic page checks\nNo specific user flow was detected. Write scenarios \
that open the page, verify it loads and check the page title, then exercise the most \
prominent interactive elements."
            .to_string(),
    };

    format!(
        "Application: {}\nURL: {}\nTitle: {}\n{}\n{}\n\nInteractive elements:\n{}\n\nThe first step of every scenario must be: Given I am on \"{}\"",
        app_name,
        analysis.url,
        analysis.title,
        context_block(app_context),
        subject,
        element_inventory(analysis),
        analysis.url
    )
}

pub fn bindings_prompt(
    analysis: &PageAnalysis,
    scenario_text: &str,
    phrases: &[StepPhrase],
    feature_rel_path: &str,
    missing: &[StepPhrase],
) -> String {
    let steps = phrases
        .iter()
        .map(|p| format!("- {} {}", p.keyword.title(), p.phrase))
        .collect::<Vec<_>>()
        .join("\n");

    let retry = if missing.is_empty() {
        String::new()
    } else {
        let list = missing
            .iter()
            .map(|p| format!("- {} {}", p.keyword.title(), p.phrase))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "\nA previous attempt left these steps without a binding. Bind every one of them:\n{}\n",
            list
        )
    };

    format!(
        "Feature file:\n{}\nSteps to implement (each needs exactly one binding):\n{}\n{}\nSelectors:\n{}\n\nThe module must call scenarios(\"{}\").",
        scenario_text.trim_end(),
        steps,
        retry,
        element_inventory(analysis),
        feature_rel_path
    )
}
