use serde_json::Value;
use tracing::{debug, warn};

use crate::extract::page_model::{ActionKind, ActionStep, Element, ElementId, PageAnalysis, UserFlow};
use crate::generate::prompts::{FLOWS_SYSTEM, flows_prompt};
use crate::llm::client::{GenerationOptions, TextGenerator};
use crate::llm::retry::{RetryPolicy, complete_with_retry};

/// Ask the generative service for user flows on the analysed page.
///
/// Every failure here is soft: an unreachable service or a malformed
/// response yields zero flows and the caller falls back to the generic pass.
pub async fn synthesize_flows(
    generator: &dyn TextGenerator,
    policy: &RetryPolicy,
    analysis: &PageAnalysis,
    app_name: &str,
    app_context: Option<&str>,
    options: GenerationOptions,
) -> Vec<UserFlow> {
    let prompt = flows_prompt(analysis, app_name, app_context);
    let raw = match complete_with_retry(generator, FLOWS_SYSTEM, &prompt, options, policy, "flows")
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "flow synthesis failed, continuing with zero flows");
            return Vec::new();
        }
    };

    let flows = parse_flows(&raw, &analysis.elements);
    debug!(count = flows.len(), "synthesized flows");
    flows
}

/// Slice of `raw` from the first `[` or `{` to its matching closer.
///
/// Brackets inside JSON strings are ignored. Returns `None` when no opener
/// exists or it is never closed.
pub fn first_balanced_json(raw: &str) -> Option<&str> {
    let start = raw.find(['[', '{'])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in raw[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&raw[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Tolerant parse of a flow list.
///
/// Accepts an array of flows, an object wrapping one (`user_flows` or
/// `flows`) or a single flow object. Steps may be plain strings or objects.
/// Flows left without a usable step are dropped.
pub fn parse_flows(raw: &str, elements: &[Element]) -> Vec<UserFlow> {
    let Some(json) = first_balanced_json(raw) else {
        debug!("flow response contains no JSON");
        return Vec::new();
    };
    let value: Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "flow response is not valid JSON");
            return Vec::new();
        }
    };

    let items = match &value {
        Value::Array(items) => items.clone(),
        Value::Object(map) => match map.get("user_flows").or_else(|| map.get("flows")) {
            Some(Value::Array(items)) => items.clone(),
            _ if map.contains_key("steps") => vec![value.clone()],
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let flow = parse_flow(item, index, elements);
            if flow.is_none() {
                debug!(index, "dropping low-confidence flow without usable steps");
            }
            flow
        })
        .collect()
}

fn string_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_flow(item: &Value, index: usize, elements: &[Element]) -> Option<UserFlow> {
    let steps: Vec<ActionStep> = item
        .get("steps")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|step| parse_step(step, elements))
        .collect();
    if steps.is_empty() {
        return None;
    }

    let name = string_field(item, &["name", "title"])
        .map(str::to_string)
        .unwrap_or_else(|| format!("Flow {}", index + 1));

    Some(UserFlow {
        name,
        description: string_field(item, &["description", "summary"])
            .unwrap_or_default()
            .to_string(),
        steps,
    })
}

fn parse_step(step: &Value, elements: &[Element]) -> Option<ActionStep> {
    if let Some(text) = step.as_str().map(str::trim).filter(|s| !s.is_empty()) {
        return Some(ActionStep {
            kind: infer_kind(text),
            description: text.to_string(),
            targets: Vec::new(),
            value: None,
        });
    }

    step.as_object()?;
    let action = string_field(step, &["action", "type", "kind"]);
    let description = string_field(step, &["description", "text"]);
    if action.is_none() && description.is_none() {
        return None;
    }

    let kind = action.map(parse_kind).unwrap_or_else(|| infer_kind(description.unwrap_or_default()));
    let targets = ["target", "element", "selector", "identifier"]
        .iter()
        .filter_map(|k| step.get(*k))
        .filter_map(|t| resolve_target(t, elements))
        .take(1)
        .collect();
    let value = step.get("value").and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    });

    Some(ActionStep {
        kind,
        description: description
            .or(action)
            .unwrap_or_default()
            .to_string(),
        targets,
        value,
    })
}

fn parse_kind(action: &str) -> ActionKind {
    match action.to_ascii_lowercase().as_str() {
        "navigate" | "goto" | "open" | "visit" => ActionKind::Navigate,
        "click" | "press" | "submit" | "tap" => ActionKind::Click,
        "fill" | "type" | "input" | "enter" => ActionKind::Fill,
        "select" | "choose" | "check" => ActionKind::Select,
        "assert" | "verify" | "expect" | "see" => ActionKind::Assert,
        other => infer_kind(other),
    }
}

fn infer_kind(text: &str) -> ActionKind {
    let lower = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has(&["navigate", "go to", "open", "visit"]) {
        ActionKind::Navigate
    } else if has(&["fill", "type", "enter"]) {
        ActionKind::Fill
    } else if has(&["select", "choose"]) {
        ActionKind::Select
    } else if has(&["click", "press", "submit", "tap"]) {
        ActionKind::Click
    } else if has(&["verify", "should", "see", "assert", "expect", "check"]) {
        ActionKind::Assert
    } else {
        ActionKind::Other
    }
}

/// Resolve a target reference: selector value, id, name, label or index.
fn resolve_target(target: &Value, elements: &[Element]) -> Option<ElementId> {
    if let Some(index) = target.as_u64() {
        return elements
            .get(usize::try_from(index).ok()?)
            .map(|e| e.id);
    }
    let needle = target.as_str()?.trim();
    if needle.is_empty() {
        return None;
    }
    if let Some(index) = needle
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .and_then(|s| s.parse::<usize>().ok())
    {
        return elements.get(index).map(|e| e.id);
    }

    let bare = needle.trim_start_matches('#');
    elements
        .iter()
        .find(|e| e.selectors.iter().any(|s| s.value == needle))
        .or_else(|| elements.iter().find(|e| e.attribute("id") == Some(bare)))
        .or_else(|| elements.iter().find(|e| e.attribute("name") == Some(needle)))
        .or_else(|| {
            elements
                .iter()
                .find(|e| !e.label().is_empty() && e.label().eq_ignore_ascii_case(needle))
        })
        .map(|e| e.id)
}
