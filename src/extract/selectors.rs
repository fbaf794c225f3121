use std::collections::BTreeMap;

use crate::extract::page_model::{ElementRole, SelectorCandidate, SelectorStrategy};

/// Dedicated test attributes, checked in this order.
pub const TEST_ID_ATTRIBUTES: [&str; 5] = [
    "data-testid",
    "data-test-id",
    "data-test",
    "data-cy",
    "data-qa",
];

/// Derive ranked locators for one element.
///
/// Order is fixed: `id` attribute > test attribute > `name` > visible text >
/// structural path. The structural path is always present, so the result is
/// never empty. Only the ordered attribute map is consulted, so identical
/// input always yields identical output.
pub fn derive_selectors(
    role: ElementRole,
    tag: &str,
    attributes: &BTreeMap<String, String>,
    text: &str,
    structural_path: &str,
) -> Vec<SelectorCandidate> {
    let attr = |name: &str| {
        attributes
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    let mut candidates = Vec::new();

    if let Some(id) = attr("id") {
        let value = if is_plain_ident(id) {
            format!("#{}", id)
        } else {
            format!("[id={}]", css_quote(id))
        };
        candidates.push(SelectorCandidate::new(SelectorStrategy::Identifier, value));
    }

    if let Some((name, value)) = TEST_ID_ATTRIBUTES
        .iter()
        .find_map(|name| attr(name).map(|v| (*name, v)))
    {
        candidates.push(SelectorCandidate::new(
            SelectorStrategy::TestId,
            format!("[{}={}]", name, css_quote(value)),
        ));
    }

    if let Some(name) = attr("name") {
        candidates.push(SelectorCandidate::new(
            SelectorStrategy::Name,
            format!("{}[name={}]", tag, css_quote(name)),
        ));
    }

    if let Some(text_selector) = text_selector(role, tag, attributes, text) {
        candidates.push(SelectorCandidate::new(SelectorStrategy::Text, text_selector));
    }

    candidates.push(SelectorCandidate::new(
        SelectorStrategy::StructuralPath,
        structural_path.to_string(),
    ));

    // Already pushed in rank order; the sort keeps that true if strategies move.
    candidates.sort_by_key(|c| c.rank);
    candidates
}

/// Visible-text locator. Buttons and links use their text; fields without
/// text fall back to the label a user actually sees.
fn text_selector(
    role: ElementRole,
    tag: &str,
    attributes: &BTreeMap<String, String>,
    text: &str,
) -> Option<String> {
    let text = text.trim();
    match role {
        ElementRole::Button | ElementRole::Link if !text.is_empty() => {
            Some(format!("text={}", css_quote(text)))
        }
        _ => ["aria-label", "placeholder"].iter().find_map(|name| {
            attributes
                .get(*name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| format!("{}[{}={}]", tag, name, css_quote(v)))
        }),
    }
}

fn is_plain_ident(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Double-quote a CSS attribute value.
pub fn css_quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}
