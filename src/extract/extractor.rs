use std::collections::BTreeMap;
use std::sync::OnceLock;

use scraper::{ElementRef, Html, Selector};
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::error::ExtractionError;
use crate::extract::page_model::{Element, ElementId, ElementRole, Form, PageAnalysis};
use crate::extract::selectors::derive_selectors;

/// Default prompt budget for the simplified markup, in characters.
pub const DEFAULT_MARKUP_BUDGET: usize = 8000;

const INTERACTIVE: &str =
    "a[href], button, input, select, textarea, [role=\"button\"], [role=\"link\"]";

/// Subtrees that never contain user-visible interactive content.
const INERT_TAGS: [&str; 5] = ["script", "style", "noscript", "template", "svg"];

struct Selectors {
    interactive: Selector,
    form: Selector,
    title: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        interactive: Selector::parse(INTERACTIVE).expect("static selector"),
        form: Selector::parse("form").expect("static selector"),
        title: Selector::parse("title").expect("static selector"),
    })
}

// ============================================================================
// Entry point
// ============================================================================

/// Build the structural part of a `PageAnalysis` from raw markup.
///
/// Flows are left empty; the flow synthesizer fills them in later. Hidden,
/// disabled and inert-subtree elements are excluded. Returns
/// `ExtractionError` for empty or tagless input; callers decide whether to
/// re-fetch the page.
pub fn analyze_markup(
    url: &str,
    markup: &str,
    probes: BTreeMap<String, serde_json::Value>,
    markup_budget: usize,
) -> Result<PageAnalysis, ExtractionError> {
    if markup.trim().is_empty() {
        return Err(ExtractionError::EmptyMarkup);
    }
    if !markup.contains('<') {
        return Err(ExtractionError::Unparsable(
            "input contains no tags".to_string(),
        ));
    }

    let mut document = Html::parse_document(markup);
    if !document.errors.is_empty() {
        debug!(count = document.errors.len(), "html parse recovered from errors");
    }

    let title = document
        .select(&selectors().title)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .or_else(|| {
            probes
                .get("title")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default();

    let (elements, forms) = extract_elements(&document);
    let simplified_markup = simplify_markup(&mut document, markup_budget);

    debug!(
        url,
        elements = elements.len(),
        forms = forms.len(),
        "extracted page structure"
    );

    Ok(PageAnalysis {
        url: url.to_string(),
        title,
        elements,
        forms,
        flows: Vec::new(),
        probes,
        simplified_markup,
        fingerprint: fingerprint(markup),
    })
}

/// SHA-1 of the raw markup, hex encoded.
pub fn fingerprint(markup: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(markup.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Element inventory
// ============================================================================

fn extract_elements(document: &Html) -> (Vec<Element>, Vec<Form>) {
    let mut elements = Vec::new();
    let mut node_ids = Vec::new();

    for el in document.select(&selectors().interactive) {
        if !is_interactive(&el) {
            continue;
        }
        let Some(role) = classify_role(&el) else {
            continue;
        };

        let tag = el.value().name().to_string();
        let attributes: BTreeMap<String, String> = el
            .value()
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let text = visible_text(&el, &tag, &attributes);
        let path = structural_path(&el);
        let selectors = derive_selectors(role, &tag, &attributes, &text, &path);

        node_ids.push(el.id());
        elements.push(Element {
            id: ElementId(elements.len()),
            role,
            tag,
            text,
            attributes,
            selectors,
        });
    }

    let forms = document
        .select(&selectors().form)
        .filter(|form| is_interactive(form))
        .map(|form| {
            let key = form
                .value()
                .attr("id")
                .or_else(|| form.value().attr("name"))
                .map(str::to_string);

            let fields = elements
                .iter()
                .zip(&node_ids)
                .filter(|(element, node_id)| {
                    let nested = document
                        .tree
                        .get(**node_id)
                        .is_some_and(|node| node.ancestors().any(|a| a.id() == form.id()));
                    let linked = key.is_some()
                        && element.attribute("form") == key.as_deref();
                    nested || linked
                })
                .map(|(element, _)| element.id)
                .collect();

            Form {
                key,
                action: form.value().attr("action").map(str::to_string),
                method: form.value().attr("method").map(|m| m.to_lowercase()),
                fields,
            }
        })
        .collect();

    (elements, forms)
}

fn classify_role(el: &ElementRef) -> Option<ElementRole> {
    let value = el.value();
    match value.name() {
        "a" => Some(ElementRole::Link),
        "button" => Some(ElementRole::Button),
        "select" => Some(ElementRole::Select),
        "textarea" => Some(ElementRole::Textarea),
        "input" => match value.attr("type").map(|t| t.to_ascii_lowercase()).as_deref() {
            Some("hidden") => None,
            Some("button" | "submit" | "reset" | "image") => Some(ElementRole::Button),
            _ => Some(ElementRole::Input),
        },
        _ => match value.attr("role") {
            Some("button") => Some(ElementRole::Button),
            Some("link") => Some(ElementRole::Link),
            _ => None,
        },
    }
}

/// False when the element or any ancestor is hidden, disabled or inert.
fn is_interactive(el: &ElementRef) -> bool {
    let own = el.value();
    if own.attr("disabled").is_some() {
        return false;
    }

    std::iter::once(**el)
        .chain(el.ancestors())
        .filter_map(|node| node.value().as_element())
        .all(|e| {
            let style = e
                .attr("style")
                .map(|s| s.to_ascii_lowercase().replace(' ', ""))
                .unwrap_or_default();
            !(INERT_TAGS.contains(&e.name())
                || e.attr("hidden").is_some()
                || e.attr("aria-hidden") == Some("true")
                || style.contains("display:none")
                || style.contains("visibility:hidden")
                || (e.name() == "fieldset" && e.attr("disabled").is_some()))
        })
}

fn visible_text(el: &ElementRef, tag: &str, attributes: &BTreeMap<String, String>) -> String {
    if tag == "input" {
        let kind = attributes.get("type").map(|t| t.to_ascii_lowercase());
        if matches!(kind.as_deref(), Some("button" | "submit" | "reset")) {
            return attributes
                .get("value")
                .map(|v| collapse_whitespace(v))
                .unwrap_or_default();
        }
        return String::new();
    }
    if tag == "select" {
        return String::new();
    }
    collapse_whitespace(&el.text().collect::<String>())
}

/// `html > body > form:nth-of-type(1) > input:nth-of-type(2)` style path.
fn structural_path(el: &ElementRef) -> String {
    let mut segments: Vec<String> = std::iter::once(**el)
        .chain(el.ancestors())
        .filter_map(|node| {
            let element = node.value().as_element()?;
            let name = element.name();
            if name == "html" || name == "body" {
                return Some(name.to_string());
            }
            let position = node
                .prev_siblings()
                .filter_map(|s| s.value().as_element())
                .filter(|s| s.name() == name)
                .count()
                + 1;
            Some(format!("{}:nth-of-type({})", name, position))
        })
        .collect();
    segments.reverse();
    segments.join(" > ")
}

// ============================================================================
// Prompt-sized markup
// ============================================================================

/// Strip inert subtrees and comments, collapse whitespace and truncate to
/// `budget` characters.
fn simplify_markup(document: &mut Html, budget: usize) -> String {
    let doomed: Vec<_> = document
        .tree
        .root()
        .descendants()
        .filter(|node| {
            node.value().is_comment()
                || node
                    .value()
                    .as_element()
                    .is_some_and(|e| INERT_TAGS.contains(&e.name()))
        })
        .map(|node| node.id())
        .collect();

    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    let serialized = collapse_whitespace(&document.root_element().html()).replace("> <", "><");
    truncate_chars(&serialized, budget)
}

fn truncate_chars(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((cut, _)) => format!("{}\n... (truncated)", &text[..cut]),
        None => text.to_string(),
    }
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
