use std::collections::BTreeMap;

use frontend_tester::error::ExtractionError;
use frontend_tester::extract::extractor::{analyze_markup, fingerprint};
use frontend_tester::extract::page_model::{ElementId, ElementRole, SelectorStrategy};
use frontend_tester::extract::selectors::derive_selectors;

mod common;
use crate::common::utils::{LOGIN_PAGE, LOGIN_URL, login_analysis};

// ============================================================================
// Helper builders
// ============================================================================

fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn analyze(markup: &str) -> frontend_tester::extract::page_model::PageAnalysis {
    analyze_markup("http://localhost/", markup, BTreeMap::new(), 8000).expect("markup parses")
}

// ============================================================================
// Element inventory
// ============================================================================

#[test]
fn login_page_inventory_skips_hidden_and_disabled() {
    let analysis = login_analysis();

    let labels: Vec<String> = analysis.elements.iter().map(|e| e.label()).collect();
    assert_eq!(labels, vec!["Home", "Help", "Username", "Password", "Sign in"]);
    assert!(analysis.elements.iter().all(|e| e.attribute("id") != Some("ghost")));
    assert!(analysis.elements.iter().all(|e| e.attribute("name") != Some("csrf")));
}

#[test]
fn element_ids_follow_document_order() {
    let analysis = login_analysis();
    for (index, element) in analysis.elements.iter().enumerate() {
        assert_eq!(element.id, ElementId(index));
        assert_eq!(analysis.element(element.id), Some(element));
    }
}

#[test]
fn roles_are_classified() {
    let analysis = login_analysis();
    let roles: Vec<ElementRole> = analysis.elements.iter().map(|e| e.role).collect();
    assert_eq!(
        roles,
        vec![
            ElementRole::Link,
            ElementRole::Link,
            ElementRole::Input,
            ElementRole::Input,
            ElementRole::Button,
        ]
    );
}

#[test]
fn title_comes_from_markup() {
    assert_eq!(login_analysis().title, "Sign in - Acme");
}

#[test]
fn title_falls_back_to_probe() {
    let mut probes = BTreeMap::new();
    probes.insert("title".to_string(), serde_json::json!("Rendered Title"));
    let analysis = analyze_markup(
        "http://localhost/",
        "<html><body><button>Go</button></body></html>",
        probes,
        8000,
    )
    .unwrap();
    assert_eq!(analysis.title, "Rendered Title");
    assert_eq!(analysis.probes.len(), 1);
}

#[test]
fn aria_hidden_and_display_none_are_excluded() {
    let analysis = analyze(
        r#"<html><body>
        <div aria-hidden="true"><button>Hidden A</button></div>
        <div style="display: none"><a href="/x">Hidden B</a></div>
        <span style="visibility:hidden"><input name="q"></span>
        <button>Visible</button>
        </body></html>"#,
    );
    assert_eq!(analysis.elements.len(), 1);
    assert_eq!(analysis.elements[0].text, "Visible");
}

#[test]
fn disabled_fieldset_excludes_its_fields() {
    let analysis = analyze(
        r#"<html><body><form>
        <fieldset disabled><input name="a"><input name="b"></fieldset>
        <input name="c">
        </form></body></html>"#,
    );
    let names: Vec<_> = analysis
        .elements
        .iter()
        .filter_map(|e| e.attribute("name"))
        .collect();
    assert_eq!(names, vec!["c"]);
}

#[test]
fn anchors_without_href_are_not_interactive() {
    let analysis = analyze(r#"<html><body><a name="top">Top</a><a href="/next">Next</a></body></html>"#);
    assert_eq!(analysis.elements.len(), 1);
    assert_eq!(analysis.elements[0].text, "Next");
}

#[test]
fn role_button_divs_are_buttons() {
    let analysis = analyze(r#"<html><body><div role="button">Open menu</div></body></html>"#);
    assert_eq!(analysis.elements.len(), 1);
    assert_eq!(analysis.elements[0].role, ElementRole::Button);
    assert_eq!(analysis.elements[0].text, "Open menu");
}

#[test]
fn submit_inputs_use_value_as_text() {
    let analysis = analyze(r#"<html><body><input type="submit" value="Send   now"></body></html>"#);
    assert_eq!(analysis.elements[0].role, ElementRole::Button);
    assert_eq!(analysis.elements[0].text, "Send now");
}

// ============================================================================
// Forms
// ============================================================================

#[test]
fn login_form_groups_its_fields() {
    let analysis = login_analysis();
    assert_eq!(analysis.forms.len(), 1);

    let form = &analysis.forms[0];
    assert_eq!(form.key.as_deref(), Some("login"));
    assert_eq!(form.action.as_deref(), Some("/session"));
    assert_eq!(form.method.as_deref(), Some("post"));
    assert_eq!(form.fields, vec![ElementId(2), ElementId(3), ElementId(4)]);
}

#[test]
fn form_attribute_links_outside_fields() {
    let analysis = analyze(
        r#"<html><body>
        <form id="search"><input name="q"></form>
        <button form="search" type="submit">Search</button>
        <button>Unrelated</button>
        </body></html>"#,
    );
    assert_eq!(analysis.forms.len(), 1);
    assert_eq!(analysis.forms[0].fields, vec![ElementId(0), ElementId(1)]);
}

// ============================================================================
// Simplified markup and fingerprint
// ============================================================================

#[test]
fn simplified_markup_drops_scripts_styles_and_comments() {
    let analysis = login_analysis();
    let markup = &analysis.simplified_markup;
    assert!(!markup.contains("<script"));
    assert!(!markup.contains("tracking"));
    assert!(!markup.contains("<style"));
    assert!(!markup.contains("login form"));
    assert!(markup.contains("Sign in"));
    assert!(!markup.contains("\n  "));
}

#[test]
fn simplified_markup_is_truncated_to_budget() {
    let analysis = analyze_markup(LOGIN_URL, LOGIN_PAGE, BTreeMap::new(), 40).unwrap();
    let (head, marker) = analysis
        .simplified_markup
        .split_once('\n')
        .expect("truncation marker");
    assert_eq!(head.chars().count(), 40);
    assert_eq!(marker, "... (truncated)");
}

#[test]
fn fingerprint_is_stable_sha1_hex() {
    let analysis = login_analysis();
    assert_eq!(analysis.fingerprint, fingerprint(LOGIN_PAGE));
    assert_eq!(analysis.fingerprint.len(), 40);
    assert!(analysis.fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(fingerprint("<p>a</p>"), fingerprint("<p>b</p>"));
}

#[test]
fn analysis_is_deterministic() {
    assert_eq!(login_analysis(), login_analysis());
}

#[test]
fn simplified_markup_keeps_attribute_source_order() {
    let markup = login_analysis().simplified_markup;
    assert!(markup.contains(r#"<form id="login" action="/session" method="POST">"#));
    assert!(markup.contains(
        r#"<input id="username" name="username" type="text" placeholder="Username">"#
    ));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn empty_markup_is_rejected() {
    for markup in ["", "   \n\t "] {
        let err = analyze_markup("http://x/", markup, BTreeMap::new(), 8000).unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyMarkup));
    }
}

#[test]
fn tagless_markup_is_unparsable() {
    let err = analyze_markup("http://x/", "just some words", BTreeMap::new(), 8000).unwrap_err();
    assert!(matches!(err, ExtractionError::Unparsable(_)));
}

// ============================================================================
// Selector derivation
// ============================================================================

#[test]
fn identifier_outranks_every_other_strategy() {
    let candidates = derive_selectors(
        ElementRole::Input,
        "input",
        &attrs(&[("id", "email"), ("data-testid", "email-field"), ("name", "email")]),
        "",
        "html > body > input:nth-of-type(1)",
    );
    let strategies: Vec<SelectorStrategy> = candidates.iter().map(|c| c.strategy).collect();
    assert_eq!(
        strategies,
        vec![
            SelectorStrategy::Identifier,
            SelectorStrategy::TestId,
            SelectorStrategy::Name,
            SelectorStrategy::StructuralPath,
        ]
    );
    assert_eq!(candidates[0].value, "#email");
    assert_eq!(candidates[1].value, "[data-testid=\"email-field\"]");
    assert_eq!(candidates[2].value, "input[name=\"email\"]");
    assert!(candidates.windows(2).all(|w| w[0].rank < w[1].rank));
}

#[test]
fn unusual_ids_are_attribute_quoted() {
    let candidates = derive_selectors(
        ElementRole::Button,
        "button",
        &attrs(&[("id", "form:submit")]),
        "Save",
        "html > body > button:nth-of-type(1)",
    );
    assert_eq!(candidates[0].value, "[id=\"form:submit\"]");
    assert_eq!(candidates[1].strategy, SelectorStrategy::Text);
    assert_eq!(candidates[1].value, "text=\"Save\"");
}

#[test]
fn fields_without_text_use_placeholder() {
    let candidates = derive_selectors(
        ElementRole::Input,
        "input",
        &attrs(&[("placeholder", "Search")]),
        "",
        "html > body > input:nth-of-type(1)",
    );
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].value, "input[placeholder=\"Search\"]");
}

#[test]
fn structural_path_is_always_present() {
    let candidates = derive_selectors(ElementRole::Link, "a", &BTreeMap::new(), "", "html > body > a:nth-of-type(3)");
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].strategy, SelectorStrategy::StructuralPath);
    assert_eq!(candidates[0].value, "html > body > a:nth-of-type(3)");
}

#[test]
fn extracted_elements_carry_structural_paths() {
    let analysis = login_analysis();
    let username = &analysis.elements[2];
    assert_eq!(username.best_selector().unwrap().value, "#username");
    let path = username.selectors.last().unwrap();
    assert_eq!(path.strategy, SelectorStrategy::StructuralPath);
    assert!(path.value.starts_with("html > body"));
    assert!(path.value.ends_with("form:nth-of-type(1) > input:nth-of-type(1)"));

    let help = &analysis.elements[1];
    assert_eq!(help.best_selector().unwrap().value, "[data-testid=\"help-link\"]");
}
