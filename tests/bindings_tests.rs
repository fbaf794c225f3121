use std::collections::HashSet;

use frontend_tester::generate::bindings::{
    check_coverage, ensure_scenarios_binding, extract_bindings, normalize_phrase, synthesize_stubs,
};
use frontend_tester::generate::common_steps::{COMMON_STEPS, library_module, reuse_for_missing};
use frontend_tester::generate::scenario::{
    StepKeyword, StepPhrase, extract_step_phrases, mentions_title, smoke_bindings, smoke_scenario,
};
use frontend_tester::generate::validator::{check_python_syntax, validate_pair};

mod common;
use crate::common::utils::login_analysis;

// ============================================================================
// Helper builders
// ============================================================================

fn given(phrase: &str) -> StepPhrase {
    StepPhrase::new(StepKeyword::Given, phrase)
}

fn when(phrase: &str) -> StepPhrase {
    StepPhrase::new(StepKeyword::When, phrase)
}

fn then(phrase: &str) -> StepPhrase {
    StepPhrase::new(StepKeyword::Then, phrase)
}

// ============================================================================
// Step phrase extraction
// ============================================================================

#[test]
fn continuation_keywords_inherit_the_previous_step() {
    let phrases = extract_step_phrases(
        "Feature: Cart\n  Scenario: Add\n    Given I am on \"/shop\"\n    And I am signed in\n    When I add \"lamp\"\n    But I skip checkout\n    Then the cart shows 1 item\n    * the total is shown\n",
    );
    assert_eq!(
        phrases,
        vec![
            given("I am on \"/shop\""),
            given("I am signed in"),
            when("I add \"lamp\""),
            when("I skip checkout"),
            then("the cart shows 1 item"),
            then("the total is shown"),
        ]
    );
}

#[test]
fn leading_continuation_defaults_to_given() {
    let phrases = extract_step_phrases("Scenario: x\n  And something first\n");
    assert_eq!(phrases, vec![given("something first")]);
}

#[test]
fn comments_tables_and_docstrings_are_skipped() {
    let phrases = extract_step_phrases(
        "Feature: F\n  Scenario: S\n    # Given commented out\n    Given a payload\n      \"\"\"\n      Then not a step\n      \"\"\"\n    | Then | cell |\n    Then it is accepted\n",
    );
    assert_eq!(phrases, vec![given("a payload"), then("it is accepted")]);
}

#[test]
fn repeated_steps_are_deduplicated_per_keyword() {
    let phrases = extract_step_phrases(
        "Scenario: A\n  Given I am on \"/\"\n  Then ok\nScenario: B\n  Given I am on \"/\"\n  When ok\n",
    );
    assert_eq!(
        phrases,
        vec![given("I am on \"/\""), then("ok"), when("ok")]
    );
}

// ============================================================================
// Binding patterns
// ============================================================================

#[test]
fn decorator_forms_are_recognised() {
    let source = r#"
@given("I am on the home page")
def a(page): ...

@when(parsers.parse('I search for "{term}"'))
def b(page, term): ...

@then(parsers.re(r'I see (?P<count>\d+) results'))
def c(page, count): ...

@step(parsers.cfparse("the {item:w} is shown"))
def d(page, item): ...
"#;
    let bindings = extract_bindings(source);
    let found: Vec<(Option<StepKeyword>, &str)> = bindings
        .iter()
        .map(|b| (b.keyword, b.normalized.as_str()))
        .collect();
    assert_eq!(
        found,
        vec![
            (Some(StepKeyword::Given), "i am on the home page"),
            (Some(StepKeyword::When), "i search for <*>"),
            (Some(StepKeyword::Then), "i see <*> results"),
            (None, "the <*> is shown"),
        ]
    );
}

#[test]
fn normalization_abstracts_literals() {
    assert_eq!(
        normalize_phrase("I fill \"#email\" with \"a@b.c\""),
        normalize_phrase("I fill \"{selector}\" with \"{value}\"")
    );
    assert_eq!(normalize_phrase("I wait 3 seconds."), "i wait <*> seconds");
    assert_eq!(normalize_phrase("the  user <name>  logs in"), "the user <*> logs in");
    assert_eq!(normalize_phrase("I pick 'red'"), "i pick <*>");
    assert_eq!(normalize_phrase("the user's cart"), "the user's cart");
}

// ============================================================================
// Coverage
// ============================================================================

#[test]
fn every_phrase_bound_means_complete_coverage() {
    let phrases = vec![given("I am on \"/login\""), when("I click \"Sign in\""), then("I see the dashboard")];
    let source = r#"
@given(parsers.parse('I am on "{url}"'))
def a(page, url): ...
@when(parsers.parse('I click "{label}"'))
def b(page, label): ...
@then("I see the dashboard")
def c(page): ...
"#;
    let coverage = check_coverage(&phrases, source);
    assert!(coverage.is_complete());
    assert!(coverage.ambiguous.is_empty());
}

#[test]
fn keyword_mismatch_counts_as_missing() {
    let phrases = vec![then("I click \"Save\"")];
    let source = "@when(parsers.parse('I click \"{x}\"'))\ndef a(page, x): ...\n";
    let coverage = check_coverage(&phrases, source);
    assert_eq!(coverage.missing, phrases);
}

#[test]
fn step_decorator_binds_any_keyword() {
    let phrases = vec![given("the page loads"), then("the page loads")];
    let coverage = check_coverage(&phrases, "@step(\"the page loads\")\ndef a(page): ...\n");
    assert!(coverage.is_complete());
}

#[test]
fn duplicate_bindings_are_ambiguous_and_fail_validation() {
    let phrases = vec![when("I press \"Go\"")];
    let source = "@when(parsers.parse('I press \"{a}\"'))\ndef a(page, a): ...\n@when(parsers.parse('I press \"{b}\"'))\ndef b(page, b): ...\n";
    let coverage = check_coverage(&phrases, source);
    assert!(coverage.missing.is_empty());
    assert_eq!(coverage.ambiguous, phrases);

    let scenario = "Feature: F\n  Scenario: S\n    When I press \"Go\"\n";
    let report = validate_pair(scenario, &phrases, source);
    assert!(!report.is_valid());
    assert!(
        report
            .describe()
            .contains("steps bound more than once: When I press \"Go\"")
    );
}

// ============================================================================
// Stubs
// ============================================================================

#[test]
fn stubs_cover_every_missing_phrase() {
    let missing = vec![
        when("I open the menu"),
        then("the banner says \"Welcome {user}\""),
        given("a plain {brace} step"),
    ];
    let stubs = synthesize_stubs(&missing, false);
    let module = format!("from pytest_bdd import given, when, then, parsers\n{}", stubs);

    assert!(check_coverage(&missing, &module).is_complete());
    assert_eq!(check_python_syntax(&module), Ok(()));
    assert!(stubs.contains("def stub_when_1(page):"));
    assert!(stubs.contains("def stub_then_2(page, arg0):"));
    assert!(stubs.contains("assert page is not None"));
}

#[test]
fn async_stubs_use_coroutines() {
    let stubs = synthesize_stubs(&[given("the app is ready")], true);
    assert!(stubs.contains("async def stub_given_1(page):"));
    assert!(stubs.contains("await page.wait_for_load_state()"));
    assert_eq!(check_python_syntax(&stubs), Ok(()));
}

// ============================================================================
// scenarios() call
// ============================================================================

#[test]
fn scenarios_call_is_appended_when_absent() {
    let out = ensure_scenarios_binding("from pytest_bdd import given\n", "../features/login.feature");
    assert!(out.ends_with("from pytest_bdd import scenarios\n\nscenarios(\"../features/login.feature\")\n"));
}

#[test]
fn existing_scenarios_call_is_repointed() {
    let out = ensure_scenarios_binding(
        "from pytest_bdd import scenarios\nscenarios('login.feature')\n",
        "../features/login.feature",
    );
    assert_eq!(
        out,
        "from pytest_bdd import scenarios\nscenarios(\"../features/login.feature\")\n"
    );
}

// ============================================================================
// Built-in smoke pair
// ============================================================================

#[test]
fn smoke_pair_is_complete_and_checks_the_title() {
    let analysis = login_analysis();
    let scenario = smoke_scenario(&analysis);
    let phrases = extract_step_phrases(&scenario);
    let bindings = smoke_bindings("../features/login.feature");

    assert!(mentions_title(&phrases));
    assert!(scenario.contains("the page title should contain \"Sign in - Acme\""));
    assert!(check_coverage(&phrases, &bindings).is_complete());
    assert_eq!(check_python_syntax(&bindings), Ok(()));
    assert!(bindings.contains("scenarios(\"../features/login.feature\")"));
}

#[test]
fn smoke_pair_without_title_checks_title_is_present() {
    let mut analysis = login_analysis();
    analysis.title.clear();
    let phrases = extract_step_phrases(&smoke_scenario(&analysis));
    assert!(phrases.contains(&then("the page title should not be empty")));
    assert!(check_coverage(&phrases, &smoke_bindings("x.feature")).is_complete());
}

// ============================================================================
// Common step library
// ============================================================================

#[test]
fn common_library_binds_each_phrase_once() {
    let mut seen = HashSet::new();
    for entry in COMMON_STEPS {
        let bindings = extract_bindings(entry.source);
        assert!(!bindings.is_empty(), "{} has no decorator", entry.name);
        for binding in bindings {
            assert!(
                seen.insert((binding.keyword, binding.normalized.clone())),
                "{} repeats {:?}",
                entry.name,
                binding.normalized
            );
        }
    }
    assert_eq!(check_python_syntax(&library_module()), Ok(()));
}

#[test]
fn reuse_only_binds_steps_that_are_still_missing() {
    let phrases = vec![
        given("I am on \"https://shop.test\""),
        when("I click the button \"Buy\""),
        then("the page should load"),
        then("the basket shows 1 item"),
    ];
    let missing = vec![phrases[1].clone(), phrases[2].clone(), phrases[3].clone()];

    let (code, bound) = reuse_for_missing(&phrases, &missing);
    assert_eq!(bound, vec![phrases[1].clone(), phrases[2].clone()]);
    assert!(code.contains("def common_click_button(page, text):"));
    assert!(code.contains("def common_page_loaded(page):"));
    assert!(!code.contains("def common_open_page"));

    let (code, bound) = reuse_for_missing(&phrases, &[phrases[3].clone()]);
    assert!(code.is_empty());
    assert!(bound.is_empty());
}

#[test]
fn smoke_bindings_come_from_the_common_library() {
    let bindings = smoke_bindings("../features/login.feature");
    assert!(bindings.contains("def common_title_contains(page, text):"));
    assert!(bindings.contains("assert text in page.title()"));
    assert!(bindings.contains("def common_page_loaded(page):"));
}
