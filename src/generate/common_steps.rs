//! Reusable Playwright step definitions.
//!
//! The same table backs `steps/common_steps.py` in a scaffolded suite, the
//! built-in smoke pair, and the definitions appended to a generated module
//! whose steps the model left unbound.

use crate::generate::bindings::check_coverage;
use crate::generate::scenario::StepPhrase;

/// One self-contained step definition (decorators plus function).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonStep {
    pub name: &'static str,
    pub source: &'static str,
}

/// Imports every entry in [`COMMON_STEPS`] relies on.
pub const COMMON_IMPORTS: &str = "import re

from playwright.sync_api import expect
from pytest_bdd import given, when, then, parsers
";

const LIBRARY_HEADER: &str = "\"\"\"Common step definitions shared by every feature in this suite.

Imported from conftest.py, so any scenario can use these phrases without a
module-level binding.
\"\"\"

";

const fn step(name: &'static str, source: &'static str) -> CommonStep {
    CommonStep { name, source }
}

pub const COMMON_STEPS: &[CommonStep] = &[
    // navigation
    step(
        "open_page",
        "@given(parsers.parse('I am on \"{url}\"'))
def common_open_page(page, url):
    page.goto(url)
",
    ),
    step(
        "open_homepage",
        "@given(\"I am on the homepage\")
@given(\"I visit the homepage\")
def common_open_homepage(page, base_url):
    page.goto(base_url)
",
    ),
    step(
        "navigate_to",
        "@when(parsers.parse('I navigate to \"{url}\"'))
def common_navigate_to(page, url):
    page.goto(url)
",
    ),
    step(
        "go_back",
        "@when(\"I go back\")
def common_go_back(page):
    page.go_back()
",
    ),
    step(
        "go_forward",
        "@when(\"I go forward\")
def common_go_forward(page):
    page.go_forward()
",
    ),
    step(
        "reload",
        "@when(\"I reload the page\")
@when(\"I refresh the page\")
def common_reload(page):
    page.reload()
",
    ),
    // actions
    step(
        "click_on",
        "@when(parsers.parse('I click on \"{selector}\"'))
def common_click_on(page, selector):
    page.click(selector)
",
    ),
    step(
        "click_button",
        "@when(parsers.parse('I click the button \"{text}\"'))
def common_click_button(page, text):
    page.get_by_role(\"button\", name=text).click()
",
    ),
    step(
        "click_link",
        "@when(parsers.parse('I click the link \"{text}\"'))
def common_click_link(page, text):
    page.get_by_role(\"link\", name=text).click()
",
    ),
    step(
        "type_into",
        "@when(parsers.parse('I type \"{text}\" into \"{selector}\"'))
def common_type_into(page, text, selector):
    page.fill(selector, text)
",
    ),
    step(
        "fill_field",
        "@when(parsers.parse('I fill \"{field}\" with \"{value}\"'))
def common_fill_field(page, field, value):
    try:
        page.fill(field, value, timeout=2000)
    except Exception:
        target = page.get_by_label(field)
        if target.count() == 0:
            target = page.get_by_placeholder(field)
        target.first.fill(value)
",
    ),
    step(
        "select_option",
        "@when(parsers.parse('I select \"{option}\" from \"{selector}\"'))
def common_select_option(page, option, selector):
    page.select_option(selector, option)
",
    ),
    step(
        "check",
        "@when(parsers.parse('I check \"{selector}\"'))
def common_check(page, selector):
    page.check(selector)
",
    ),
    step(
        "uncheck",
        "@when(parsers.parse('I uncheck \"{selector}\"'))
def common_uncheck(page, selector):
    page.uncheck(selector)
",
    ),
    step(
        "press_key",
        "@when(parsers.parse('I press \"{key}\"'))
def common_press_key(page, key):
    page.keyboard.press(key)
",
    ),
    // page assertions
    step(
        "page_loaded",
        "@then(\"the page should load\")
def common_page_loaded(page):
    page.wait_for_load_state(\"load\")
    assert page.url
",
    ),
    step(
        "should_see",
        "@then(parsers.parse('I should see \"{text}\"'))
def common_should_see(page, text):
    expect(page.get_by_text(text).first).to_be_visible()
",
    ),
    step(
        "should_not_see",
        "@then(parsers.parse('I should not see \"{text}\"'))
def common_should_not_see(page, text):
    expect(page.get_by_text(text)).to_have_count(0)
",
    ),
    step(
        "should_see_heading",
        "@then(parsers.parse('I should see the heading \"{text}\"'))
def common_should_see_heading(page, text):
    expect(page.get_by_role(\"heading\", name=text)).to_be_visible()
",
    ),
    step(
        "title_is",
        "@then(parsers.parse('the page title should be \"{title}\"'))
def common_title_is(page, title):
    expect(page).to_have_title(title)
",
    ),
    step(
        "title_contains",
        "@then(parsers.parse('the page title should contain \"{text}\"'))
def common_title_contains(page, text):
    assert text in page.title()
",
    ),
    step(
        "title_not_empty",
        "@then(\"the page title should not be empty\")
def common_title_not_empty(page):
    assert page.title().strip()
",
    ),
    step(
        "url_is",
        "@then(parsers.parse('the URL should be \"{url}\"'))
def common_url_is(page, url):
    expect(page).to_have_url(url)
",
    ),
    step(
        "url_contains",
        "@then(parsers.parse('the URL should contain \"{text}\"'))
def common_url_contains(page, text):
    expect(page).to_have_url(re.compile(re.escape(text)))
",
    ),
    // element assertions
    step(
        "visible",
        "@then(parsers.parse('\"{selector}\" should be visible'))
def common_visible(page, selector):
    expect(page.locator(selector)).to_be_visible()
",
    ),
    step(
        "hidden",
        "@then(parsers.parse('\"{selector}\" should not be visible'))
@then(parsers.parse('\"{selector}\" should be hidden'))
def common_hidden(page, selector):
    expect(page.locator(selector)).not_to_be_visible()
",
    ),
    step(
        "enabled",
        "@then(parsers.parse('\"{selector}\" should be enabled'))
def common_enabled(page, selector):
    expect(page.locator(selector)).to_be_enabled()
",
    ),
    step(
        "disabled",
        "@then(parsers.parse('\"{selector}\" should be disabled'))
def common_disabled(page, selector):
    expect(page.locator(selector)).to_be_disabled()
",
    ),
    step(
        "contains_text",
        "@then(parsers.parse('\"{selector}\" should contain \"{text}\"'))
def common_contains_text(page, selector, text):
    expect(page.locator(selector)).to_contain_text(text)
",
    ),
    step(
        "has_value",
        "@then(parsers.parse('\"{selector}\" should have value \"{value}\"'))
def common_has_value(page, selector, value):
    expect(page.locator(selector)).to_have_value(value)
",
    ),
    step(
        "checked",
        "@then(parsers.parse('\"{selector}\" should be checked'))
def common_checked(page, selector):
    expect(page.locator(selector)).to_be_checked()
",
    ),
    step(
        "unchecked",
        "@then(parsers.parse('\"{selector}\" should not be checked'))
@then(parsers.parse('\"{selector}\" should be unchecked'))
def common_unchecked(page, selector):
    expect(page.locator(selector)).not_to_be_checked()
",
    ),
    // waits
    step(
        "wait_seconds",
        "@when(parsers.parse(\"I wait for {seconds:d} seconds\"))
def common_wait_seconds(page, seconds):
    page.wait_for_timeout(seconds * 1000)
",
    ),
    step(
        "wait_visible",
        "@when(parsers.parse('I wait for \"{selector}\" to be visible'))
def common_wait_visible(page, selector):
    page.wait_for_selector(selector, state=\"visible\")
",
    ),
    step(
        "wait_hidden",
        "@when(parsers.parse('I wait for \"{selector}\" to be hidden'))
def common_wait_hidden(page, selector):
    page.wait_for_selector(selector, state=\"hidden\")
",
    ),
    step(
        "wait_load",
        "@when(\"I wait for the page to load\")
def common_wait_load(page):
    page.wait_for_load_state(\"networkidle\")
",
    ),
];

pub fn common_step(name: &str) -> Option<&'static CommonStep> {
    COMMON_STEPS.iter().find(|s| s.name == name)
}

fn join_definitions<'a>(steps: impl IntoIterator<Item = &'a CommonStep>) -> String {
    steps
        .into_iter()
        .map(|s| format!("\n\n{}", s.source))
        .collect()
}

/// Contents of `steps/common_steps.py` in a scaffolded suite.
pub fn library_module() -> String {
    format!(
        "{}{}{}",
        LIBRARY_HEADER,
        COMMON_IMPORTS,
        join_definitions(COMMON_STEPS)
    )
}

/// Definitions for the named entries, in the given order. Unknown names are
/// skipped.
pub fn definitions_for(names: &[&str]) -> String {
    join_definitions(names.iter().filter_map(|n| common_step(n)))
}

/// Common definitions that bind some of `missing` without touching any
/// phrase already bound.
///
/// An entry is taken only when every scenario phrase it matches is still
/// missing, so appending it never makes a step ambiguous. Returns the code
/// to append (empty when nothing applies) and the phrases it binds.
pub fn reuse_for_missing(
    phrases: &[StepPhrase],
    missing: &[StepPhrase],
) -> (String, Vec<StepPhrase>) {
    let mut remaining: Vec<StepPhrase> = missing.to_vec();
    let mut chosen = Vec::new();
    let mut bound = Vec::new();

    for entry in COMMON_STEPS {
        let matched: Vec<&StepPhrase> = phrases
            .iter()
            .filter(|p| check_coverage(std::slice::from_ref(*p), entry.source).is_complete())
            .collect();
        if matched.is_empty() || !matched.iter().all(|p| remaining.contains(*p)) {
            continue;
        }
        remaining.retain(|p| !matched.contains(&p));
        bound.extend(matched.into_iter().cloned());
        chosen.push(entry);
    }

    if chosen.is_empty() {
        return (String::new(), bound);
    }
    let code = format!("\n{}{}", COMMON_IMPORTS, join_definitions(chosen));
    (code, bound)
}
