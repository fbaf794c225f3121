use std::collections::BTreeMap;
use std::time::Duration;

use frontend_tester::extract::extractor::{DEFAULT_MARKUP_BUDGET, analyze_markup};
use frontend_tester::extract::page_model::PageAnalysis;
use frontend_tester::llm::retry::RetryPolicy;
use frontend_tester::repo::access::TestRepo;
use tempfile::TempDir;

pub const LOGIN_URL: &str = "http://localhost:8000/login";

pub const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Sign in - Acme</title>
  <style>.btn { color: red; }</style>
  <script>window.tracking = true;</script>
</head>
<body>
  <nav>
    <a href="/">Home</a>
    <a href="/help" data-testid="help-link">Help</a>
  </nav>
  <!-- login form -->
  <form id="login" action="/session" method="POST">
    <input id="username" name="username" type="text" placeholder="Username">
    <input id="password" name="password" type="password" placeholder="Password">
    <input type="hidden" name="csrf" value="abc123">
    <button type="submit" id="submit">Sign in</button>
  </form>
  <div hidden><button id="ghost">Ghost</button></div>
  <button disabled>Disabled</button>
</body>
</html>
"#;

pub const LOGIN_FLOWS: &str = r##"[
  {
    "name": "Login",
    "description": "Sign in with valid credentials",
    "steps": [
      {"action": "navigate", "description": "Open the sign-in page"},
      {"action": "fill", "target": "#username", "value": "alice", "description": "Enter the username"},
      {"action": "fill", "target": "password", "value": "secret", "description": "Enter the password"},
      {"action": "click", "target": "[4]", "description": "Submit the form"},
      {"action": "assert", "description": "The dashboard is shown"}
    ]
  }
]"##;

pub const LOGIN_SCENARIO: &str = r##"Sure! Here is the feature file:

```gherkin
Feature: Login
  Scenario: Successful login
    Given I am on "http://localhost:8000/login"
    When I fill "#username" with "alice"
    And I fill "#password" with "secret"
    And I click "#submit"
    Then I should see "Dashboard"
```

Let me know if you need more scenarios.
"##;

pub const LOGIN_BINDINGS: &str = r#"```python
from pytest_bdd import given, when, then, parsers


@given(parsers.parse('I am on "{url}"'))
def open_page(page, url):
    page.goto(url)


@when(parsers.parse('I fill "{selector}" with "{value}"'))
def fill_field(page, selector, value):
    page.fill(selector, value)


@when(parsers.parse('I click "{selector}"'))
def click(page, selector):
    page.click(selector)


@then(parsers.parse('I should see "{text}"'))
def should_see(page, text):
    assert text in page.content()
```
"#;

/// Structural analysis of `LOGIN_PAGE` with no flows.
pub fn login_analysis() -> PageAnalysis {
    analyze_markup(LOGIN_URL, LOGIN_PAGE, BTreeMap::new(), DEFAULT_MARKUP_BUDGET)
        .expect("login page parses")
}

/// Fresh test repository in a temp dir. Keep the `TempDir` alive.
pub fn temp_test_repo() -> (TempDir, TestRepo) {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = TestRepo::open(dir.path(), None).expect("open test repo");
    (dir, repo)
}

/// Retry policy that never sleeps.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_secs(5),
        max_retries: 2,
        base_backoff: Duration::ZERO,
    }
}
