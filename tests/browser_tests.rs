use async_trait::async_trait;
use frontend_tester::browser::session::{BrowserRequest, BrowserResponse};
use frontend_tester::browser::{BrowserDriver, FRAMEWORK_PROBES, capture_page};
use frontend_tester::error::BrowserError;
use serde_json::{Value, json};

mod common;
use crate::common::utils::{LOGIN_PAGE, LOGIN_URL};

// =========================================================================
// Fake driver
// =========================================================================

/// Serves fixed markup; fails every probe whose script mentions `failing`.
struct FakeDriver {
    markup: String,
    failing: &'static str,
    visited: Vec<String>,
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.visited.push(url.to_string());
        Ok(())
    }

    async fn extract_markup(&mut self) -> Result<String, BrowserError> {
        Ok(self.markup.clone())
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError> {
        if script.contains(self.failing) {
            return Err(BrowserError::Protocol {
                command: "evaluate".into(),
                error: "ReferenceError".into(),
            });
        }
        if script == "document.title" {
            return Ok(json!("Sign in - Acme"));
        }
        Ok(json!(false))
    }
}

struct DeadDriver;

#[async_trait]
impl BrowserDriver for DeadDriver {
    async fn navigate(&mut self, _: &str) -> Result<(), BrowserError> {
        Err(BrowserError::Protocol {
            command: "navigate".into(),
            error: "net::ERR_CONNECTION_REFUSED".into(),
        })
    }

    async fn extract_markup(&mut self) -> Result<String, BrowserError> {
        unreachable!("markup requested after failed navigation")
    }

    async fn evaluate(&mut self, _: &str) -> Result<Value, BrowserError> {
        unreachable!("probe evaluated after failed navigation")
    }
}

// =========================================================================
// Page capture
// =========================================================================

#[tokio::test]
async fn capture_collects_markup_and_probes() {
    let mut driver = FakeDriver {
        markup: LOGIN_PAGE.to_string(),
        failing: "window.ng",
        visited: Vec::new(),
    };

    let page = capture_page(&mut driver, LOGIN_URL).await.unwrap();
    assert_eq!(driver.visited, vec![LOGIN_URL.to_string()]);
    assert_eq!(page.url, LOGIN_URL);
    assert_eq!(page.markup, LOGIN_PAGE);
    assert_eq!(page.probes.get("title"), Some(&json!("Sign in - Acme")));
    assert_eq!(page.probes.get("react"), Some(&json!(false)));
    // Failed probes are skipped, not fatal.
    assert!(!page.probes.contains_key("angular"));
    assert_eq!(page.probes.len(), FRAMEWORK_PROBES.len() - 1);
}

#[tokio::test]
async fn capture_fails_when_navigation_fails() {
    let err = capture_page(&mut DeadDriver, LOGIN_URL).await.unwrap_err();
    assert!(err.to_string().contains("ERR_CONNECTION_REFUSED"));
}

// =========================================================================
// Wire format
// =========================================================================

#[test]
fn requests_serialize_as_single_json_objects() {
    assert_eq!(
        serde_json::to_value(BrowserRequest::navigate("https://shop.test")).unwrap(),
        json!({"cmd": "navigate", "url": "https://shop.test"})
    );
    assert_eq!(
        serde_json::to_value(BrowserRequest::content()).unwrap(),
        json!({"cmd": "content"})
    );
    assert_eq!(
        serde_json::to_value(BrowserRequest::evaluate("document.title")).unwrap(),
        json!({"cmd": "evaluate", "script": "document.title"})
    );
    assert_eq!(
        serde_json::to_string(&BrowserRequest::quit()).unwrap(),
        r#"{"cmd":"quit"}"#
    );
}

#[test]
fn responses_tolerate_missing_fields() {
    let ready: BrowserResponse = serde_json::from_str(r#"{"ok": true, "ready": true}"#).unwrap();
    assert!(ready.ok);
    assert_eq!(ready.ready, Some(true));
    assert!(ready.html.is_none());

    let content: BrowserResponse =
        serde_json::from_str(r#"{"ok": true, "html": "<html></html>"}"#).unwrap();
    assert_eq!(content.html.as_deref(), Some("<html></html>"));

    let failed: BrowserResponse =
        serde_json::from_str(r#"{"ok": false, "error": "timeout"}"#).unwrap();
    assert!(!failed.ok);
    assert_eq!(failed.error.as_deref(), Some("timeout"));

    let value: BrowserResponse = serde_json::from_str(r#"{"ok": true, "value": [1, 2]}"#).unwrap();
    assert_eq!(value.value, Some(json!([1, 2])));
}
