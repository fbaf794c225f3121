use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::BrowserError;

pub mod session;

/// Minimal browser surface the analysis pass needs.
#[async_trait]
pub trait BrowserDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Rendered markup of the current page, after scripts ran.
    async fn extract_markup(&mut self) -> Result<String, BrowserError>;

    /// Evaluate a JavaScript expression in the page and return its JSON value.
    async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError>;
}

/// Framework probes evaluated after load. Failures are ignored.
pub const FRAMEWORK_PROBES: [(&str, &str); 4] = [
    ("title", "document.title"),
    (
        "react",
        "!!(window.React || document.querySelector('[data-reactroot], #__next'))",
    ),
    (
        "vue",
        "!!(window.Vue || document.querySelector('[data-v-app], [data-server-rendered]'))",
    ),
    (
        "angular",
        "!!(window.ng || document.querySelector('[ng-version]'))",
    ),
];

/// Raw page as seen by the browser.
#[derive(Debug, Clone)]
pub struct CapturedPage {
    pub url: String,
    pub markup: String,
    pub probes: BTreeMap<String, Value>,
}

/// Navigate, wait for the driver's load signal and capture markup plus probes.
pub async fn capture_page(
    driver: &mut dyn BrowserDriver,
    url: &str,
) -> Result<CapturedPage, BrowserError> {
    driver.navigate(url).await?;
    let markup = driver.extract_markup().await?;

    let mut probes = BTreeMap::new();
    for (name, script) in FRAMEWORK_PROBES {
        match driver.evaluate(script).await {
            Ok(value) => {
                probes.insert(name.to_string(), value);
            }
            Err(e) => debug!(probe = name, error = %e, "probe failed"),
        }
    }

    Ok(CapturedPage {
        url: url.to_string(),
        markup,
        probes,
    })
}
