use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::browser::BrowserDriver;
use crate::error::BrowserError;

/// Default location of the Node.js browser server, relative to the working
/// directory.
pub const DEFAULT_SERVER_SCRIPT: &str = "node/browser_server.js";

/// Request sent to browser_server.js over stdin (one JSON line).
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BrowserRequest {
    Navigate { cmd: &'static str, url: String },
    Content { cmd: &'static str },
    Evaluate { cmd: &'static str, script: String },
    Quit { cmd: &'static str },
}

impl BrowserRequest {
    pub fn navigate(url: &str) -> Self {
        BrowserRequest::Navigate {
            cmd: "navigate",
            url: url.to_string(),
        }
    }

    pub fn content() -> Self {
        BrowserRequest::Content { cmd: "content" }
    }

    pub fn evaluate(script: &str) -> Self {
        BrowserRequest::Evaluate {
            cmd: "evaluate",
            script: script.to_string(),
        }
    }

    pub fn quit() -> Self {
        BrowserRequest::Quit { cmd: "quit" }
    }
}

/// Response received from browser_server.js over stdout (one JSON line).
#[derive(Debug, Deserialize)]
pub struct BrowserResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub ready: Option<bool>,
}

/// A persistent browser session backed by browser_server.js.
///
/// Launches a long-lived Node.js process that keeps a headless Chromium open.
/// Commands are sent as NDJSON over stdin, responses read from stdout. The
/// child is killed if the session is dropped without `quit`.
pub struct NodeBrowserSession {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    script: PathBuf,
}

impl NodeBrowserSession {
    /// Spawn the server script and wait for its ready signal.
    pub async fn launch(script: &Path) -> Result<Self, BrowserError> {
        let script_name = script.display().to_string();
        let mut child = Command::new("node")
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BrowserError::Spawn {
                script: script_name.clone(),
                source: e,
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            BrowserError::SessionIo(format!("failed to capture stdin of {}", script_name))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            BrowserError::SessionIo(format!("failed to capture stdout of {}", script_name))
        })?;

        let mut session = NodeBrowserSession {
            child,
            stdin,
            reader: BufReader::new(stdout),
            script: script.to_path_buf(),
        };

        let response = session.read_response("ready signal").await?;
        if !response.ok || response.ready != Some(true) {
            return Err(BrowserError::Protocol {
                command: "launch".into(),
                error: format!("did not receive ready signal from {}", script_name),
            });
        }

        debug!(script = %script_name, "browser session ready");
        Ok(session)
    }

    async fn read_response(&mut self, context: &str) -> Result<BrowserResponse, BrowserError> {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.map_err(|e| {
            BrowserError::SessionIo(format!("failed to read {}: {}", context, e))
        })?;

        if line.trim().is_empty() {
            return Err(BrowserError::SessionIo(format!(
                "empty {} from {} (process may have died)",
                context,
                self.script.display()
            )));
        }

        serde_json::from_str(line.trim()).map_err(|e| BrowserError::Json {
            context: context.to_string(),
            source: e,
        })
    }

    async fn send(&mut self, request: &BrowserRequest) -> Result<BrowserResponse, BrowserError> {
        let mut json = serde_json::to_string(request).map_err(|e| BrowserError::Json {
            context: "BrowserRequest".into(),
            source: e,
        })?;
        json.push('\n');

        self.stdin
            .write_all(json.as_bytes())
            .await
            .map_err(|e| BrowserError::SessionIo(format!("failed to write request: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| BrowserError::SessionIo(format!("failed to flush request: {}", e)))?;

        self.read_response("browser response").await
    }

    async fn send_ok(
        &mut self,
        request: &BrowserRequest,
        command: &str,
    ) -> Result<BrowserResponse, BrowserError> {
        let response = self.send(request).await?;
        if !response.ok {
            return Err(BrowserError::Protocol {
                command: command.into(),
                error: response.error.unwrap_or_else(|| "unknown error".into()),
            });
        }
        Ok(response)
    }

    /// Ask the server to close the browser and wait for the process to exit.
    pub async fn quit(mut self) {
        if let Err(e) = self.send(&BrowserRequest::quit()).await {
            debug!(error = %e, "quit request failed");
        }
        if let Err(e) = self.child.wait().await {
            warn!(error = %e, "browser server did not exit cleanly");
        }
    }
}

#[async_trait]
impl BrowserDriver for NodeBrowserSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.send_ok(&BrowserRequest::navigate(url), "navigate")
            .await?;
        Ok(())
    }

    async fn extract_markup(&mut self) -> Result<String, BrowserError> {
        let response = self.send_ok(&BrowserRequest::content(), "content").await?;
        response.html.ok_or_else(|| BrowserError::Protocol {
            command: "content".into(),
            error: "no html in content response".into(),
        })
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError> {
        let response = self
            .send_ok(&BrowserRequest::evaluate(script), "evaluate")
            .await?;
        Ok(response.value.unwrap_or(Value::Null))
    }
}
