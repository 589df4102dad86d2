//! Playwright browser automation
//!
//! One `node` process per suite hosts a Playwright page and executes commands
//! read as JSON lines from stdin, answering each on stdout:
//!
//! ```text
//! -> {"id":3,"op":"click","selector":"[data-testid=\"wizard-next\"]"}
//! <- {"id":3,"ok":true,"value":null}
//! ```
//!
//! Keeping the page alive across commands preserves the UI state a profile
//! operation builds up (open dialogs, wizard steps, the loaded profile).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::UiConfig;
use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

/// One bridge command
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeCommand {
    /// Navigate; relative paths are joined to the base URL
    Goto { url: String },
    Click { selector: String },
    Fill { selector: String, value: String },
    Select { selector: String, value: String },
    Wait {
        selector: String,
        state: WaitState,
        timeout_ms: u64,
    },
    /// Run `script` as a function body with `arg` in scope
    Eval { script: String, arg: Value },
    Screenshot { path: String, full_page: bool },
    Close,
}

impl BridgeCommand {
    fn label(&self) -> String {
        match self {
            BridgeCommand::Goto { url } => format!("goto:{}", url),
            BridgeCommand::Click { selector } => format!("click:{}", selector),
            BridgeCommand::Fill { selector, .. } => format!("fill:{}", selector),
            BridgeCommand::Select { selector, .. } => format!("select:{}", selector),
            BridgeCommand::Wait { selector, .. } => format!("wait:{}", selector),
            BridgeCommand::Eval { .. } => "eval".to_string(),
            BridgeCommand::Screenshot { path, .. } => format!("screenshot:{}", path),
            BridgeCommand::Close => "close".to_string(),
        }
    }
}

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a BridgeCommand,
}

#[derive(Debug, Deserialize)]
struct Response {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub base_url: String,
    pub screenshot_dir: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub browser: Browser,
    pub headless: bool,
    /// Directory whose `node_modules` provides `playwright`
    pub node_project_dir: PathBuf,
    pub command_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self::from_ui(&UiConfig::default())
    }
}

impl PlaywrightConfig {
    pub fn from_ui(ui: &UiConfig) -> Self {
        Self {
            base_url: ui.base_url.trim_end_matches('/').to_string(),
            screenshot_dir: ui.screenshot_dir.clone(),
            viewport_width: ui.viewport_width,
            viewport_height: ui.viewport_height,
            browser: ui.browser,
            headless: ui.headless,
            node_project_dir: ui.node_project_dir.clone(),
            command_timeout: Duration::from_millis(ui.command_timeout_ms),
        }
    }
}

struct BridgeIo {
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

/// Live browser page driven through the bridge
pub struct PlaywrightSession {
    child: Mutex<Child>,
    io: Mutex<BridgeIo>,
    config: PlaywrightConfig,
    // Holds the bridge script for the lifetime of the process
    _script_dir: tempfile::TempDir,
}

impl PlaywrightSession {
    /// Start the bridge and wait until the page is ready
    pub async fn launch(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed(&config.node_project_dir)?;
        std::fs::create_dir_all(&config.screenshot_dir)?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, build_bridge_script(&config))?;

        info!(
            "Launching {} bridge for {}",
            config.browser.as_str(),
            config.base_url
        );

        let node_modules = config.node_project_dir.join("node_modules");
        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .current_dir(&config.node_project_dir)
            .env("NODE_PATH", &node_modules)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("failed to spawn node: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdout unavailable".to_string()))?;

        let session = Self {
            child: Mutex::new(child),
            io: Mutex::new(BridgeIo {
                stdin,
                lines: BufReader::new(stdout).lines(),
                next_id: 1,
            }),
            config,
            _script_dir: script_dir,
        };

        // The bridge announces itself with id 0 once the page exists
        let launch_timeout = session.config.command_timeout * 4;
        let mut io = session.io.lock().await;
        tokio::time::timeout(launch_timeout, read_response(&mut io.lines, 0))
            .await
            .map_err(|_| E2eError::Timeout("browser launch".to_string()))??;
        drop(io);

        Ok(session)
    }

    /// Check that `playwright` resolves from the node project
    fn check_playwright_installed(node_project_dir: &Path) -> E2eResult<()> {
        let status = Command::new("npx")
            .args(["playwright", "--version"])
            .current_dir(node_project_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    pub fn config(&self) -> &PlaywrightConfig {
        &self.config
    }

    /// Send one command and wait for its answer
    pub async fn send(&self, command: BridgeCommand) -> E2eResult<Value> {
        let label = command.label();
        let mut io = self.io.lock().await;
        let id = io.next_id;
        io.next_id += 1;

        let mut line = serde_json::to_string(&Request { id, command: &command })?;
        line.push('\n');
        debug!("bridge #{} {}", id, label);

        let exchange = async {
            io.stdin.write_all(line.as_bytes()).await?;
            io.stdin.flush().await?;
            read_response(&mut io.lines, id).await
        };

        let response = tokio::time::timeout(self.config.command_timeout, exchange)
            .await
            .map_err(|_| E2eError::Timeout(label.clone()))??;

        if response.ok {
            Ok(response.value)
        } else {
            Err(E2eError::Playwright(format!(
                "{}: {}",
                label,
                response.error.unwrap_or_else(|| "unknown error".to_string())
            )))
        }
    }

    pub async fn goto(&self, url: &str) -> E2eResult<()> {
        self.send(BridgeCommand::Goto { url: url.to_string() }).await.map(drop)
    }

    pub async fn click(&self, selector: &str) -> E2eResult<()> {
        self.send(BridgeCommand::Click {
            selector: selector.to_string(),
        })
        .await
        .map(drop)
    }

    pub async fn fill(&self, selector: &str, value: &str) -> E2eResult<()> {
        self.send(BridgeCommand::Fill {
            selector: selector.to_string(),
            value: value.to_string(),
        })
        .await
        .map(drop)
    }

    pub async fn select(&self, selector: &str, value: &str) -> E2eResult<()> {
        self.send(BridgeCommand::Select {
            selector: selector.to_string(),
            value: value.to_string(),
        })
        .await
        .map(drop)
    }

    pub async fn wait_for(&self, selector: &str, state: WaitState) -> E2eResult<()> {
        self.send(BridgeCommand::Wait {
            selector: selector.to_string(),
            state,
            timeout_ms: self.config.command_timeout.as_millis() as u64,
        })
        .await
        .map(drop)
    }

    /// Evaluate a function body in the page and decode its return value
    pub async fn eval<T: DeserializeOwned>(&self, script: &str, arg: Value) -> E2eResult<T> {
        let value = self
            .send(BridgeCommand::Eval {
                script: script.to_string(),
                arg,
            })
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Full-page screenshot saved as `{screenshot_dir}/{name}.png`
    pub async fn screenshot(&self, name: &str) -> E2eResult<PathBuf> {
        let path = self.config.screenshot_dir.join(format!("{}.png", name));
        self.send(BridgeCommand::Screenshot {
            path: path.to_string_lossy().to_string(),
            full_page: true,
        })
        .await?;
        Ok(path)
    }

    /// Close the browser and wait for the bridge to exit
    pub async fn close(&self) -> E2eResult<()> {
        if let Err(e) = self.send(BridgeCommand::Close).await {
            warn!("Bridge did not acknowledge close: {}", e);
        }
        let mut child = self.child.lock().await;
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(status) => {
                debug!("Bridge exited: {:?}", status?);
            }
            Err(_) => {
                warn!("Bridge still running, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

/// Read lines until the response for `id` arrives; stray output is skipped
async fn read_response(lines: &mut Lines<BufReader<ChildStdout>>, id: u64) -> E2eResult<Response> {
    loop {
        let line = lines
            .next_line()
            .await?
            .ok_or_else(|| E2eError::Playwright("bridge exited".to_string()))?;

        match serde_json::from_str::<Response>(&line) {
            Ok(response) if response.id == id => return Ok(response),
            Ok(response) => debug!("Dropping stale bridge response #{}", response.id),
            Err(_) => debug!("bridge: {}", line),
        }
    }
}

/// Node program hosting the page
pub fn build_bridge_script(config: &PlaywrightConfig) -> String {
    let base_url = serde_json::to_string(&config.base_url).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        r#"
const {{ chromium, firefox, webkit }} = require('playwright');
const readline = require('readline');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }}
  }});
  const page = await context.newPage();
  page.on('dialog', dialog => dialog.accept());
  const baseUrl = {base_url};
  const reply = (id, body) => process.stdout.write(JSON.stringify({{ id, ...body }}) + '\n');
  const resolve = url => /^https?:\/\//.test(url) ? url : baseUrl + url;

  reply(0, {{ ok: true, value: 'ready' }});

  const rl = readline.createInterface({{ input: process.stdin }});
  for await (const line of rl) {{
    if (!line.trim()) continue;
    let cmd;
    try {{
      cmd = JSON.parse(line);
    }} catch (error) {{
      continue;
    }}
    try {{
      let value = null;
      switch (cmd.op) {{
        case 'goto':
          await page.goto(resolve(cmd.url), {{ waitUntil: 'networkidle' }});
          break;
        case 'click':
          await page.click(cmd.selector);
          break;
        case 'fill':
          await page.fill(cmd.selector, cmd.value);
          break;
        case 'select':
          await page.selectOption(cmd.selector, cmd.value);
          break;
        case 'wait':
          await page.waitForSelector(cmd.selector, {{ state: cmd.state, timeout: cmd.timeout_ms }});
          break;
        case 'eval':
          value = await page.evaluate(
            ({{ body, arg }}) => new Function('arg', body)(arg),
            {{ body: cmd.script, arg: cmd.arg }}
          );
          break;
        case 'screenshot':
          await page.screenshot({{ path: cmd.path, fullPage: cmd.full_page }});
          value = cmd.path;
          break;
        case 'close':
          reply(cmd.id, {{ ok: true, value: null }});
          await browser.close();
          process.exit(0);
        default:
          throw new Error('unknown op ' + cmd.op);
      }}
      reply(cmd.id, {{ ok: true, value: value === undefined ? null : value }});
    }} catch (error) {{
      reply(cmd.id, {{ ok: false, error: error.message }});
    }}
  }}
  await browser.close();
}})().catch(error => {{
  console.error(error);
  process.exit(1);
}});
"#,
        browser = config.browser.as_str(),
        headless = config.headless,
        width = config.viewport_width,
        height = config.viewport_height,
        base_url = base_url,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let command = BridgeCommand::Wait {
            selector: "#x".to_string(),
            state: WaitState::Detached,
            timeout_ms: 500,
        };
        let line = serde_json::to_value(Request { id: 7, command: &command }).unwrap();
        assert_eq!(
            line,
            serde_json::json!({"id": 7, "op": "wait", "selector": "#x", "state": "detached", "timeout_ms": 500})
        );
    }

    #[test]
    fn test_response_without_value() {
        let response: Response = serde_json::from_str(r#"{"id":2,"ok":false,"error":"boom"}"#).unwrap();
        assert_eq!(response.id, 2);
        assert!(!response.ok);
        assert_eq!(response.value, Value::Null);
        assert_eq!(response.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_bridge_script_embeds_config() {
        let config = PlaywrightConfig {
            browser: Browser::Firefox,
            headless: false,
            base_url: "http://127.0.0.1:3000".to_string(),
            ..PlaywrightConfig::default()
        };
        let script = build_bridge_script(&config);
        assert!(script.contains("await firefox.launch({ headless: false })"));
        assert!(script.contains(r#"const baseUrl = "http://127.0.0.1:3000";"#));
        assert!(script.contains("viewport: { width: 1280, height: 720 }"));
    }

    #[test]
    fn test_browser_names_deserialize_lowercase() {
        let browser: Browser = serde_json::from_str("\"webkit\"").unwrap();
        assert_eq!(browser, Browser::Webkit);
    }
}
