//! Server management - spawning and health checking the application under test

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

/// Time a SIGTERMed server gets to exit before it is killed
const STOP_GRACE: Duration = Duration::from_millis(500);
const STOP_POLL: Duration = Duration::from_millis(25);

/// Handle to a running server process
pub struct ServerHandle {
    child: Child,
    pub base_url: String,
    pub port: u16,
}

impl ServerHandle {
    /// Spawn the application server and wait until it reports healthy
    pub async fn spawn(config: ServerConfig) -> E2eResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let base_url = format!("http://{}:{}", config.host, port);

        info!("Spawning {} on port {}", config.command, port);

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .env(&config.port_env, port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!("Failed to spawn {}: {}", config.command, e))
        })?;

        let mut handle = ServerHandle {
            child,
            base_url: base_url.clone(),
            port,
        };

        let health_url = format!("{}{}", base_url, config.health_path);
        if let Err(e) = handle
            .wait_for_healthy(&health_url, Duration::from_secs(config.startup_timeout_secs))
            .await
        {
            handle.stop().await?;
            return Err(e);
        }

        info!("Server is healthy at {}", base_url);
        Ok(handle)
    }

    /// Wait for the server to respond to health checks
    async fn wait_for_healthy(&mut self, health_url: &str, timeout_duration: Duration) -> E2eResult<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            if let Some(status) = self.child.try_wait()? {
                return Err(E2eError::ServerStartup(format!(
                    "server exited during startup with {}",
                    status
                )));
            }

            match client.get(health_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for server to start...");
                    }
                    // Connection refused is expected while the server boots
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(100)).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop the server: SIGTERM, short grace period, then kill
    pub async fn stop(&mut self) -> E2eResult<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        info!("Stopping server (pid: {})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                let deadline = tokio::time::Instant::now() + STOP_GRACE;
                while tokio::time::Instant::now() < deadline {
                    if self.child.try_wait()?.is_some() {
                        return Ok(());
                    }
                    sleep(STOP_POLL).await;
                }
                debug!("Server ignored SIGTERM for {:?}", STOP_GRACE);
            }
        }

        self.kill();
        Ok(())
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// No grace period here; `stop` is the orderly path
impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            self.kill();
        }
    }
}

/// How to launch the application under test, from the `[server]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Executable to run
    pub command: String,

    pub args: Vec<String>,

    /// Extra environment for the process
    pub env: HashMap<String, String>,

    /// Variable the chosen port is passed in
    pub port_env: String,

    pub host: String,

    /// Fixed port (None = find a free one)
    pub port: Option<u16>,

    pub working_dir: Option<PathBuf>,

    /// Polled until it answers 2xx
    pub health_path: String,

    pub startup_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: "uvicorn".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            port_env: "PORT".to_string(),
            host: "127.0.0.1".to_string(),
            port: None,
            working_dir: None,
            health_path: "/api/health".to_string(),
            startup_timeout_secs: 30,
        }
    }
}

/// Find a free port to use
pub fn find_free_port() -> E2eResult<u16> {
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|e| E2eError::ServerStartup(format!("no free port: {}", e)))?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_port() {
        let port1 = find_free_port().unwrap();
        let port2 = find_free_port().unwrap();

        assert!(port1 > 1024);
        assert!(port2 > 1024);
    }

    #[test]
    fn test_server_config_from_toml() {
        let config: ServerConfig = toml::from_str(
            r#"
command = "python"
args = ["-m", "app"]
port_env = "APP_PORT"

[env]
DATABASE_URL = "sqlite:///tmp/e2e.db"
"#,
        )
        .unwrap();
        assert_eq!(config.args, vec!["-m", "app"]);
        assert_eq!(config.port_env, "APP_PORT");
        assert_eq!(config.env["DATABASE_URL"], "sqlite:///tmp/e2e.db");
        assert_eq!(config.health_path, "/api/health");
    }

    #[tokio::test]
    async fn test_spawn_reports_early_exit() {
        let config = ServerConfig {
            command: "false".to_string(),
            startup_timeout_secs: 5,
            ..ServerConfig::default()
        };
        assert!(ServerHandle::spawn(config).await.is_err());
    }

    fn handle_for(child: Child) -> ServerHandle {
        ServerHandle {
            child,
            base_url: "http://127.0.0.1:0".to_string(),
            port: 0,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_yields_to_other_tasks_during_grace() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let child = Command::new("sh")
            .args(["-c", "trap '' TERM; exec sleep 30"])
            .spawn()
            .unwrap();
        let mut handle = handle_for(child);
        sleep(Duration::from_millis(200)).await;

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = ticks.clone();
            tokio::spawn(async move {
                loop {
                    sleep(Duration::from_millis(20)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        handle.stop().await.unwrap();
        ticker.abort();

        assert!(handle.child.try_wait().unwrap().is_some());
        assert!(ticks.load(Ordering::SeqCst) >= 5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_returns_once_server_exits_on_sigterm() {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let mut handle = handle_for(child);

        let started = std::time::Instant::now();
        handle.stop().await.unwrap();

        assert!(handle.child.try_wait().unwrap().is_some());
        assert!(started.elapsed() < STOP_GRACE);
        // Stopping twice is a no-op
        handle.stop().await.unwrap();
    }
}
