//! Server management - spawning and health checking the application under test

use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};
use crate::scenario::join_url;

/// Placeholder replaced by the chosen port in the server arguments
pub const PORT_PLACEHOLDER: &str = "{port}";

/// Handle to a running application process
pub struct ServerHandle {
    child: Child,
    pub base_url: String,
    pub port: u16,
}

impl ServerHandle {
    /// Spawn the application and wait until it answers its health check
    pub async fn spawn(config: ServerConfig) -> E2eResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let base_url = format!("http://{}:{}", config.host, port);

        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| E2eError::Config("server command is empty".to_string()))?;

        info!("Spawning {} on port {}", program, port);

        let mut cmd = Command::new(program);
        cmd.args(args.iter().map(|a| a.replace(PORT_PLACEHOLDER, &port.to_string())))
            .env("PORT", port.to_string())
            .env("HOST", &config.host)
            .envs(config.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(if config.inherit_stderr {
                Stdio::inherit()
            } else {
                Stdio::null()
            });

        let child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!("Failed to spawn {}: {}", program, e))
        })?;

        let mut handle = ServerHandle {
            child,
            base_url,
            port,
        };

        handle
            .wait_for_healthy(&config.health_path, config.startup_timeout)
            .await?;

        info!("Server is healthy at {}", handle.base_url);
        Ok(handle)
    }

    /// Wait for the server to respond to health checks
    async fn wait_for_healthy(&mut self, health_path: &str, timeout: Duration) -> E2eResult<()> {
        let health_url = join_url(&self.base_url, health_path);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout {
            attempts += 1;

            if let Some(status) = self.child.try_wait()? {
                return Err(E2eError::ServerStartup(format!(
                    "server exited before becoming healthy ({})",
                    status
                )));
            }

            match client.get(&health_url).send().await {
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

    pub fn stop(&mut self) -> E2eResult<()> {
        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }

        info!("Stopping server (pid: {})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        let _ = self.child.kill();
        let _ = self.child.wait();

        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Configuration for spawning the application
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Program and arguments; `{port}` in an argument is substituted
    pub command: Vec<String>,

    pub host: String,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    /// Path polled until it returns a 2xx
    pub health_path: String,

    pub startup_timeout: Duration,

    /// Extra environment for the server process
    pub env: Vec<(String, String)>,

    pub inherit_stderr: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "uvicorn".to_string(),
                "main:app".to_string(),
                "--host".to_string(),
                "127.0.0.1".to_string(),
                "--port".to_string(),
                PORT_PLACEHOLDER.to_string(),
            ],
            host: "127.0.0.1".to_string(),
            port: None,
            health_path: "/login".to_string(),
            startup_timeout: Duration::from_secs(30),
            env: Vec::new(),
            inherit_stderr: true,
        }
    }
}

impl ServerConfig {
    /// Build a config from a whitespace-separated command line
    pub fn from_command_line(command_line: &str) -> E2eResult<Self> {
        let command: Vec<String> = command_line.split_whitespace().map(String::from).collect();
        if command.is_empty() {
            return Err(E2eError::Config("server command is empty".to_string()));
        }
        Ok(Self {
            command,
            ..Default::default()
        })
    }
}

/// Find a free port to use
pub fn find_free_port() -> E2eResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_free_port() {
        let port = find_free_port().unwrap();
        assert!(port > 1024);
    }

    #[test]
    fn parses_command_line() {
        let config = ServerConfig::from_command_line("python -m app --port {port}").unwrap();
        assert_eq!(config.command, ["python", "-m", "app", "--port", "{port}"]);
        assert_eq!(config.health_path, "/login");
    }

    #[test]
    fn rejects_blank_command_line() {
        assert!(ServerConfig::from_command_line("   ").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn early_exit_is_reported_with_status() {
        let config = ServerConfig {
            command: vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()],
            startup_timeout: Duration::from_secs(30),
            inherit_stderr: false,
            ..Default::default()
        };

        let start = std::time::Instant::now();
        let err = ServerHandle::spawn(config).await.err().expect("spawn must fail");

        assert!(start.elapsed() < Duration::from_secs(10));
        match err {
            E2eError::ServerStartup(msg) => assert!(msg.contains("exit status: 3"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn spawn_fails_for_missing_binary() {
        let config = ServerConfig {
            command: vec!["/nonexistent/authflow-app".to_string()],
            startup_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let err = ServerHandle::spawn(config).await.err().expect("spawn must fail");
        assert!(matches!(err, E2eError::ServerStartup(_)));
    }
}
