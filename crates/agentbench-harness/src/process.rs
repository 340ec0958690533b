//! Agent executed as a child process, one process per turn.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use agentbench_core::{HarnessConfig, Tunables};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::agent::{AgentError, AgentHandle, AgentReply};
use crate::clean::NoiseFilter;
use crate::profile::AgentProfile;

/// How long to keep reading a pipe after the agent process is gone.
const PIPE_DRAIN: Duration = Duration::from_secs(2);

/// Spawns `<program> agent -m <prompt> [--provider P] [--model M] [--temperature T]`.
pub struct ProcessAgent {
    program: PathBuf,
    provider: Option<String>,
    model: Option<String>,
    temperature: Option<f64>,
    workspace_env: String,
    profile: AgentProfile,
    filter: NoiseFilter,
}

impl ProcessAgent {
    pub fn new(program: impl Into<PathBuf>, profile: AgentProfile) -> Result<Self, AgentError> {
        let program = program.into();
        let target = program
            .file_stem()
            .map(|s| s.to_string_lossy().replace('-', "_"))
            .unwrap_or_default();
        let filter = NoiseFilter::new()
            .map_err(|e| AgentError::Io(std::io::Error::other(e)))?
            .with_log_target(target);
        Ok(Self {
            program,
            provider: None,
            model: None,
            temperature: None,
            workspace_env: agentbench_core::config::DEFAULT_WORKSPACE_ENV.to_string(),
            profile,
            filter,
        })
    }

    /// Build from harness configuration and a prepared profile.
    pub fn from_config(config: &HarnessConfig, profile: AgentProfile) -> Result<Self, AgentError> {
        let mut agent = Self::new(&config.agent_bin, profile)?
            .with_workspace_env(config.workspace_env.clone());
        agent.provider = config.provider.clone();
        agent.model = config.model.clone();
        agent.temperature = config.temperature;
        Ok(agent)
    }

    pub fn with_workspace_env(mut self, name: impl Into<String>) -> Self {
        self.workspace_env = name.into();
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Command-line arguments for one turn.
    pub fn args(&self, prompt: &str) -> Vec<String> {
        let mut args = vec!["agent".to_string(), "-m".to_string(), prompt.to_string()];
        if let Some(provider) = &self.provider {
            args.extend(["--provider".to_string(), provider.clone()]);
        }
        if let Some(model) = &self.model {
            args.extend(["--model".to_string(), model.clone()]);
        }
        if let Some(temperature) = self.temperature {
            args.extend(["--temperature".to_string(), temperature.to_string()]);
        }
        args
    }

    /// Cleaned stdout, or cleaned stderr when stdout is blank.
    fn best_output(&self, stdout: &str, stderr: &str) -> String {
        if stdout.trim().is_empty() {
            self.filter.clean(stderr)
        } else {
            self.filter.clean(stdout)
        }
    }
}

#[async_trait]
impl AgentHandle for ProcessAgent {
    fn name(&self) -> &str {
        "process"
    }

    async fn configure(&self, tunables: &Tunables) -> Result<(), AgentError> {
        self.profile
            .apply(tunables)
            .map_err(|e| AgentError::Io(std::io::Error::other(e)))
    }

    async fn send_turn(&self, prompt: &str, timeout: Duration) -> Result<AgentReply, AgentError> {
        let start = Instant::now();

        let mut child = Command::new(&self.program)
            .args(self.args(prompt))
            .env(&self.workspace_env, self.profile.workspace())
            .current_dir(self.profile.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AgentError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdout = Captured::drain(child.stdout.take());
        let stderr = Captured::drain(child.stderr.take());

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                let partial = self.best_output(&stdout.finish().await, &stderr.finish().await);
                debug!(partial_bytes = partial.len(), "agent turn timed out");
                return Err(AgentError::Timeout {
                    after: timeout,
                    partial,
                });
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = status.code();
        let stdout = stdout.finish().await;
        let stderr = stderr.finish().await;
        debug!(exit_code = ?exit_code, duration_ms, "agent turn finished");

        if !status.success() {
            let detail = self.filter.clean(&stderr);
            return Err(AgentError::Crash {
                code: exit_code,
                detail: if detail.is_empty() {
                    "no stderr output".to_string()
                } else {
                    detail
                },
            });
        }

        Ok(AgentReply {
            text: self.best_output(&stdout, &stderr),
            exit_code,
            duration_ms,
        })
    }
}

/// A child pipe read in the background so output survives a kill.
struct Captured {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl Captured {
    fn drain<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = pipe.map(|mut pipe| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 4096];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if let Ok(mut buffer) = buffer.lock() {
                                buffer.extend_from_slice(&chunk[..n]);
                            }
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    /// Wait briefly for the pipe to close, then return what was read.
    async fn finish(self) -> String {
        if let Some(task) = self.task {
            if tokio::time::timeout(PIPE_DRAIN, task).await.is_err() {
                debug!("pipe still open after the agent exited");
            }
        }
        self.buffer
            .lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> (tempfile::TempDir, AgentProfile) {
        let dir = tempfile::tempdir().expect("tempdir");
        let profile = AgentProfile::prepare(dir.path(), None).expect("prepare");
        (dir, profile)
    }

    #[test]
    fn args_include_overrides() {
        let (_dir, profile) = profile();
        let agent = ProcessAgent::new("agent", profile)
            .expect("agent")
            .with_provider("openrouter")
            .with_model("m1")
            .with_temperature(0.2);
        assert_eq!(
            agent.args("hi"),
            vec![
                "agent",
                "-m",
                "hi",
                "--provider",
                "openrouter",
                "--model",
                "m1",
                "--temperature",
                "0.2"
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn echo_reply_is_captured() {
        let (_dir, profile) = profile();
        let agent = ProcessAgent::new("echo", profile).expect("agent");
        let reply = agent
            .send_turn("hello", Duration::from_secs(10))
            .await
            .expect("reply");
        assert_eq!(reply.text, "agent -m hello");
        assert_eq!(reply.exit_code, Some(0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_crash() {
        let (_dir, profile) = profile();
        let agent = ProcessAgent::new("false", profile).expect("agent");
        let err = agent
            .send_turn("hello", Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Crash { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_keeps_output_printed_so_far() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("slow-agent.sh");
        std::fs::write(&script, "#!/bin/sh\necho 'step one done'\nexec sleep 30\n")
            .expect("write script");
        let mut perms = std::fs::metadata(&script).expect("meta").permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&script, perms).expect("chmod");

        let (_profile_dir, profile) = profile();
        let agent = ProcessAgent::new(&script, profile).expect("agent");
        let err = agent
            .send_turn("hello", Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.partial_output(), "step one done");
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let (_dir, profile) = profile();
        let agent = ProcessAgent::new("/nonexistent/agentbench-agent", profile).expect("agent");
        let err = agent
            .send_turn("hello", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Spawn { .. }));
    }
}
