//! Agent boundary.
//!
//! An [`AgentHandle`] answers one prompt at a time. The harness owns the
//! timeout; implementations only need to honour the duration they are given.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use agentbench_core::Tunables;
use async_trait::async_trait;

/// A successful turn.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    /// Agent output with terminal noise removed.
    pub text: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl AgentReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            exit_code: Some(0),
            duration_ms: 0,
        }
    }
}

/// Why a turn produced no usable reply.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// `partial` holds whatever the agent printed before it was stopped.
    #[error("no reply within {}s", .after.as_secs_f64())]
    Timeout { after: Duration, partial: String },

    #[error("agent exited with code {code:?}: {detail}")]
    Crash { code: Option<i32>, detail: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("agent io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    pub fn timeout(after: Duration) -> Self {
        AgentError::Timeout {
            after,
            partial: String::new(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AgentError::Timeout { .. })
    }

    /// Output captured before the failure, kept for diagnosis.
    pub fn partial_output(&self) -> &str {
        match self {
            AgentError::Timeout { partial, .. } => partial,
            AgentError::Crash { detail, .. } => detail,
            _ => "",
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            AgentError::Crash { code, .. } => *code,
            _ => None,
        }
    }
}

/// The agent under test.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// Apply a tunables snapshot before a loop starts.
    async fn configure(&self, tunables: &Tunables) -> Result<(), AgentError>;

    /// Send one prompt and wait at most `timeout` for the reply.
    async fn send_turn(&self, prompt: &str, timeout: Duration) -> Result<AgentReply, AgentError>;
}

/// One scripted step of a [`ScriptedAgent`].
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Reply(String),
    /// Reply only after sleeping; lets tests exercise timeouts.
    Delay(Duration, String),
    /// Print `partial`, then never finish the turn.
    Stall(String),
    Crash(i32),
}

/// Agent that plays back a fixed script, then repeats a fallback reply.
///
/// Records every prompt and configured snapshot for assertions.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    script: Mutex<VecDeque<ScriptStep>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
    configured: Mutex<Vec<Tunables>>,
}

impl ScriptedAgent {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            fallback: "OK".to_string(),
            ..Self::default()
        }
    }

    /// Replies with `text` to every prompt.
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            fallback: text.into(),
            ..Self::default()
        }
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = text.into();
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn configured(&self) -> Vec<Tunables> {
        self.configured.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn next_step(&self) -> ScriptStep {
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| ScriptStep::Reply(self.fallback.clone()))
    }
}

#[async_trait]
impl AgentHandle for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn configure(&self, tunables: &Tunables) -> Result<(), AgentError> {
        if let Ok(mut configured) = self.configured.lock() {
            configured.push(tunables.clone());
        }
        Ok(())
    }

    async fn send_turn(&self, prompt: &str, timeout: Duration) -> Result<AgentReply, AgentError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        match self.next_step() {
            ScriptStep::Reply(text) => Ok(AgentReply::new(text)),
            ScriptStep::Delay(delay, text) => {
                if delay >= timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(AgentError::timeout(timeout));
                }
                tokio::time::sleep(delay).await;
                Ok(AgentReply {
                    duration_ms: delay.as_millis() as u64,
                    ..AgentReply::new(text)
                })
            }
            ScriptStep::Stall(partial) => {
                tokio::time::sleep(timeout).await;
                Err(AgentError::Timeout {
                    after: timeout,
                    partial,
                })
            }
            ScriptStep::Crash(code) => Err(AgentError::Crash {
                code: Some(code),
                detail: "scripted crash".to_string(),
            }),
        }
    }
}
