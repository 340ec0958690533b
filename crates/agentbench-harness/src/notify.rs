//! Best-effort run notifications.
//!
//! Channels are delivered concurrently. A failing channel is logged and
//! never affects the run or the other channels.

use std::time::Duration;

use agentbench_core::obs;
use agentbench_core::{GateDecision, GateThresholds, HarnessConfig, RunStatus, RunSummary};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Body sent to every channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPayload {
    /// `passed` or `failed` (gate verdict), `cancelled`, `errored`, or `no_loops`.
    pub status: String,
    pub run_id: String,
    pub loop_index: u32,
    pub score: f64,
    pub max_score: f64,
    pub pass_rate: f64,
    pub min_pass_rate: f64,
    pub min_score_ratio: f64,
}

impl NotificationPayload {
    pub fn from_run(
        summary: &RunSummary,
        decision: Option<&GateDecision>,
        thresholds: GateThresholds,
    ) -> Self {
        let status = match (summary.status, decision) {
            (RunStatus::Cancelled, _) => "cancelled",
            (RunStatus::Failed, _) => "errored",
            (_, Some(d)) if d.passed => "passed",
            (_, Some(_)) => "failed",
            (_, None) => "no_loops",
        };
        let last = summary.latest();
        Self {
            status: status.to_string(),
            run_id: summary.run_id.clone(),
            loop_index: last.map(|l| l.loop_index).unwrap_or(0),
            score: last.map(|l| l.score).unwrap_or(0.0),
            max_score: last.map(|l| l.max_score).unwrap_or(0.0),
            pass_rate: last.map(|l| l.pass_rate).unwrap_or(0.0),
            min_pass_rate: thresholds.min_pass_rate,
            min_score_ratio: thresholds.min_score_ratio,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook answered with status {0}")]
    Status(u16),
}

/// A delivery channel.
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), NotifyError>;
}

/// POSTs the payload as JSON.
pub struct WebhookChannel {
    url: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("agentbench/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl NotifyChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.url
    }

    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Writes the payload to the log.
pub struct LogChannel;

#[async_trait]
impl NotifyChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        info!(
            event = "notify.delivered",
            status = %payload.status,
            run_id = %payload.run_id,
            loop_index = payload.loop_index,
            score = payload.score,
            max_score = payload.max_score,
            pass_rate = payload.pass_rate,
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct Notifier {
    channels: Vec<Box<dyn NotifyChannel>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log channel plus one webhook per configured URL.
    pub fn from_config(config: &HarnessConfig) -> Self {
        config
            .webhooks
            .iter()
            .fold(Self::new().with_channel(LogChannel), |n, url| {
                n.with_channel(WebhookChannel::new(url.clone()))
            })
    }

    pub fn with_channel(mut self, channel: impl NotifyChannel + 'static) -> Self {
        self.channels.push(Box::new(channel));
        self
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Deliver to every channel; returns how many succeeded.
    pub async fn deliver_all(&self, payload: &NotificationPayload) -> usize {
        let deliveries = self.channels.iter().map(|channel| async move {
            let outcome = channel.deliver(payload).await;
            if let Err(e) = &outcome {
                obs::emit_delivery_failed(channel.name(), e);
            }
            outcome.is_ok()
        });
        futures::future::join_all(deliveries)
            .await
            .into_iter()
            .filter(|ok| *ok)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentbench_core::{decide, LoopResult, Tunables};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn summary() -> RunSummary {
        let mut summary = RunSummary::new("run-n", "");
        summary.push_loop(&LoopResult::aggregate(1, Vec::new(), Tunables::new()));
        summary
    }

    #[test]
    fn payload_reflects_decision() {
        let s = summary();
        let decision = decide(&s, GateThresholds::default()).expect("decide");
        let payload = NotificationPayload::from_run(&s, Some(&decision), GateThresholds::default());
        assert_eq!(payload.status, "failed");
        assert_eq!(payload.loop_index, 1);
        assert_eq!(payload.min_pass_rate, 70.0);

        let mut cancelled = s.clone();
        cancelled.cancel();
        let payload = NotificationPayload::from_run(&cancelled, None, GateThresholds::default());
        assert_eq!(payload.status, "cancelled");

        let mut errored = s.clone();
        errored.fail();
        let payload = NotificationPayload::from_run(&errored, Some(&decision), GateThresholds::default());
        assert_eq!(payload.status, "errored");
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_others() {
        let notifier = Notifier::new()
            .with_channel(LogChannel)
            .with_channel(WebhookChannel::new("http://127.0.0.1:9/unreachable"));
        let payload =
            NotificationPayload::from_run(&summary(), None, GateThresholds::default());
        assert_eq!(notifier.deliver_all(&payload).await, 1);
    }

    #[tokio::test]
    async fn webhook_posts_json() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.expect("read");
            socket
                .write_all(b"HTTP/1.1 204 No Content\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .expect("write");
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        let channel = WebhookChannel::new(format!("http://{}/hook", addr));
        let payload =
            NotificationPayload::from_run(&summary(), None, GateThresholds::default());
        channel.deliver(&payload).await.expect("deliver");

        let request = server.await.expect("join");
        assert!(request.starts_with("POST /hook"));
        assert!(request.contains("application/json"));
    }
}
