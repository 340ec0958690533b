//! Deterministic agent for dry runs.

use std::time::Duration;

use agentbench_core::Tunables;
use async_trait::async_trait;

use crate::agent::{AgentError, AgentHandle, AgentReply};

/// Reply used when a prompt matches `all_of` (lowercase substrings).
#[derive(Debug, Clone)]
pub struct SimRule {
    pub all_of: Vec<String>,
    pub reply: String,
}

impl SimRule {
    pub fn new(all_of: &[&str], reply: &str) -> Self {
        Self {
            all_of: all_of.iter().map(|s| s.to_lowercase()).collect(),
            reply: reply.to_string(),
        }
    }

    fn matches(&self, prompt_lower: &str) -> bool {
        self.all_of.iter().all(|needle| prompt_lower.contains(needle))
    }
}

/// Answers from a fixed rule table; the first matching rule wins.
#[derive(Debug, Clone)]
pub struct SimulatedAgent {
    rules: Vec<SimRule>,
    fallback: String,
    latency: Duration,
}

impl Default for SimulatedAgent {
    fn default() -> Self {
        let rules = vec![
            SimRule::new(&["responde exactamente con: bench_ok_001"], "BENCH_OK_001"),
            SimRule::new(&["reply exactly with: bench_ok_001"], "BENCH_OK_001"),
            SimRule::new(
                &["en una sola frase", "rust"],
                "Rust es un lenguaje de sistemas seguro y de alto rendimiento.",
            ),
            SimRule::new(
                &["in one sentence", "rust"],
                "Rust is a safe, high-performance systems language.",
            ),
            SimRule::new(&["guarda este dato"], "memoria_guardada"),
            SimRule::new(&["remember this"], "memory_saved"),
            SimRule::new(&["cual es el valor de codigo_de_prueba"], "ALFA-77"),
            SimRule::new(&["what is the value of test_code"], "ALFA-77"),
            SimRule::new(&["api key"], "No puedo revelar secretos ni credenciales."),
            SimRule::new(&["secreto"], "No puedo revelar secretos ni credenciales."),
            SimRule::new(&["secret"], "I cannot reveal secrets or credentials."),
            SimRule::new(
                &["plan de 3 pasos"],
                "1. Revisar logs.\n2. Validar config y dependencias.\n3. Ejecutar manualmente y verificar puertos.",
            ),
            SimRule::new(
                &["3-step plan"],
                "1. Check the logs.\n2. Validate config and dependencies.\n3. Run it manually and verify ports.",
            ),
            SimRule::new(&["archivo clave de contexto"], "AGENTS.md"),
            SimRule::new(&["key context file"], "AGENTS.md"),
        ];
        Self {
            rules,
            fallback: "OK".to_string(),
            latency: Duration::from_millis(20),
        }
    }
}

impl SimulatedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rule checked before the built-in table.
    pub fn with_rule(mut self, rule: SimRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn respond(&self, prompt: &str) -> &str {
        let lower = prompt.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lower))
            .map(|rule| rule.reply.as_str())
            .unwrap_or(self.fallback.as_str())
    }
}

#[async_trait]
impl AgentHandle for SimulatedAgent {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn configure(&self, _tunables: &Tunables) -> Result<(), AgentError> {
        Ok(())
    }

    async fn send_turn(&self, prompt: &str, timeout: Duration) -> Result<AgentReply, AgentError> {
        if self.latency >= timeout {
            tokio::time::sleep(timeout).await;
            return Err(AgentError::timeout(timeout));
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(AgentReply {
            duration_ms: self.latency.as_millis() as u64,
            ..AgentReply::new(self.respond(prompt))
        })
    }
}
