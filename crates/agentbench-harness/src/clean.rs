//! Terminal noise removal for agent output.

use regex::Regex;

/// Strips ANSI escapes and the agent's own log lines from its output.
#[derive(Debug, Clone)]
pub struct NoiseFilter {
    ansi: Regex,
    level: Regex,
    timestamped: Regex,
    log_target: Option<String>,
}

impl NoiseFilter {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            ansi: Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]")?,
            level: Regex::new(r"\b(TRACE|DEBUG|INFO|WARN|ERROR)\b")?,
            timestamped: Regex::new(
                r"^\s*\d{4}-\d{2}-\d{2}T[0-9:.]+Z?\s+(TRACE|DEBUG|INFO|WARN|ERROR)\s",
            )?,
            log_target: None,
        })
    }

    /// Also drop level-tagged lines mentioning `<target>::`.
    pub fn with_log_target(mut self, target: impl Into<String>) -> Self {
        let target = target.into();
        self.log_target = (!target.is_empty()).then(|| format!("{}::", target));
        self
    }

    pub fn clean(&self, raw: &str) -> String {
        let plain = self.ansi.replace_all(raw, "");
        plain
            .lines()
            .filter(|line| !self.is_log_line(line))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    fn is_log_line(&self, line: &str) -> bool {
        if self.timestamped.is_match(line) {
            return true;
        }
        match &self.log_target {
            Some(target) => line.contains(target.as_str()) && self.level.is_match(line),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ansi_and_log_lines() {
        let filter = NoiseFilter::new().expect("regex").with_log_target("agent");
        let raw = "\x1b[2m2026-01-01T00:00:00.123Z\x1b[0m \x1b[32m INFO\x1b[0m agent::loop: started\n\
                   \x1b[1mBENCH_OK_001\x1b[0m\n\
                   WARN agent::memory: slow store\n";
        assert_eq!(filter.clean(raw), "BENCH_OK_001");
    }

    #[test]
    fn keeps_answer_lines_that_mention_levels() {
        let filter = NoiseFilter::new().expect("regex").with_log_target("agent");
        let raw = "1. Check the ERROR logs\n2. Fix config";
        assert_eq!(filter.clean(raw), raw);
    }
}
