//! Declarative check definitions.

use serde::{Deserialize, Serialize};

/// A single declarative assertion evaluated against transcript text.
///
/// Serialized externally tagged, e.g. `{"must_contain": ["hello"]}` or
/// `{"numbered_steps_min": 3}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    /// Trimmed text must equal the expected value exactly.
    Equals(String),

    /// Every string must appear as a substring.
    MustContain(Vec<String>),

    /// No string may appear as a substring.
    MustNotContain(Vec<String>),

    /// At least one string must appear as a substring.
    AnyOf(Vec<String>),

    /// At least `n` step markers must be present.
    NumberedStepsMin(u32),
}

/// Discriminant of a [`Check`], used for failure classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Equals,
    MustContain,
    MustNotContain,
    AnyOf,
    NumberedStepsMin,
}

impl CheckKind {
    /// Stable snake_case name.
    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::Equals => "equals",
            CheckKind::MustContain => "must_contain",
            CheckKind::MustNotContain => "must_not_contain",
            CheckKind::AnyOf => "any_of",
            CheckKind::NumberedStepsMin => "numbered_steps_min",
        }
    }
}

impl Check {
    /// The kind of this check.
    pub fn kind(&self) -> CheckKind {
        match self {
            Check::Equals(_) => CheckKind::Equals,
            Check::MustContain(_) => CheckKind::MustContain,
            Check::MustNotContain(_) => CheckKind::MustNotContain,
            Check::AnyOf(_) => CheckKind::AnyOf,
            Check::NumberedStepsMin(_) => CheckKind::NumberedStepsMin,
        }
    }

    /// Short human-readable description used in failure reports.
    pub fn describe(&self) -> String {
        match self {
            Check::Equals(expected) => format!("equals `{}`", expected),
            Check::MustContain(strings)
            | Check::MustNotContain(strings)
            | Check::AnyOf(strings) => {
                format!("{} [{}]", self.kind().name(), quote_all(strings))
            }
            Check::NumberedStepsMin(count) => format!("numbered_steps_min {}", count),
        }
    }
}

pub(crate) fn quote_all(strings: &[String]) -> String {
    strings
        .iter()
        .map(|s| format!("`{}`", s))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Recognised step-marker styles for `numbered_steps_min`.
///
/// A marker is a whitespace-separated token made of decimal digits
/// immediately followed by one of `delimiters` (and not by another digit),
/// or one of `words` (case-insensitive) followed by a token that starts
/// with a decimal digit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StepMarkers {
    /// Delimiters accepted after the sequence number (`1.`, `2)`).
    pub delimiters: Vec<char>,

    /// Localized step words (`Paso 1`, `Step 2`).
    pub words: Vec<String>,
}

impl Default for StepMarkers {
    fn default() -> Self {
        Self {
            delimiters: vec!['.', ')'],
            words: vec!["Paso".to_string(), "Step".to_string()],
        }
    }
}

impl StepMarkers {
    /// Reject marker sets that could never match or would match plain numbers.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.delimiters.is_empty() && self.words.is_empty() {
            return Err("step markers define neither delimiters nor words".to_string());
        }
        if let Some(d) = self
            .delimiters
            .iter()
            .find(|d| d.is_ascii_digit() || d.is_whitespace())
        {
            return Err(format!("invalid step delimiter {:?}", d));
        }
        if self.words.iter().any(|w| w.trim().is_empty()) {
            return Err("step words must not be blank".to_string());
        }
        Ok(())
    }

    /// Count step markers in `text`.
    pub fn count(&self, text: &str) -> usize {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let mut count = 0;
        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            if self.is_numbered(token) {
                count += 1;
                i += 1;
            } else if self.is_step_word(token)
                && tokens
                    .get(i + 1)
                    .is_some_and(|next| next.starts_with(|c: char| c.is_ascii_digit()))
            {
                count += 1;
                // The number belongs to this marker.
                i += 2;
            } else {
                i += 1;
            }
        }
        count
    }

    fn is_numbered(&self, token: &str) -> bool {
        let digits = token.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return false;
        }
        let mut rest = token[digits..].chars();
        match rest.next() {
            Some(delim) if self.delimiters.contains(&delim) => {
                !rest.next().is_some_and(|c| c.is_ascii_digit())
            }
            _ => false,
        }
    }

    fn is_step_word(&self, token: &str) -> bool {
        self.words.iter().any(|w| w.eq_ignore_ascii_case(token))
    }
}
