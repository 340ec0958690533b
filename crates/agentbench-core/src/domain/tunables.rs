//! Bounded tunable parameters adjusted between benchmark loops.
//!
//! A [`Tunables`] value is an immutable snapshot: every mutator returns a new
//! snapshot and leaves the original untouched. The harness reads one
//! snapshot at the start of each loop; only the tuner produces the next one.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::TunableError;

/// Extra retries granted to a timed-out or crashed turn.
pub const RETRY_BUDGET: &str = "retry_budget";
/// Percentage applied to every turn timeout.
pub const TIMEOUT_SCALE_PCT: &str = "timeout_scale_pct";
/// Append a numbered-steps formatting hint to prompts.
pub const STEPS_HINT: &str = "steps_hint";
/// Append an exact-reply formatting hint to prompts.
pub const EXACT_REPLY_HINT: &str = "exact_reply_hint";
/// Prefix of overrides forwarded to the agent profile configuration.
pub const PROFILE_PREFIX: &str = "profile.";
/// Maximum number of profile overrides in one snapshot.
pub const MAX_PROFILE_OVERRIDES: usize = 16;

const RETRY_BUDGET_RANGE: (i64, i64) = (0, 3);
const TIMEOUT_SCALE_RANGE: (i64, i64) = (100, 400);

/// Value of a single tunable parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TunableValue {
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<String>),
}

impl TunableValue {
    fn type_name(&self) -> &'static str {
        match self {
            TunableValue::Bool(_) => "bool",
            TunableValue::Int(_) => "int",
            TunableValue::Text(_) => "text",
            TunableValue::List(_) => "list",
        }
    }
}

impl fmt::Display for TunableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunableValue::Bool(b) => write!(f, "{}", b),
            TunableValue::Int(i) => write!(f, "{}", i),
            TunableValue::Text(s) => write!(f, "{:?}", s),
            TunableValue::List(items) => write!(f, "{:?}", items),
        }
    }
}

/// Immutable snapshot of tunable parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, TunableValue>",
    into = "BTreeMap<String, TunableValue>"
)]
pub struct Tunables {
    values: BTreeMap<String, TunableValue>,
}

impl Tunables {
    /// Empty snapshot (all defaults).
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new snapshot with `name` set to `value`.
    pub fn with(&self, name: &str, value: TunableValue) -> Result<Self, TunableError> {
        check_value(name, &value)?;
        let mut values = self.values.clone();
        values.insert(name.to_string(), value);
        let overrides = values
            .keys()
            .filter(|k| k.starts_with(PROFILE_PREFIX))
            .count();
        if overrides > MAX_PROFILE_OVERRIDES {
            return Err(TunableError::TooManyOverrides {
                limit: MAX_PROFILE_OVERRIDES,
            });
        }
        Ok(Self { values })
    }

    /// Return a new snapshot with `name` removed (back to its default).
    pub fn without(&self, name: &str) -> Self {
        let mut values = self.values.clone();
        values.remove(name);
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&TunableValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TunableValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn retry_budget(&self) -> u32 {
        self.int_or(RETRY_BUDGET, 0) as u32
    }

    pub fn timeout_scale_pct(&self) -> u32 {
        self.int_or(TIMEOUT_SCALE_PCT, 100) as u32
    }

    pub fn steps_hint(&self) -> bool {
        matches!(self.get(STEPS_HINT), Some(TunableValue::Bool(true)))
    }

    pub fn exact_reply_hint(&self) -> bool {
        matches!(self.get(EXACT_REPLY_HINT), Some(TunableValue::Bool(true)))
    }

    /// Profile overrides as `(dotted path without prefix, value)`.
    pub fn profile_overrides(&self) -> impl Iterator<Item = (&str, &TunableValue)> {
        self.values
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(PROFILE_PREFIX).map(|path| (path, v)))
    }

    /// Printable view with secret-looking entries masked.
    pub fn redacted(&self) -> BTreeMap<String, String> {
        const MARKERS: [&str; 5] = ["api_key", "apikey", "token", "secret", "password"];
        self.values
            .iter()
            .map(|(k, v)| {
                let lower = k.to_lowercase();
                let shown = if MARKERS.iter().any(|m| lower.contains(m)) {
                    "[REDACTED]".to_string()
                } else {
                    v.to_string()
                };
                (k.clone(), shown)
            })
            .collect()
    }

    fn int_or(&self, name: &str, default: i64) -> i64 {
        match self.get(name) {
            Some(TunableValue::Int(i)) => *i,
            _ => default,
        }
    }
}

impl TryFrom<BTreeMap<String, TunableValue>> for Tunables {
    type Error = TunableError;

    fn try_from(map: BTreeMap<String, TunableValue>) -> Result<Self, Self::Error> {
        map.into_iter()
            .try_fold(Tunables::new(), |acc, (name, value)| acc.with(&name, value))
    }
}

impl From<Tunables> for BTreeMap<String, TunableValue> {
    fn from(tunables: Tunables) -> Self {
        tunables.values
    }
}

fn check_value(name: &str, value: &TunableValue) -> Result<(), TunableError> {
    match name {
        RETRY_BUDGET => check_int(name, value, RETRY_BUDGET_RANGE),
        TIMEOUT_SCALE_PCT => check_int(name, value, TIMEOUT_SCALE_RANGE),
        STEPS_HINT | EXACT_REPLY_HINT => match value {
            TunableValue::Bool(_) => Ok(()),
            _ => Err(TunableError::WrongType {
                name: name.to_string(),
                expected: "bool",
            }),
        },
        _ => match name.strip_prefix(PROFILE_PREFIX) {
            Some(path) if is_valid_profile_path(path) => Ok(()),
            _ => Err(TunableError::UnknownParameter(name.to_string())),
        },
    }
}

fn check_int(name: &str, value: &TunableValue, (min, max): (i64, i64)) -> Result<(), TunableError> {
    match value {
        TunableValue::Int(v) if (min..=max).contains(v) => Ok(()),
        TunableValue::Int(v) => Err(TunableError::OutOfRange {
            name: name.to_string(),
            value: *v,
            min,
            max,
        }),
        other => Err(TunableError::WrongType {
            name: format!("{} (got {})", name, other.type_name()),
            expected: "int",
        }),
    }
}

/// `table.key` or deeper; segments are `[A-Za-z0-9_-]+`.
fn is_valid_profile_path(path: &str) -> bool {
    let segments: Vec<&str> = path.split('.').collect();
    segments.len() >= 2
        && segments.iter().all(|s| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let t = Tunables::new();
        assert_eq!(t.retry_budget(), 0);
        assert_eq!(t.timeout_scale_pct(), 100);
        assert!(!t.steps_hint());
        assert!(!t.exact_reply_hint());
    }

    #[test]
    fn with_returns_new_snapshot() {
        let base = Tunables::new();
        let next = base
            .with(RETRY_BUDGET, TunableValue::Int(2))
            .expect("in range");
        assert_eq!(base.retry_budget(), 0);
        assert_eq!(next.retry_budget(), 2);
    }

    #[test]
    fn out_of_range_rejected() {
        let err = Tunables::new()
            .with(RETRY_BUDGET, TunableValue::Int(7))
            .unwrap_err();
        assert!(matches!(err, TunableError::OutOfRange { max: 3, .. }));

        let err = Tunables::new()
            .with(TIMEOUT_SCALE_PCT, TunableValue::Int(50))
            .unwrap_err();
        assert!(matches!(err, TunableError::OutOfRange { min: 100, .. }));
    }

    #[test]
    fn unknown_and_mistyped_rejected() {
        assert!(matches!(
            Tunables::new().with("temperature", TunableValue::Int(1)),
            Err(TunableError::UnknownParameter(_))
        ));
        assert!(matches!(
            Tunables::new().with(STEPS_HINT, TunableValue::Int(1)),
            Err(TunableError::WrongType { .. })
        ));
        assert!(Tunables::new()
            .with("profile.nodots", TunableValue::Bool(true))
            .is_err());
    }

    #[test]
    fn profile_overrides_bounded() {
        let mut t = Tunables::new();
        for i in 0..MAX_PROFILE_OVERRIDES {
            t = t
                .with(&format!("profile.table.key{}", i), TunableValue::Bool(true))
                .expect("within limit");
        }
        let err = t
            .with("profile.table.overflow", TunableValue::Bool(true))
            .unwrap_err();
        assert!(matches!(err, TunableError::TooManyOverrides { .. }));
        assert_eq!(t.profile_overrides().count(), MAX_PROFILE_OVERRIDES);
    }

    #[test]
    fn serde_validates_on_read() {
        let json = serde_json::json!({"retry_budget": 1, "steps_hint": true});
        let t: Tunables = serde_json::from_value(json).expect("valid");
        assert_eq!(t.retry_budget(), 1);
        assert!(t.steps_hint());

        let bad = serde_json::json!({"retry_budget": 99});
        assert!(serde_json::from_value::<Tunables>(bad).is_err());
    }

    #[test]
    fn redacted_masks_secrets() {
        let t = Tunables::new()
            .with(
                "profile.provider.api_key",
                TunableValue::Text("sk-123".to_string()),
            )
            .expect("valid")
            .with("profile.memory.auto_save", TunableValue::Bool(true))
            .expect("valid");
        let shown = t.redacted();
        assert_eq!(shown["profile.provider.api_key"], "[REDACTED]");
        assert_eq!(shown["profile.memory.auto_save"], "true");
    }
}
