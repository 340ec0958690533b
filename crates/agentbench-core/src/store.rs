//! Scenario store: loads and validates declarative suites.
//!
//! Accepted documents:
//! - a JSON array of scenarios, or
//! - an object `{"name": ..., "version": ..., "scenarios": [...]}`.
//!
//! Turns are either bare prompt strings or `{"prompt", "timeout_secs"}`
//! objects. Checks are either an ordered list of externally tagged checks
//! or the legacy map form keyed by check kind. Loading is fail-fast: the
//! first problem aborts and no partial suite is returned.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::{Check, CheckScope, Scenario, Suite, Turn, ValidationError};

/// Where a suite document comes from.
#[derive(Debug, Clone, Copy)]
pub enum SuiteSource<'a> {
    /// JSON file on disk.
    Path(&'a Path),
    /// JSON document held in memory.
    Json(&'a str),
}

/// Load and validate a suite.
pub fn load(source: SuiteSource<'_>) -> Result<Suite, ValidationError> {
    match source {
        SuiteSource::Path(path) => load_path(path),
        SuiteSource::Json(raw) => load_str(raw, "suite"),
    }
}

/// Load a suite file. The file stem names the suite unless the document does.
pub fn load_path(path: &Path) -> Result<Suite, ValidationError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ValidationError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let default_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "suite".to_string());
    let suite = load_str(&raw, &default_name)?;
    debug!(path = %path.display(), scenarios = suite.len(), "loaded suite");
    Ok(suite)
}

/// Load a suite from a JSON string.
pub fn load_str(raw: &str, default_name: &str) -> Result<Suite, ValidationError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    load_value(value, default_name)
}

fn load_value(value: Value, default_name: &str) -> Result<Suite, ValidationError> {
    let (name, version, entries) = match value {
        Value::Array(entries) => (default_name.to_string(), String::new(), entries),
        Value::Object(mut obj) => {
            let entries = match obj.remove("scenarios") {
                Some(Value::Array(entries)) => entries,
                Some(_) => {
                    return Err(ValidationError::Malformed(
                        "`scenarios` must be an array".to_string(),
                    ))
                }
                None => {
                    return Err(ValidationError::Malformed(
                        "suite object has no `scenarios` array".to_string(),
                    ))
                }
            };
            let name = string_field(&obj, "name").unwrap_or_else(|| default_name.to_string());
            let version = string_field(&obj, "version").unwrap_or_default();
            (name, version, entries)
        }
        _ => {
            return Err(ValidationError::Malformed(
                "suite must be a JSON array or an object with `scenarios`".to_string(),
            ))
        }
    };

    let scenarios = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| parse_scenario(index, entry))
        .collect::<Result<Vec<_>, _>>()?;

    Suite::new(name, version, scenarios)
}

fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

#[derive(Deserialize)]
struct ScenarioDoc {
    id: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default = "default_weight")]
    weight: f64,
    #[serde(default)]
    turns: Vec<Value>,
    #[serde(default)]
    checks: Option<Value>,
    #[serde(default)]
    check_scope: CheckScope,
}

fn default_weight() -> f64 {
    1.0
}

/// Legacy map form; unknown keys are unknown check kinds and fail the load.
/// A present key always becomes a check, so empty lists fail validation the
/// same way they do in the list form.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LegacyChecks {
    equals: Option<String>,
    must_contain: Option<Vec<String>>,
    must_not_contain: Option<Vec<String>>,
    any_of: Option<Vec<String>>,
    numbered_steps_min: Option<u32>,
}

impl LegacyChecks {
    fn into_checks(self) -> Vec<Check> {
        let mut checks = Vec::new();
        if let Some(expected) = self.equals {
            checks.push(Check::Equals(expected));
        }
        if let Some(needles) = self.must_contain {
            checks.push(Check::MustContain(needles));
        }
        if let Some(needles) = self.must_not_contain {
            checks.push(Check::MustNotContain(needles));
        }
        if let Some(options) = self.any_of {
            checks.push(Check::AnyOf(options));
        }
        if let Some(count) = self.numbered_steps_min {
            checks.push(Check::NumberedStepsMin(count));
        }
        checks
    }
}

fn parse_scenario(index: usize, entry: Value) -> Result<Scenario, ValidationError> {
    let doc: ScenarioDoc = serde_json::from_value(entry)
        .map_err(|e| ValidationError::Malformed(format!("scenario at position {}: {}", index, e)))?;

    let turns = doc
        .turns
        .into_iter()
        .enumerate()
        .map(|(turn_index, raw)| parse_turn(&doc.id, turn_index, raw))
        .collect::<Result<Vec<_>, _>>()?;

    let checks = match doc.checks {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(check_index, item)| {
                serde_json::from_value::<Check>(item).map_err(|e| ValidationError::InvalidCheck {
                    id: doc.id.clone(),
                    check_index,
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(map @ Value::Object(_)) => serde_json::from_value::<LegacyChecks>(map)
            .map_err(|e| ValidationError::InvalidCheck {
                id: doc.id.clone(),
                check_index: 0,
                reason: e.to_string(),
            })?
            .into_checks(),
        Some(_) => {
            return Err(ValidationError::Malformed(format!(
                "scenario {}: `checks` must be a list or an object",
                doc.id
            )))
        }
    };

    Ok(Scenario {
        id: doc.id,
        description: doc.description,
        tags: doc.tags.into_iter().collect(),
        weight: doc.weight,
        turns,
        checks: checks.into_iter().map(dedup_strings).collect(),
        check_scope: doc.check_scope,
    })
}

fn parse_turn(id: &str, turn_index: usize, raw: Value) -> Result<Turn, ValidationError> {
    #[derive(Deserialize)]
    struct TurnDoc {
        prompt: String,
        timeout_secs: Option<u64>,
    }

    match raw {
        Value::String(prompt) => Ok(Turn::new(prompt.trim())),
        obj @ Value::Object(_) => {
            let doc: TurnDoc = serde_json::from_value(obj).map_err(|e| {
                ValidationError::Malformed(format!("scenario {} turn {}: {}", id, turn_index, e))
            })?;
            Ok(Turn {
                prompt: doc.prompt.trim().to_string(),
                timeout_secs: doc.timeout_secs,
            })
        }
        other => Err(ValidationError::Malformed(format!(
            "scenario {} turn {}: expected string or object, got {}",
            id, turn_index, other
        ))),
    }
}

/// String sets keep first-seen order without duplicates.
fn dedup_strings(check: Check) -> Check {
    fn dedup(strings: Vec<String>) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        strings
            .into_iter()
            .filter(|s| seen.insert(s.clone()))
            .collect()
    }
    match check {
        Check::MustContain(s) => Check::MustContain(dedup(s)),
        Check::MustNotContain(s) => Check::MustNotContain(dedup(s)),
        Check::AnyOf(s) => Check::AnyOf(dedup(s)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LEGACY: &str = r#"[
        {
            "id": "exact_reply",
            "description": "answers exactly",
            "tags": ["format"],
            "weight": 2,
            "turns": [{"prompt": "Reply exactly with: BENCH_OK_001", "timeout_secs": 30}],
            "checks": {"equals": "BENCH_OK_001"}
        },
        {
            "id": "plan",
            "turns": ["Give me a 3 step plan"],
            "checks": {"numbered_steps_min": 3, "must_not_contain": ["secret"]}
        }
    ]"#;

    #[test]
    fn loads_legacy_array_form() {
        let suite = load_str(LEGACY, "agent_tasks").expect("valid");
        assert_eq!(suite.name(), "agent_tasks");
        assert_eq!(suite.len(), 2);

        let exact = suite.get("exact_reply").expect("present");
        assert_eq!(exact.weight, 2.0);
        assert_eq!(exact.turns[0].timeout_secs, Some(30));
        assert_eq!(exact.checks, vec![Check::Equals("BENCH_OK_001".to_string())]);

        let plan = suite.get("plan").expect("present");
        assert_eq!(plan.weight, 1.0);
        assert_eq!(
            plan.checks,
            vec![
                Check::MustNotContain(vec!["secret".to_string()]),
                Check::NumberedStepsMin(3),
            ]
        );
    }

    #[test]
    fn loads_object_form_with_check_list() {
        let raw = r#"{
            "name": "smoke",
            "version": "1.0.0",
            "scenarios": [{
                "id": "greet",
                "weight": 10,
                "turns": ["Say hello"],
                "check_scope": "final_turn",
                "checks": [{"must_contain": ["hello", "hello"]}, {"any_of": ["world", "there"]}]
            }]
        }"#;
        let suite = load_str(raw, "ignored").expect("valid");
        assert_eq!(suite.name(), "smoke");
        assert_eq!(suite.version(), "1.0.0");
        let greet = suite.get("greet").expect("present");
        assert_eq!(greet.check_scope, CheckScope::FinalTurn);
        assert_eq!(greet.checks[0], Check::MustContain(vec!["hello".to_string()]));
    }

    #[test]
    fn unknown_check_kind_fails_load() {
        let list = r#"[{"id": "a", "turns": ["x"], "checks": [{"regex": "a+"}]}]"#;
        assert!(matches!(
            load_str(list, "s").unwrap_err(),
            ValidationError::InvalidCheck { .. }
        ));

        let map = r#"[{"id": "a", "turns": ["x"], "checks": {"regex": "a+"}}]"#;
        assert!(matches!(
            load_str(map, "s").unwrap_err(),
            ValidationError::InvalidCheck { .. }
        ));
    }

    #[test]
    fn empty_string_sets_fail_in_both_forms() {
        for checks in [
            r#"[{"must_contain": []}]"#,
            r#"{"must_contain": []}"#,
            r#"[{"any_of": []}]"#,
            r#"{"any_of": [], "equals": "x"}"#,
        ] {
            let raw = format!(r#"[{{"id": "a", "turns": ["x"], "checks": {}}}]"#, checks);
            assert!(
                matches!(
                    load_str(&raw, "s").unwrap_err(),
                    ValidationError::InvalidCheck { .. }
                ),
                "{}",
                checks
            );
        }
    }

    #[test]
    fn malformed_turn_fails_load() {
        let raw = r#"[{"id": "a", "turns": [42]}]"#;
        assert!(matches!(
            load_str(raw, "s").unwrap_err(),
            ValidationError::Malformed(_)
        ));
    }

    #[test]
    fn later_invalid_scenario_fails_whole_load() {
        let raw = r#"[
            {"id": "ok", "turns": ["x"]},
            {"id": "bad", "weight": -1, "turns": ["x"]}
        ]"#;
        assert!(matches!(
            load_str(raw, "s").unwrap_err(),
            ValidationError::InvalidWeight { .. }
        ));
    }

    #[test]
    fn non_suite_documents_rejected() {
        assert!(load_str("42", "s").is_err());
        assert!(load_str(r#"{"tasks": []}"#, "s").is_err());
        assert!(load_str("not json", "s").is_err());
    }

    #[test]
    fn load_from_path_uses_file_stem() {
        let mut file = tempfile::Builder::new()
            .prefix("nightly")
            .suffix(".json")
            .tempfile()
            .expect("tempfile");
        file.write_all(LEGACY.as_bytes()).expect("write");

        let suite = load(SuiteSource::Path(file.path())).expect("valid");
        assert!(suite.name().starts_with("nightly"));

        let missing = load(SuiteSource::Path(Path::new("/nonexistent/suite.json")));
        assert!(matches!(missing.unwrap_err(), ValidationError::Read { .. }));
    }
}
