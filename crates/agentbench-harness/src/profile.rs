//! Isolated agent profile.
//!
//! The profile root holds the agent's `config.toml` and a `workspace/`
//! directory. A pristine copy of the seeded config is kept as
//! `config.base.toml`; every loop rebuilds `config.toml` from it plus the
//! snapshot's `profile.*` overrides, so reverted overrides disappear.

use std::path::{Path, PathBuf};

use agentbench_core::{TunableValue, Tunables};
use tracing::debug;

const CONFIG_FILE: &str = "config.toml";
const BASE_FILE: &str = "config.base.toml";
const WORKSPACE_DIR: &str = "workspace";

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("source profile has no config: {0}")]
    MissingSource(String),

    #[error("profile io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("profile config is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render profile config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("override {path} conflicts with non-table key {key}")]
    NotATable { path: String, key: String },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ProfileError + '_ {
    move |source| ProfileError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// A prepared profile directory.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    root: PathBuf,
}

impl AgentProfile {
    /// Ensure `<root>/workspace` exists and `<root>/config.toml` is seeded.
    ///
    /// Without a source profile an empty config is created.
    pub fn prepare(root: &Path, source_profile: Option<&Path>) -> Result<Self, ProfileError> {
        let workspace = root.join(WORKSPACE_DIR);
        std::fs::create_dir_all(&workspace).map_err(io_err(&workspace))?;

        let config = root.join(CONFIG_FILE);
        if !config.exists() {
            match source_profile {
                Some(source) => {
                    let source_config = source.join(CONFIG_FILE);
                    if !source_config.exists() {
                        return Err(ProfileError::MissingSource(
                            source_config.display().to_string(),
                        ));
                    }
                    std::fs::copy(&source_config, &config).map_err(io_err(&config))?;
                    debug!(from = %source_config.display(), "seeded profile config");
                }
                None => std::fs::write(&config, "").map_err(io_err(&config))?,
            }
        }

        let base = root.join(BASE_FILE);
        if !base.exists() {
            std::fs::copy(&config, &base).map_err(io_err(&base))?;
        }

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workspace(&self) -> PathBuf {
        self.root.join(WORKSPACE_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Rewrite `config.toml` as base config plus the snapshot's overrides.
    pub fn apply(&self, tunables: &Tunables) -> Result<(), ProfileError> {
        let base_path = self.root.join(BASE_FILE);
        let raw = std::fs::read_to_string(&base_path).map_err(io_err(&base_path))?;
        let mut table: toml::Table = raw.parse()?;
        for (path, value) in tunables.profile_overrides() {
            set_override(&mut table, path, value)?;
        }
        let rendered = toml::to_string(&table)?;
        let config = self.config_path();
        std::fs::write(&config, rendered).map_err(io_err(&config))?;
        Ok(())
    }
}

/// Set a dotted-path override. Lists are merged with existing string arrays.
fn set_override(
    table: &mut toml::Table,
    path: &str,
    value: &TunableValue,
) -> Result<(), ProfileError> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return Ok(());
    };

    let mut current = table;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        current = match entry {
            toml::Value::Table(t) => t,
            _ => {
                return Err(ProfileError::NotATable {
                    path: path.to_string(),
                    key: segment.to_string(),
                })
            }
        };
    }

    let new_value = match value {
        TunableValue::Bool(b) => toml::Value::Boolean(*b),
        TunableValue::Int(i) => toml::Value::Integer(*i),
        TunableValue::Text(s) => toml::Value::String(s.clone()),
        TunableValue::List(items) => {
            let mut merged: Vec<toml::Value> = match current.get(leaf) {
                Some(toml::Value::Array(existing)) => existing.clone(),
                _ => Vec::new(),
            };
            for item in items {
                let item = toml::Value::String(item.clone());
                if !merged.contains(&item) {
                    merged.push(item);
                }
            }
            toml::Value::Array(merged)
        }
    };
    current.insert(leaf.to_string(), new_value);
    Ok(())
}
