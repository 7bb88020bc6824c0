//! Layered loading of project CI configuration.
//!
//! Layers, lowest priority first:
//!
//! 1. `<config_dir>/global.yml` (required)
//! 2. `<project_root>/.ci.yml`, shipped inside the project repository
//! 3. `<config_dir>/<project>.yml`, central per-project overrides
//! 4. an explicit override file, usually from the environment
//!
//! Mappings are merged recursively; any other value replaces what was
//! there before. The result is decoded once into [`ProjectConfiguration`].

use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

use cibuild_schema::ProjectConfiguration;

/// In-repository configuration file name.
pub const LOCAL_CONFIG_FILE: &str = ".ci.yml";

/// Errors that can occur while loading a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration layer could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Layer that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A layer is not valid YAML, or the merged result does not fit the schema.
    #[error("Invalid configuration in {path}: {source}")]
    Parse {
        /// Layer (or merged configuration) that failed.
        path: PathBuf,
        /// Underlying error.
        source: serde_yaml::Error,
    },

    /// The global configuration is missing.
    #[error("Global configuration not found at {0}")]
    MissingGlobal(PathBuf),

    /// An override file was configured but does not exist.
    #[error("Configuration override {0} is set but the file doesn't exist")]
    MissingOverride(PathBuf),
}

/// Loads [`ProjectConfiguration`]s from a configuration directory.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_dir: PathBuf,
    override_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a loader reading `global.yml` and per-project files from `config_dir`.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            override_path: None,
        }
    }

    /// Apply `path` as the last layer of every configuration.
    pub fn with_override(mut self, path: Option<PathBuf>) -> Self {
        self.override_path = path;
        self
    }

    /// Load the configuration of `project_name` checked out at `project_root`.
    ///
    /// # Errors
    ///
    /// Returns an error if a present layer cannot be read or parsed, if
    /// `global.yml` is missing, if a configured override does not exist, or
    /// if the merged document does not match the schema.
    pub fn load(
        &self,
        project_root: &Path,
        project_name: &str,
    ) -> Result<ProjectConfiguration, ConfigError> {
        let global = self.config_dir.join("global.yml");
        let mut merged = read_layer(&global)?.ok_or(ConfigError::MissingGlobal(global))?;

        let optional_layers = [
            project_root.join(LOCAL_CONFIG_FILE),
            self.config_dir.join(format!("{project_name}.yml")),
        ];
        for layer in &optional_layers {
            if let Some(value) = read_layer(layer)? {
                tracing::debug!("Applying configuration layer {}", layer.display());
                merge_values(&mut merged, value);
            }
        }

        if let Some(path) = &self.override_path {
            let value = read_layer(path)?.ok_or_else(|| ConfigError::MissingOverride(path.clone()))?;
            tracing::debug!("Applying configuration override {}", path.display());
            merge_values(&mut merged, value);
        }

        serde_yaml::from_value(merged).map_err(|source| ConfigError::Parse {
            path: project_root.to_path_buf(),
            source,
        })
    }
}

fn read_layer(path: &Path) -> Result<Option<Value>, ConfigError> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    // An empty file is an empty layer
    Ok(Some(if value.is_null() {
        Value::Mapping(Mapping::new())
    } else {
        value
    }))
}

/// Recursively merge `overlay` into `base`.
///
/// Nested mappings are merged key by key; every other value (including
/// sequences) replaces the existing one.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) if existing.is_mapping() && value.is_mapping() => {
                        merge_values(existing, value);
                    }
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
