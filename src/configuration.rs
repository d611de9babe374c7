//! Run configuration
//!
//! Values are layered: defaults, then command line flags, then the bootstrap file,
//! then `RULERUNNER_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::globals::GlobalStore;

pub const ENV_BASE_URL: &str = "RULERUNNER_BASE_URL";
pub const ENV_TIMEOUT: &str = "RULERUNNER_TIMEOUT";
pub const ENV_REPORT_DIR: &str = "RULERUNNER_REPORT_DIR";

/// Configuration management errors
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration format: {message}")]
    InvalidFormat { message: String },

    #[error("Configuration validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<String> },

    #[error("Invalid value \"{value}\" for {name}")]
    InvalidEnvironment { name: String, value: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Serial,
    Parallel,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub tests_dir: PathBuf,
    #[serde(default)]
    pub subdirs: Vec<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub report_dir: Option<PathBuf>,
    #[serde(default)]
    pub execution: ExecutionMode,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_true")]
    pub colors: bool,
    #[serde(default)]
    pub immediate: bool,
    #[serde(default)]
    pub show_globals: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tests_dir: PathBuf::from("."),
            subdirs: Vec::new(),
            base_url: None,
            timeout_secs: default_timeout_secs(),
            report_dir: None,
            execution: ExecutionMode::Serial,
            concurrency: default_concurrency(),
            verbose: false,
            debug: false,
            colors: true,
            immediate: false,
            show_globals: false,
        }
    }
}

impl RunnerConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Take base URL and timeout from the bootstrap file
    pub fn apply_bootstrap(&mut self, bootstrap: &Bootstrap) {
        if let Some(base_url) = &bootstrap.base_url {
            self.base_url = Some(base_url.clone());
        }
        if let Some(timeout) = bootstrap.timeout {
            self.timeout_secs = timeout;
        }
    }

    /// Apply `RULERUNNER_*` environment variables
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source.
    ///
    /// The report directory from the command line wins over the environment.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            self.base_url = Some(base_url);
        }

        if let Some(timeout) = lookup(ENV_TIMEOUT) {
            self.timeout_secs =
                timeout
                    .trim()
                    .parse()
                    .map_err(|_| ConfigurationError::InvalidEnvironment {
                        name: ENV_TIMEOUT.to_string(),
                        value: timeout.clone(),
                    })?;
        }

        if self.report_dir.is_none() {
            if let Some(report_dir) = lookup(ENV_REPORT_DIR) {
                self.report_dir = Some(PathBuf::from(report_dir));
            }
        }

        Ok(())
    }

    /// Validate configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.timeout_secs == 0 {
            errors.push("timeout must be greater than 0".to_string());
        }

        if self.concurrency == 0 {
            errors.push("concurrency must be greater than 0".to_string());
        }

        if let Some(base_url) = &self.base_url {
            if !base_url.contains("://") {
                errors.push(format!("base URL \"{}\" has no scheme", base_url));
            }
        }

        for pattern in &self.subdirs {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(format!("invalid subdir pattern \"{}\": {}", pattern, e));
            }
        }

        if !errors.is_empty() {
            return Err(ConfigurationError::ValidationFailed { errors }.into());
        }

        Ok(())
    }
}

/// Bootstrap file seeding the run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bootstrap {
    #[serde(default)]
    pub base_url: Option<String>,
    /// Default request timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub globals: Map<String, Value>,
}

impl Bootstrap {
    /// Load a YAML (`.yaml`, `.yml`) or JSON (`.json`) bootstrap file
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ConfigurationError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read bootstrap file: {:?}", path))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(ConfigurationError::InvalidFormat {
                message: format!("Unsupported bootstrap file format: {:?}", path),
            }
            .into()),
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).with_context(|| "Failed to parse YAML bootstrap file")
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).with_context(|| "Failed to parse JSON bootstrap file")
    }

    /// Write every bootstrap global into `store`
    pub fn seed(&self, store: &GlobalStore) -> Result<usize> {
        for (key, value) in &self.globals {
            store
                .set(key, value.clone())
                .with_context(|| format!("Cannot seed global \"{}\"", key))?;
        }

        log::debug!("Seeded {} globals from bootstrap", self.globals.len());
        Ok(self.globals.len())
    }
}
