//! Plugin configuration loaded from an optional TOML file with environment
//! overrides layered on top.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use shared_logging::LogLevel;

/// Training hyperparameters and split policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fraction of usable rows held out for evaluation.
    pub test_size: f64,
    /// Seed for the shuffle that precedes the split.
    pub seed: u64,
    /// Minimum rows each side of the split must keep.
    pub min_rows_per_split: usize,
    /// Gradient descent step for linear models.
    pub learning_rate: f64,
    /// Gradient descent epochs for linear models.
    pub epochs: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: 0.25,
            seed: 42,
            min_rows_per_split: 2,
            learning_rate: 0.1,
            epochs: 500,
        }
    }
}

/// Tabular input settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Field delimiter for input files.
    pub delimiter: char,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

/// Logging and event journal settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// JSON-line log file; stderr when unset.
    pub log_path: Option<PathBuf>,
    /// Minimum level written (`debug`, `info`, `warn`, `error`).
    pub log_level: String,
    /// Lifecycle event journal; events stay in memory when unset.
    pub event_log: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            log_level: "info".into(),
            event_log: None,
        }
    }
}

impl TelemetryConfig {
    /// Parsed minimum log level.
    pub fn level(&self) -> Result<LogLevel> {
        self.log_level.parse()
    }
}

/// Complete plugin configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Training section.
    pub training: TrainingConfig,
    /// Input data section.
    pub data: DataConfig,
    /// Telemetry section.
    pub telemetry: TelemetryConfig,
}

impl PluginConfig {
    /// Loads a TOML file, applies environment overrides and validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading plugin config {}", path.display()))?;
        let mut config: Self =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise falls back to [`Self::from_env`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::from_env(),
        }
    }

    /// Applies `MLP_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup("MLP_TEST_SIZE") {
            self.training.test_size = raw
                .trim()
                .parse()
                .with_context(|| format!("MLP_TEST_SIZE=`{raw}` is not a number"))?;
        }
        if let Some(raw) = lookup("MLP_SEED") {
            self.training.seed = raw
                .trim()
                .parse()
                .with_context(|| format!("MLP_SEED=`{raw}` is not an unsigned integer"))?;
        }
        if let Some(raw) = lookup("MLP_LOG_LEVEL") {
            self.telemetry.log_level = raw;
        }
        if let Some(raw) = lookup("MLP_LOG_PATH") {
            self.telemetry.log_path = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("MLP_EVENT_LOG") {
            self.telemetry.event_log = Some(PathBuf::from(raw));
        }
        Ok(())
    }

    /// Rejects settings the trainer and loader cannot honour.
    pub fn validate(&self) -> Result<()> {
        let training = &self.training;
        if !(training.test_size > 0.0 && training.test_size < 1.0) {
            bail!(
                "training.test_size must be in (0, 1), got {}",
                training.test_size
            );
        }
        if training.min_rows_per_split == 0 {
            bail!("training.min_rows_per_split must be at least 1");
        }
        if training.epochs == 0 {
            bail!("training.epochs must be at least 1");
        }
        if !(training.learning_rate.is_finite() && training.learning_rate > 0.0) {
            bail!(
                "training.learning_rate must be positive, got {}",
                training.learning_rate
            );
        }
        if !self.data.delimiter.is_ascii() {
            bail!("data.delimiter must be a single ASCII character");
        }
        self.telemetry.level()?;
        Ok(())
    }

    /// Delimiter as the byte the CSV reader expects.
    #[must_use]
    pub fn delimiter_byte(&self) -> u8 {
        u8::try_from(self.data.delimiter).unwrap_or(b',')
    }
}
