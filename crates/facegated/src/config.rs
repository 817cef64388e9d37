use facegate_core::matcher::DEFAULT_ACCEPTANCE_THRESHOLD;
use facegate_core::pipeline::{data_dir, default_model_dir};
use facegate_core::{DetectionOptions, RetryPolicy, SessionRules};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_ENV: &str = "FACEGATE_CONFIG";
pub const DEFAULT_OP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: String, value: String },
    #[error("{0}")]
    Invalid(String),
}

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    #[default]
    Session,
    System,
}

impl FromStr for BusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(BusKind::Session),
            "system" => Ok(BusKind::System),
            other => Err(format!("unknown bus {other:?}")),
        }
    }
}

/// Raw TOML contents; every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub model_dir: Option<PathBuf>,
    pub store_path: Option<PathBuf>,
    pub acceptance_threshold: Option<f32>,
    pub retry_delay_ms: Option<u64>,
    pub relaxed_min_confidence: Option<f32>,
    pub relaxed_enlarge_factor: Option<f32>,
    pub op_timeout_secs: Option<u64>,
    pub bus: Option<BusKind>,
    pub single_identity: Option<bool>,
}

impl ConfigFile {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Overlay `FACEGATE_*` variables; they win over the file.
    fn overlay_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = env("FACEGATE_MODEL_DIR") {
            self.model_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env("FACEGATE_STORE_PATH") {
            self.store_path = Some(PathBuf::from(v));
        }
        overlay(env, "FACEGATE_ACCEPTANCE_THRESHOLD", &mut self.acceptance_threshold)?;
        overlay(env, "FACEGATE_RETRY_DELAY_MS", &mut self.retry_delay_ms)?;
        overlay(env, "FACEGATE_RELAXED_MIN_CONFIDENCE", &mut self.relaxed_min_confidence)?;
        overlay(env, "FACEGATE_RELAXED_ENLARGE_FACTOR", &mut self.relaxed_enlarge_factor)?;
        overlay(env, "FACEGATE_OP_TIMEOUT_SECS", &mut self.op_timeout_secs)?;
        overlay(env, "FACEGATE_BUS", &mut self.bus)?;
        overlay(env, "FACEGATE_SINGLE_IDENTITY", &mut self.single_identity)?;
        Ok(())
    }
}

/// Daemon configuration: defaults, then the TOML file, then the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// JSON file holding enrolled identities.
    pub store_path: PathBuf,
    pub acceptance_threshold: f32,
    /// Pause before the relaxed retry.
    pub retry_delay: Duration,
    /// Detection options of the second extraction attempt.
    pub relaxed: DetectionOptions,
    /// How long a D-Bus caller waits for the engine.
    pub op_timeout: Duration,
    pub bus: BusKind,
    pub single_identity: bool,
    /// The TOML file that was applied, if any.
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load from `FACEGATE_CONFIG` and `FACEGATE_*` in the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `env` to look up variables.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let source = env(CONFIG_ENV).map(PathBuf::from);
        let mut raw = match &source {
            Some(path) => ConfigFile::read(path)?,
            None => ConfigFile::default(),
        };
        raw.overlay_env(&env)?;
        let config = Self::from_raw(raw, source);
        config.validate()?;
        Ok(config)
    }

    pub fn from_raw(raw: ConfigFile, source: Option<PathBuf>) -> Self {
        let relaxed = DetectionOptions::RELAXED;
        Self {
            model_dir: raw.model_dir.unwrap_or_else(default_model_dir),
            store_path: raw
                .store_path
                .unwrap_or_else(|| data_dir().join("identities.json")),
            acceptance_threshold: raw.acceptance_threshold.unwrap_or(DEFAULT_ACCEPTANCE_THRESHOLD),
            retry_delay: Duration::from_millis(raw.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS)),
            relaxed: DetectionOptions {
                min_confidence: raw.relaxed_min_confidence.unwrap_or(relaxed.min_confidence),
                enlarge_factor: raw.relaxed_enlarge_factor.unwrap_or(relaxed.enlarge_factor),
            },
            op_timeout: Duration::from_secs(raw.op_timeout_secs.unwrap_or(DEFAULT_OP_TIMEOUT_SECS).max(1)),
            bus: raw.bus.unwrap_or_default(),
            single_identity: raw.single_identity.unwrap_or(true),
            source,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(ConfigError::Invalid(format!(
                "acceptance_threshold must be within [0, 1], got {}",
                self.acceptance_threshold
            )));
        }
        if !(self.relaxed.min_confidence > 0.0 && self.relaxed.min_confidence <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "relaxed_min_confidence must be within (0, 1], got {}",
                self.relaxed.min_confidence
            )));
        }
        if !(self.relaxed.enlarge_factor >= 0.0 && self.relaxed.enlarge_factor.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "relaxed_enlarge_factor must be a non-negative number, got {}",
                self.relaxed.enlarge_factor
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::two_attempt(self.relaxed, self.retry_delay)
    }

    pub fn session_rules(&self) -> SessionRules {
        SessionRules {
            acceptance_threshold: self.acceptance_threshold,
            single_identity: self.single_identity,
        }
    }
}

fn overlay<T: FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut Option<T>,
) -> Result<(), ConfigError> {
    if let Some(value) = env(key) {
        let parsed = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            key: key.to_string(),
            value: value.clone(),
        })?;
        *slot = Some(parsed);
    }
    Ok(())
}
