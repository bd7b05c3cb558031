//! Runtime settings.
//!
//! Layered, lowest precedence first: built-in defaults, an optional TOML
//! file, `WX_PIPELINE_*` environment variables, then CLI overrides.

use crate::error::{PipelineError, Result};
use crate::utils::constants::*;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Settings {
    /// Root directory for every persisted dataset
    #[validate(length(min = 1))]
    pub base_path: String,

    #[validate(url)]
    pub source_url: String,

    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    pub user_agent: String,

    /// Trailing aggregation window, at most `MAX_WINDOW_MINUTES`
    #[validate(range(min = 1, max = 5_256_000))]
    pub window_minutes: u64,

    /// Defaults to `{base_path}/current/raw_data_merge.csv`
    pub aux_path: Option<String>,

    #[validate(custom(function = "validate_encoding"))]
    pub aux_encoding: String,

    #[validate(length(min = 1))]
    pub aux_state_column: String,

    #[validate(length(min = 1))]
    pub aux_municipality_column: String,

    #[validate(custom(function = "validate_compression"))]
    pub compression: String,

    pub max_retries: u32,

    pub retry_delay_secs: u64,
}

impl Settings {
    /// Load settings, reading `config_file` if given or `wx-pipeline.toml`
    /// from the working directory if it exists.
    pub fn load(config_file: Option<&Path>, overrides: &[(&str, String)]) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("base_path", DEFAULT_BASE_PATH)?
            .set_default("source_url", DEFAULT_SOURCE_URL)?
            .set_default("request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS as i64)?
            .set_default("user_agent", DEFAULT_USER_AGENT)?
            .set_default("window_minutes", DEFAULT_WINDOW_MINUTES as i64)?
            .set_default("aux_encoding", DEFAULT_AUX_ENCODING)?
            .set_default("aux_state_column", DEFAULT_AUX_STATE_COLUMN)?
            .set_default("aux_municipality_column", DEFAULT_AUX_MUNICIPALITY_COLUMN)?
            .set_default("compression", COMPRESSION_SNAPPY)?
            .set_default("max_retries", DEFAULT_MAX_RETRIES as i64)?
            .set_default("retry_delay_secs", DEFAULT_RETRY_DELAY_SECS as i64)?;

        builder = match config_file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        for (key, value) in overrides {
            builder = builder.set_override(*key, value.as_str())?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn base_path(&self) -> PathBuf {
        PathBuf::from(&self.base_path)
    }

    pub fn aux_path(&self) -> PathBuf {
        match &self.aux_path {
            Some(path) => PathBuf::from(path),
            None => self.base_path().join(DEFAULT_AUX_FILE),
        }
    }

    pub fn window(&self) -> Result<chrono::Duration> {
        i64::try_from(self.window_minutes)
            .ok()
            .filter(|minutes| *minutes as u64 <= MAX_WINDOW_MINUTES)
            .and_then(chrono::Duration::try_minutes)
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "window_minutes must be between 1 and {}, got {}",
                    MAX_WINDOW_MINUTES, self.window_minutes
                ))
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            source_url: DEFAULT_SOURCE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            window_minutes: DEFAULT_WINDOW_MINUTES,
            aux_path: None,
            aux_encoding: DEFAULT_AUX_ENCODING.to_string(),
            aux_state_column: DEFAULT_AUX_STATE_COLUMN.to_string(),
            aux_municipality_column: DEFAULT_AUX_MUNICIPALITY_COLUMN.to_string(),
            compression: COMPRESSION_SNAPPY.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

fn validate_encoding(label: &str) -> std::result::Result<(), ValidationError> {
    match encoding_rs::Encoding::for_label(label.as_bytes()) {
        Some(_) => Ok(()),
        None => Err(ValidationError::new("unknown_encoding")),
    }
}

fn validate_compression(name: &str) -> std::result::Result<(), ValidationError> {
    let known = [
        COMPRESSION_SNAPPY,
        COMPRESSION_GZIP,
        COMPRESSION_LZ4,
        COMPRESSION_ZSTD,
        COMPRESSION_NONE,
    ];
    if known.contains(&name.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(ValidationError::new("unsupported_compression"))
    }
}
