//! forge.toml の読み込み
//!
//! すべての項目に default があるので、空ファイルでも有効な設定になる。

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mailbox::{MailboxConfig, OverflowPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForgeConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub mailbox: MailboxConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Version reported by workers that don't set their own.
    #[serde(default = "default_version")]
    pub default_version: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_version: default_version(),
        }
    }
}

/// Stage thresholds. Scores are on a 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// How many times review may send one idea back into the pipeline.
    #[serde(default = "default_max_resurrections")]
    pub max_resurrections: u32,

    #[serde(default = "default_expand_urgency_threshold")]
    pub expand_urgency_threshold: u32,

    #[serde(default = "default_expand_novelty_threshold")]
    pub expand_novelty_threshold: u32,

    #[serde(default = "default_low_viability_threshold")]
    pub low_viability_threshold: u32,

    #[serde(default = "default_priority_review_threshold")]
    pub priority_review_threshold: u32,
}

const fn default_max_resurrections() -> u32 {
    1
}

const fn default_expand_urgency_threshold() -> u32 {
    60
}

const fn default_expand_novelty_threshold() -> u32 {
    70
}

const fn default_low_viability_threshold() -> u32 {
    60
}

const fn default_priority_review_threshold() -> u32 {
    80
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_resurrections: default_max_resurrections(),
            expand_urgency_threshold: default_expand_urgency_threshold(),
            expand_novelty_threshold: default_expand_novelty_threshold(),
            low_viability_threshold: default_low_viability_threshold(),
            priority_review_threshold: default_priority_review_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// EnvFilter directive used when RUST_LOG is unset.
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl ForgeConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ForgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mailbox.policy != OverflowPolicy::Unbounded && self.mailbox.capacity == 0 {
            return Err(ConfigError::Validation(format!(
                "mailbox.capacity must be at least 1 with policy {:?}",
                self.mailbox.policy
            )));
        }

        let p = &self.pipeline;
        for (name, value) in [
            ("expand_urgency_threshold", p.expand_urgency_threshold),
            ("expand_novelty_threshold", p.expand_novelty_threshold),
            ("low_viability_threshold", p.low_viability_threshold),
            ("priority_review_threshold", p.priority_review_threshold),
        ] {
            if value > 100 {
                return Err(ConfigError::Validation(format!(
                    "pipeline.{name} must be within 0..=100, got {value}"
                )));
            }
        }

        if self.runtime.default_version.trim().is_empty() {
            return Err(ConfigError::Validation(
                "runtime.default_version must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
