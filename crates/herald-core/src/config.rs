//! Herald configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HeraldError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl Default for HeraldConfig {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::default(),
            content: ContentConfig::default(),
            features: FeatureConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

/// Queue worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Max jobs processed concurrently by one worker process.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// How many times the queue redelivers a thrown job before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between redeliveries, in milliseconds.
    #[serde(default = "default_redelivery_delay_ms")]
    pub redelivery_delay_ms: u64,
}

fn default_concurrency() -> usize {
    4
}
fn default_max_attempts() -> u32 {
    3
}
fn default_redelivery_delay_ms() -> u64 {
    500
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            redelivery_delay_ms: default_redelivery_delay_ms(),
        }
    }
}

/// Message content storage policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// When false, message records are created without subject/body so no
    /// rendered content is retained at rest.
    #[serde(default = "default_true")]
    pub store_content: bool,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            store_content: default_true(),
        }
    }
}

/// Feature flag defaults, keyed-by-organization resolution happens behind
/// the `FeatureFlags` trait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Allow trigger overrides to change a message's severity.
    #[serde(default)]
    pub severity_override: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            severity_override: false,
        }
    }
}

/// Outbound provider call settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl HeraldConfig {
    /// Load config from the default path (~/.herald/config.toml). Missing
    /// file falls back to defaults.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HeraldError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| HeraldError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Default config path (~/.herald/config.toml).
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".herald").join("config.toml")
    }
}
