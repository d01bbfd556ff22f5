use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("data directory not found")]
    NoDataDir,
}

/// Thresholds and confidences for the insight rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InsightThresholds {
    /// Regularity strictly below this is reported as irregular.
    pub regularity_low: u8,
    /// Regularity strictly above this is reported as very regular.
    pub regularity_high: u8,
    pub symptom_severity: f64,
    pub perimenopause_score: u8,
    pub menopause_score: u8,
    pub energy_spread: f64,
    pub irregular_confidence: u8,
    pub regular_confidence: u8,
    pub symptom_confidence: u8,
    pub energy_confidence: u8,
}

impl Default for InsightThresholds {
    fn default() -> Self {
        Self {
            regularity_low: 60,
            regularity_high: 85,
            symptom_severity: 7.0,
            perimenopause_score: 40,
            menopause_score: 50,
            energy_spread: 3.0,
            irregular_confidence: 80,
            regular_confidence: 90,
            symptom_confidence: 75,
            energy_confidence: 70,
        }
    }
}

/// Argon2id cost parameters for the encrypted store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub analysis_window_days: u32,
    pub correlation_window_days: u32,
    pub min_correlation_samples: usize,
    pub cache_ttl_secs: u64,
    /// Per-service cache capacity, in users.
    pub cache_max_entries: usize,
    pub insights: InsightThresholds,
    pub kdf: KdfParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            analysis_window_days: 365,
            correlation_window_days: 180,
            min_correlation_samples: 10,
            cache_ttl_secs: 300,
            cache_max_entries: 1000,
            insights: InsightThresholds::default(),
            kdf: KdfParams::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis_window_days == 0 || self.correlation_window_days == 0 {
            return Err(ConfigError::Invalid("analysis windows must be at least one day".into()));
        }
        if self.min_correlation_samples < 2 {
            return Err(ConfigError::Invalid(
                "min_correlation_samples must be at least 2".into(),
            ));
        }
        if self.cache_max_entries == 0 {
            return Err(ConfigError::Invalid("cache_max_entries must be at least 1".into()));
        }
        let t = &self.insights;
        if t.regularity_low > 100 || t.regularity_high > 100 || t.regularity_low > t.regularity_high
        {
            return Err(ConfigError::Invalid(format!(
                "regularity thresholds out of range: low {} high {}",
                t.regularity_low, t.regularity_high
            )));
        }
        let confidences = [
            t.irregular_confidence,
            t.regular_confidence,
            t.symptom_confidence,
            t.energy_confidence,
        ];
        if confidences.iter().any(|c| *c > 100) {
            return Err(ConfigError::Invalid("confidence scores must be 0-100".into()));
        }
        // argon2 rejects memory below 8 KiB per lane
        if self.kdf.parallelism == 0
            || self.kdf.iterations == 0
            || self.kdf.memory_kib < 8 * self.kdf.parallelism
        {
            return Err(ConfigError::Invalid(format!("unusable kdf params: {:?}", self.kdf)));
        }
        Ok(())
    }
}

/// Default location of the encrypted data file.
pub fn default_data_file() -> Result<PathBuf, ConfigError> {
    let dir = dirs::data_local_dir()
        .ok_or(ConfigError::NoDataDir)?
        .join("cycle-insights");
    Ok(dir.join("data.vault"))
}
