use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;

use crate::error::ConfigError;

/// Env var the worker reads the TOML config path from.
pub const CONFIG_PATH_ENV: &str = "RISKWATCH_CONFIG";

/// TOML-backed engine configuration. Every section has defaults, so a missing
/// file or a partial file is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub patterns_path: PathBuf,
    pub thresholds: RiskThresholds,
    pub batch: BatchConfig,
    pub similarity: SimilarityConfig,
    pub clustering: ClusteringConfig,
    pub trends: TrendConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            patterns_path: PathBuf::from("config/risk_patterns.json"),
            thresholds: RiskThresholds::default(),
            batch: BatchConfig::default(),
            similarity: SimilarityConfig::default(),
            clustering: ClusteringConfig::default(),
            trends: TrendConfig::default(),
        }
    }
}

/// Score cutoffs for alert levels. Must be strictly ascending.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: 0.3,
            medium: 0.6,
            high: 0.8,
        }
    }
}

impl RiskThresholds {
    pub fn new(low: f64, medium: f64, high: f64) -> Result<Self, ConfigError> {
        let thresholds = Self { low, medium, high };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if !(in_range(self.low) && in_range(self.medium) && in_range(self.high)) {
            return Err(ConfigError::Invalid(format!(
                "thresholds must lie in [0, 1], got {}/{}/{}",
                self.low, self.medium, self.high
            )));
        }
        if !(self.low < self.medium && self.medium < self.high) {
            return Err(ConfigError::Invalid(format!(
                "thresholds must be strictly ascending (low < medium < high), got {}/{}/{}",
                self.low, self.medium, self.high
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Documents per scoring pass.
    pub size: usize,
    /// Only documents created within this many days are scored.
    pub lookback_days: i64,
    pub interval_minutes: u64,
    /// Concurrent summary-generation calls within one document.
    pub summary_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: 100,
            lookback_days: 1,
            interval_minutes: 30,
            summary_concurrency: 4,
        }
    }
}

impl BatchConfig {
    pub fn lookback(&self) -> Duration {
        Duration::days(self.lookback_days)
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_minutes * 60)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub metric: DistanceMetric,
    /// `related_to` keeps hits strictly closer than this distance.
    pub related_max_distance: f64,
    /// Expected embedding dimension. `None` adopts the first inserted vector's.
    pub dimension: Option<usize>,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Cosine,
            related_max_distance: 0.3,
            dimension: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Members must be strictly more similar than this to the seed.
    pub similarity_threshold: f64,
    pub search_limit: usize,
    pub pool_size: usize,
    pub pool_window_days: i64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            search_limit: 20,
            pool_size: 100,
            pool_window_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub window_days: i64,
    pub min_documents: usize,
    pub top_n: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            min_documents: 3,
            top_n: 10,
        }
    }
}

impl TrendConfig {
    pub fn window(&self) -> Duration {
        Duration::days(self.window_days)
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        if self.batch.size == 0 {
            return Err(ConfigError::Invalid("batch.size must be positive".into()));
        }
        if self.batch.summary_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "batch.summary_concurrency must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.clustering.similarity_threshold) {
            return Err(ConfigError::Invalid(
                "clustering.similarity_threshold must lie in [0, 1]".into(),
            ));
        }
        if self.similarity.related_max_distance <= 0.0 {
            return Err(ConfigError::Invalid(
                "similarity.related_max_distance must be positive".into(),
            ));
        }
        if self.trends.top_n == 0 {
            return Err(ConfigError::Invalid("trends.top_n must be positive".into()));
        }
        Ok(())
    }

    pub fn log(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  patterns_path: {}", self.patterns_path.display());
        tracing::info!(
            "  thresholds: low={} medium={} high={}",
            self.thresholds.low,
            self.thresholds.medium,
            self.thresholds.high
        );
        tracing::info!(
            "  batch: size={} lookback_days={}",
            self.batch.size,
            self.batch.lookback_days
        );
        tracing::info!("  similarity: metric={:?}", self.similarity.metric);
    }
}

/// Load and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    config.validate()?;
    config.log();
    Ok(config)
}
