pub mod config;
pub mod error;
pub mod factor;
pub mod traits;
pub mod types;

pub use config::{
    load_config, BatchConfig, ClusteringConfig, Config, DistanceMetric, RiskThresholds,
    SimilarityConfig, TrendConfig, CONFIG_PATH_ENV,
};
pub use error::{ConfigError, EmbeddingError, IndexError, StorageError, SummaryError};
pub use factor::RiskFactor;
pub use traits::*;
pub use types::*;
