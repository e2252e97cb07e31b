pub mod catalog;
pub mod cluster;
pub mod dedup;
pub mod memory;
pub mod pipeline;
pub mod retrieval;
pub mod scorer;
pub mod similarity;
pub mod summary;
pub mod trend;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use catalog::{CatalogStore, FilePatternSource, PatternCatalog, PatternSource};
pub use cluster::TopicClusterer;
pub use dedup::{AlertCandidate, AlertDeduplicator, DedupOutcome};
pub use memory::{MemoryAlertStore, MemoryDocumentStore};
pub use pipeline::{BatchFailure, BatchSummary, PipelineDeps, ScoringPipeline};
pub use retrieval::{RelatedAlert, RetrievalService};
pub use scorer::{determine_level, score};
pub use similarity::{SearchFilters, SimilarityIndex};
pub use trend::{trending_topics, TrendRanker};
