// Collaborator seams for the engine.
//
// EmbeddingProvider and SummaryGenerator wrap slow network services; the engine
// treats their failures as "no vector" / "use the template summary".
// DocumentStore and AlertStore front the persistence layer. AlertStore owns the
// (document_id, summary) uniqueness constraint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{EmbeddingError, StorageError, SummaryError};
use crate::types::{
    Alert, AlertId, Document, DocumentId, NewAlert, PatternId, RiskLevel, RiskPattern, Sector,
};

// ---------------------------------------------------------------------------
// External model services
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    /// Human-readable description of why `document` matched `pattern`.
    async fn summarize(
        &self,
        document: &Document,
        pattern: &RiskPattern,
        score: f64,
    ) -> Result<String, SummaryError>;
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

/// Selects the window of documents a scoring pass works on.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFilter {
    /// Only documents created at or after this instant.
    pub created_since: DateTime<Utc>,
    /// Skip documents with empty content.
    pub require_content: bool,
    /// Skip documents already marked processed.
    pub unprocessed_only: bool,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch_batch(
        &self,
        filter: &BatchFilter,
        limit: usize,
    ) -> Result<Vec<Document>, StorageError>;

    async fn mark_processed(&self, id: DocumentId) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// AlertStore
// ---------------------------------------------------------------------------

/// Filter for alert lookups. Results are ordered by score descending, then
/// newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertQuery {
    pub sector: Option<Sector>,
    /// Empty means any level.
    pub levels: Vec<RiskLevel>,
    pub created_since: Option<DateTime<Utc>>,
    pub min_score: Option<f64>,
    pub unsent_only: bool,
    pub limit: Option<usize>,
}

impl AlertQuery {
    /// High and critical alerts, optionally scoped to a sector.
    pub fn high_risk(sector: Option<Sector>, since: DateTime<Utc>) -> Self {
        Self {
            sector,
            levels: vec![RiskLevel::High, RiskLevel::Critical],
            created_since: Some(since),
            ..Default::default()
        }
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        if self.sector.is_some_and(|s| s != alert.sector) {
            return false;
        }
        if !self.levels.is_empty() && !self.levels.contains(&alert.level) {
            return false;
        }
        if self.created_since.is_some_and(|since| alert.created_at < since) {
            return false;
        }
        if self.min_score.is_some_and(|min| alert.score < min) {
            return false;
        }
        if self.unsent_only && alert.sent {
            return false;
        }
        true
    }
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// True if an alert with this (document, summary) pair is already stored.
    async fn exists(&self, document_id: DocumentId, summary: &str) -> Result<bool, StorageError>;

    /// Persist a new alert. A duplicate (document, summary) pair fails with
    /// `StorageError::Conflict`.
    async fn insert(&self, alert: NewAlert) -> Result<Alert, StorageError>;

    async fn find_pattern(&self, name: &str) -> Result<Option<PatternId>, StorageError>;

    /// Register a pattern definition. A name that is already registered fails
    /// with `StorageError::Conflict`.
    async fn register_pattern(&self, pattern: &RiskPattern) -> Result<PatternId, StorageError>;

    /// Apply the one-way `unsent -> sent` transition. Returns false when the
    /// alert was already sent.
    async fn mark_sent(&self, alert_id: AlertId) -> Result<bool, StorageError>;

    async fn query(&self, query: &AlertQuery) -> Result<Vec<Alert>, StorageError>;

    async fn alerts_for_document(&self, document_id: DocumentId)
        -> Result<Vec<Alert>, StorageError>;

    /// High and critical alerts created since `since`, optionally in one sector.
    async fn high_risk_alerts(
        &self,
        sector: Option<Sector>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Alert>, StorageError> {
        self.query(&AlertQuery::high_risk(sector, since)).await
    }
}
