// Test doubles for the engine's collaborator seams.
//
// - FixedEmbedder / FailingEmbedder (EmbeddingProvider): deterministic hash-based vectors
// - StaticSummarizer / FailingSummarizer (SummaryGenerator)
// - RacingPatternStore / FlakyAlertStore (AlertStore): wrap MemoryAlertStore to
//   inject a lost registration race or backend failures
//
// Plus builders for documents and patterns.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use riskwatch_common::{
    Alert, AlertId, AlertQuery, AlertStore, Document, DocumentId, EmbeddingError,
    EmbeddingProvider, NewAlert, PatternId, RiskFactor, RiskLevel, RiskPattern, Sector, Source,
    SourceType, StorageError, SummaryError, SummaryGenerator,
};

use crate::memory::MemoryAlertStore;

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Energy-sector refinery pattern with four keywords, one trigger and an
/// explosion factor.
pub fn sample_pattern(name: &str) -> RiskPattern {
    RiskPattern {
        name: name.to_string(),
        sector: Sector::Energy,
        pattern_type: "operational".into(),
        risk_level: RiskLevel::High,
        description: "Incidentes operativos en refinerías".into(),
        keywords: vec![
            "refinería".into(),
            "pemex".into(),
            "tula".into(),
            "combustible".into(),
        ],
        triggers: vec!["paro técnico".into()],
        risk_factors: vec![(RiskFactor::Explosion, 2.0)],
    }
}

/// RSS document published and created at `now`, no embedding.
pub fn sample_document(title: &str, now: DateTime<Utc>) -> Document {
    Document {
        id: Uuid::new_v4(),
        title: title.to_string(),
        content: "Reporte de actividad en la región".into(),
        published_at: Some(now),
        created_at: now,
        source: Some(Source {
            name: "El Diario".into(),
            source_type: SourceType::Rss,
            state: Some("Hidalgo".into()),
            city: Some("Tula".into()),
        }),
        embedding: None,
    }
}

pub fn embedded_document(title: &str, embedding: Vec<f32>, now: DateTime<Utc>) -> Document {
    Document {
        embedding: Some(embedding),
        ..sample_document(title, now)
    }
}

// ---------------------------------------------------------------------------
// Embedders
// ---------------------------------------------------------------------------

/// Registered texts get exact vectors; anything else gets a unit vector derived
/// from a hash of the text.
pub struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    dimension: usize,
}

impl FixedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            dimension,
        }
    }

    pub fn on_text(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    fn hash_vector(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        text.hash(&mut hasher);
        let mut state = hasher.finish();

        let mut vec = vec![0.0f32; self.dimension];
        for v in vec.iter_mut() {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            *v = ((state >> 32) as u32 as f32 / u32::MAX as f32) * 2.0 - 1.0;
        }
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.hash_vector(text)))
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Unavailable("embedding service offline".into()))
    }
}

// ---------------------------------------------------------------------------
// Summarizers
// ---------------------------------------------------------------------------

/// Returns the same text for every call.
pub struct StaticSummarizer(pub String);

#[async_trait]
impl SummaryGenerator for StaticSummarizer {
    async fn summarize(
        &self,
        _document: &Document,
        _pattern: &RiskPattern,
        _score: f64,
    ) -> Result<String, SummaryError> {
        Ok(self.0.clone())
    }
}

pub struct FailingSummarizer;

#[async_trait]
impl SummaryGenerator for FailingSummarizer {
    async fn summarize(
        &self,
        _document: &Document,
        _pattern: &RiskPattern,
        _score: f64,
    ) -> Result<String, SummaryError> {
        Err(SummaryError::Provider("rate limited".into()))
    }
}

// ---------------------------------------------------------------------------
// Alert stores
// ---------------------------------------------------------------------------

/// Simulates losing a pattern registration race: the first lookup misses, and
/// registration stores the pattern (as the "other" writer) but reports Conflict.
pub struct RacingPatternStore {
    pub inner: MemoryAlertStore,
    missed_once: AtomicBool,
}

impl RacingPatternStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryAlertStore::new(),
            missed_once: AtomicBool::new(false),
        }
    }
}

impl Default for RacingPatternStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertStore for RacingPatternStore {
    async fn exists(&self, document_id: DocumentId, summary: &str) -> Result<bool, StorageError> {
        self.inner.exists(document_id, summary).await
    }

    async fn insert(&self, alert: NewAlert) -> Result<Alert, StorageError> {
        self.inner.insert(alert).await
    }

    async fn find_pattern(&self, name: &str) -> Result<Option<PatternId>, StorageError> {
        if !self.missed_once.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.find_pattern(name).await
    }

    async fn register_pattern(&self, pattern: &RiskPattern) -> Result<PatternId, StorageError> {
        self.inner.register_pattern(pattern).await?;
        Err(StorageError::Conflict(format!(
            "pattern {} registered concurrently",
            pattern.name
        )))
    }

    async fn mark_sent(&self, alert_id: AlertId) -> Result<bool, StorageError> {
        self.inner.mark_sent(alert_id).await
    }

    async fn query(&self, query: &AlertQuery) -> Result<Vec<Alert>, StorageError> {
        self.inner.query(query).await
    }

    async fn alerts_for_document(
        &self,
        document_id: DocumentId,
    ) -> Result<Vec<Alert>, StorageError> {
        self.inner.alerts_for_document(document_id).await
    }
}

/// Inserts fail with a backend error for the listed documents, or once on the
/// n-th insert call.
pub struct FlakyAlertStore {
    pub inner: MemoryAlertStore,
    failing_documents: HashSet<DocumentId>,
    fail_on_insert: Option<usize>,
    inserts: AtomicUsize,
}

impl FlakyAlertStore {
    pub fn failing_for(documents: impl IntoIterator<Item = DocumentId>) -> Self {
        Self {
            inner: MemoryAlertStore::new(),
            failing_documents: documents.into_iter().collect(),
            fail_on_insert: None,
            inserts: AtomicUsize::new(0),
        }
    }

    /// Only the `n`-th insert (1-based) fails; every other call succeeds.
    pub fn failing_on_insert(n: usize) -> Self {
        Self {
            fail_on_insert: Some(n),
            ..Self::failing_for([])
        }
    }
}

#[async_trait]
impl AlertStore for FlakyAlertStore {
    async fn exists(&self, document_id: DocumentId, summary: &str) -> Result<bool, StorageError> {
        self.inner.exists(document_id, summary).await
    }

    async fn insert(&self, alert: NewAlert) -> Result<Alert, StorageError> {
        let call = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_documents.contains(&alert.document_id) || self.fail_on_insert == Some(call) {
            return Err(StorageError::Backend("connection reset".into()));
        }
        self.inner.insert(alert).await
    }

    async fn find_pattern(&self, name: &str) -> Result<Option<PatternId>, StorageError> {
        self.inner.find_pattern(name).await
    }

    async fn register_pattern(&self, pattern: &RiskPattern) -> Result<PatternId, StorageError> {
        self.inner.register_pattern(pattern).await
    }

    async fn mark_sent(&self, alert_id: AlertId) -> Result<bool, StorageError> {
        self.inner.mark_sent(alert_id).await
    }

    async fn query(&self, query: &AlertQuery) -> Result<Vec<Alert>, StorageError> {
        self.inner.query(query).await
    }

    async fn alerts_for_document(
        &self,
        document_id: DocumentId,
    ) -> Result<Vec<Alert>, StorageError> {
        self.inner.alerts_for_document(document_id).await
    }
}
