//! Batch scoring pass.
//!
//! One pass: fetch the recent unprocessed batch, take a single catalog
//! snapshot, score every (document, pattern) pair, summarize the qualifying
//! matches, dedupe and persist alerts, then mark each document processed.
//! A storage failure on one document is recorded and the pass moves on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};
use typed_builder::TypedBuilder;

use riskwatch_common::{
    AlertDetails, AlertStore, BatchConfig, BatchFilter, Document, DocumentId, DocumentStore,
    RiskThresholds, Sector, StorageError, SummaryGenerator,
};

use crate::catalog::{CatalogStore, PatternCatalog};
use crate::dedup::{AlertCandidate, AlertDeduplicator, DedupOutcome};
use crate::scorer::{determine_level, score};
use crate::similarity::SimilarityIndex;
use crate::summary::summarize_or_fallback;

/// Long-lived collaborators for the scoring pipeline.
#[derive(Clone, TypedBuilder)]
pub struct PipelineDeps {
    pub catalog: Arc<CatalogStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub alerts: Arc<dyn AlertStore>,
    #[builder(default)]
    pub summarizer: Option<Arc<dyn SummaryGenerator>>,
    /// When present, embedded documents and new alert sectors are pushed into it.
    #[builder(default)]
    pub index: Option<Arc<SimilarityIndex>>,
    #[builder(default)]
    pub thresholds: RiskThresholds,
    #[builder(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub document_id: DocumentId,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub documents_scanned: usize,
    /// (document, pattern) pairs at or above the low threshold.
    pub matches: usize,
    pub alerts_created: usize,
    pub duplicates_skipped: usize,
    pub failures: Vec<BatchFailure>,
}

pub struct ScoringPipeline {
    deps: PipelineDeps,
    deduplicator: AlertDeduplicator,
}

impl ScoringPipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        let deduplicator = AlertDeduplicator::new(deps.alerts.clone());
        Self { deps, deduplicator }
    }

    /// Score the current batch. Only a failure to fetch the batch aborts the
    /// pass; per-document failures land in `BatchSummary::failures`.
    pub async fn run_batch(&self, now: DateTime<Utc>) -> Result<BatchSummary, StorageError> {
        let filter = BatchFilter {
            created_since: now - self.deps.batch.lookback(),
            require_content: true,
            unprocessed_only: true,
        };
        let documents = self
            .deps
            .documents
            .fetch_batch(&filter, self.deps.batch.size)
            .await?;

        let summary = self.score_documents(&documents, now).await;

        for document in &documents {
            if summary.failures.iter().any(|f| f.document_id == document.id) {
                continue;
            }
            if let Err(e) = self.deps.documents.mark_processed(document.id).await {
                warn!(document_id = %document.id, error = %e, "Failed to mark document processed");
            }
        }

        Ok(summary)
    }

    /// Score and persist alerts for `documents` without touching processed
    /// state. Rerunning over the same documents creates no new alerts.
    pub async fn score_documents(&self, documents: &[Document], now: DateTime<Utc>) -> BatchSummary {
        let catalog = self.deps.catalog.snapshot();
        if catalog.is_empty() {
            warn!("Pattern catalog is empty, no document can match");
        }

        if let Some(index) = &self.deps.index {
            index.upsert_many(documents);
        }

        let mut summary = BatchSummary {
            documents_scanned: documents.len(),
            ..Default::default()
        };

        for document in documents {
            let candidates = self.candidates_for(document, &catalog, now).await;
            summary.matches += candidates.len();
            if candidates.is_empty() {
                continue;
            }

            let outcome = self.deduplicator.process(candidates).await;
            summary.alerts_created += outcome.created.len();
            summary.duplicates_skipped += outcome.duplicates;
            if let Some(index) = &self.deps.index {
                self.sync_alert_sectors(index, document.id, &outcome).await;
            }
            if let Some(e) = outcome.failure {
                error!(
                    document_id = %document.id,
                    error = %e,
                    persisted = outcome.created.len(),
                    "Failed to persist alerts"
                );
                summary.failures.push(BatchFailure {
                    document_id: document.id,
                    error: e.to_string(),
                });
            }
        }

        info!(
            documents = summary.documents_scanned,
            patterns = catalog.len(),
            matches = summary.matches,
            alerts_created = summary.alerts_created,
            duplicates = summary.duplicates_skipped,
            failures = summary.failures.len(),
            "Scoring batch complete"
        );
        summary
    }

    /// Push the sectors of this document's alerts into the index. Duplicates may
    /// come from an earlier pass that failed before recording them, so in that
    /// case the stored alerts are read back.
    async fn sync_alert_sectors(
        &self,
        index: &SimilarityIndex,
        document_id: DocumentId,
        outcome: &DedupOutcome,
    ) {
        let mut sectors: Vec<(DocumentId, Sector)> = outcome
            .created
            .iter()
            .map(|alert| (alert.document_id, alert.sector))
            .collect();
        if outcome.duplicates > 0 {
            match self.deps.alerts.alerts_for_document(document_id).await {
                Ok(stored) => sectors.extend(stored.iter().map(|a| (a.document_id, a.sector))),
                Err(e) => warn!(
                    document_id = %document_id,
                    error = %e,
                    "Failed to read stored alerts for index sync"
                ),
            }
        }
        index.record_alerts(sectors);
    }

    /// Every pattern scoring at or above the low threshold, summarized. Output
    /// order follows catalog order.
    async fn candidates_for(
        &self,
        document: &Document,
        catalog: &PatternCatalog,
        now: DateTime<Utc>,
    ) -> Vec<AlertCandidate> {
        let thresholds = &self.deps.thresholds;
        let scored: Vec<_> = catalog
            .iter()
            .map(|pattern| (pattern, score(document, pattern, now)))
            .filter(|(_, result)| result.score >= thresholds.low)
            .collect();
        if scored.is_empty() {
            return Vec::new();
        }

        let summarizer = self.deps.summarizer.as_deref();
        stream::iter(scored)
            .map(|(pattern, result)| async move {
                let summary = summarize_or_fallback(summarizer, document, pattern, result.score).await;
                AlertCandidate {
                    document_id: document.id,
                    pattern: pattern.clone(),
                    score: result.score,
                    level: determine_level(result.score, thresholds),
                    summary,
                    details: AlertDetails::from_evidence(document, pattern, &result),
                }
            })
            .buffered(self.deps.batch.summary_concurrency.max(1))
            .collect()
            .await
    }
}
