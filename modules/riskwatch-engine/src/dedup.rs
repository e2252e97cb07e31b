//! Alert deduplication.
//!
//! An alert is identified by (document_id, summary). The check-then-insert here
//! is only a fast path; the store's uniqueness constraint is the real guard, and
//! a `Conflict` on insert is treated as "already there".

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use riskwatch_common::{
    Alert, AlertDetails, AlertStore, DocumentId, NewAlert, PatternId, RiskLevel, RiskPattern,
    StorageError,
};

/// A scored (document, pattern) match with its summary, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub document_id: DocumentId,
    pub pattern: RiskPattern,
    pub score: f64,
    pub level: RiskLevel,
    pub summary: String,
    pub details: AlertDetails,
}

/// What one `process` call persisted. When a storage error stops the run,
/// `created` still holds every alert inserted before it and `failure` carries
/// the error; the remaining candidates were not attempted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupOutcome {
    pub created: Vec<Alert>,
    pub duplicates: usize,
    pub failure: Option<StorageError>,
}

impl DedupOutcome {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

pub struct AlertDeduplicator {
    store: Arc<dyn AlertStore>,
}

impl AlertDeduplicator {
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        Self { store }
    }

    /// Persist every candidate not already stored. Scores are not filtered
    /// here; the caller decides what qualifies.
    pub async fn process(&self, candidates: Vec<AlertCandidate>) -> DedupOutcome {
        let mut outcome = DedupOutcome::default();
        if let Err(e) = self.persist(candidates, &mut outcome).await {
            outcome.failure = Some(e);
        }
        outcome
    }

    async fn persist(
        &self,
        candidates: Vec<AlertCandidate>,
        outcome: &mut DedupOutcome,
    ) -> Result<(), StorageError> {
        let mut seen: HashSet<(DocumentId, String)> = HashSet::new();

        for candidate in candidates {
            if !seen.insert((candidate.document_id, candidate.summary.clone())) {
                outcome.duplicates += 1;
                continue;
            }
            if self
                .store
                .exists(candidate.document_id, &candidate.summary)
                .await?
            {
                debug!(
                    document_id = %candidate.document_id,
                    pattern = candidate.pattern.name.as_str(),
                    "Alert already stored, skipping"
                );
                outcome.duplicates += 1;
                continue;
            }

            let pattern_id = self.find_or_register_pattern(&candidate.pattern).await?;
            let new_alert = NewAlert {
                document_id: candidate.document_id,
                pattern_id,
                pattern_name: candidate.pattern.name.clone(),
                score: candidate.score,
                level: candidate.level,
                sector: candidate.pattern.sector,
                summary: candidate.summary,
                details: candidate.details,
            };

            match self.store.insert(new_alert).await {
                Ok(alert) => {
                    info!(
                        alert_id = %alert.id,
                        document_id = %alert.document_id,
                        pattern = alert.pattern_name.as_str(),
                        level = %alert.level,
                        score = alert.score,
                        "Created alert"
                    );
                    outcome.created.push(alert);
                }
                Err(e) if e.is_conflict() => {
                    debug!(error = %e, "Concurrent insert won, counting as duplicate");
                    outcome.duplicates += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Look up the stored pattern id, registering the definition on first use.
    /// Losing a registration race falls back to the winner's id.
    pub async fn find_or_register_pattern(
        &self,
        pattern: &RiskPattern,
    ) -> Result<PatternId, StorageError> {
        if let Some(id) = self.store.find_pattern(&pattern.name).await? {
            return Ok(id);
        }
        match self.store.register_pattern(pattern).await {
            Ok(id) => {
                info!(pattern = pattern.name.as_str(), "Registered risk pattern");
                Ok(id)
            }
            Err(e) if e.is_conflict() => self
                .store
                .find_pattern(&pattern.name)
                .await?
                .ok_or_else(|| {
                    StorageError::NotFound(format!(
                        "pattern {} conflicted on register but is missing",
                        pattern.name
                    ))
                }),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAlertStore;
    use crate::testing::{sample_pattern, FlakyAlertStore, RacingPatternStore};
    use uuid::Uuid;

    fn candidate(document_id: DocumentId, pattern: &RiskPattern, summary: &str) -> AlertCandidate {
        AlertCandidate {
            document_id,
            pattern: pattern.clone(),
            score: 0.65,
            level: RiskLevel::High,
            summary: summary.into(),
            details: AlertDetails::default(),
        }
    }

    #[tokio::test]
    async fn second_run_creates_nothing() {
        let store = Arc::new(MemoryAlertStore::new());
        let dedup = AlertDeduplicator::new(store.clone());
        let pattern = sample_pattern("refinery_incident");
        let doc = Uuid::new_v4();

        let first = dedup
            .process(vec![candidate(doc, &pattern, "paro en refinería")])
            .await;
        assert!(first.is_complete());
        assert_eq!(first.created.len(), 1);
        assert_eq!(first.created[0].sector, pattern.sector);

        let second = dedup
            .process(vec![candidate(doc, &pattern, "paro en refinería")])
            .await;
        assert!(second.created.is_empty());
        assert_eq!(second.duplicates, 1);
        assert_eq!(store.all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_document_different_summary_is_a_new_alert() {
        let store = Arc::new(MemoryAlertStore::new());
        let dedup = AlertDeduplicator::new(store.clone());
        let pattern = sample_pattern("refinery_incident");
        let doc = Uuid::new_v4();

        let outcome = dedup
            .process(vec![
                candidate(doc, &pattern, "uno"),
                candidate(doc, &pattern, "dos"),
                candidate(doc, &pattern, "uno"),
            ])
            .await;
        assert_eq!(outcome.created.len(), 2);
        assert_eq!(outcome.duplicates, 1);
    }

    #[tokio::test]
    async fn pattern_is_registered_once_and_reused() {
        let store = Arc::new(MemoryAlertStore::new());
        let dedup = AlertDeduplicator::new(store.clone());
        let pattern = sample_pattern("refinery_incident");

        let a = dedup.find_or_register_pattern(&pattern).await.unwrap();
        let b = dedup.find_or_register_pattern(&pattern).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.registered_pattern("refinery_incident").unwrap(), Some(pattern));
    }

    #[tokio::test]
    async fn lost_registration_race_uses_winner_id() {
        let store = Arc::new(RacingPatternStore::new());
        let dedup = AlertDeduplicator::new(store.clone());
        let pattern = sample_pattern("refinery_incident");

        let id = dedup.find_or_register_pattern(&pattern).await.unwrap();
        assert_eq!(Some(id), store.inner.find_pattern(&pattern.name).await.unwrap());
    }

    #[tokio::test]
    async fn failure_midway_keeps_alerts_already_inserted() {
        let store = Arc::new(FlakyAlertStore::failing_on_insert(2));
        let dedup = AlertDeduplicator::new(store.clone());
        let pattern = sample_pattern("refinery_incident");
        let doc = Uuid::new_v4();

        let outcome = dedup
            .process(vec![
                candidate(doc, &pattern, "uno"),
                candidate(doc, &pattern, "dos"),
                candidate(doc, &pattern, "tres"),
            ])
            .await;
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.created[0].summary, "uno");
        assert!(matches!(outcome.failure, Some(StorageError::Backend(_))));
        assert_eq!(store.inner.all().unwrap().len(), 1);

        let retry = dedup
            .process(vec![
                candidate(doc, &pattern, "uno"),
                candidate(doc, &pattern, "dos"),
                candidate(doc, &pattern, "tres"),
            ])
            .await;
        assert!(retry.is_complete());
        assert_eq!(retry.created.len(), 2);
        assert_eq!(retry.duplicates, 1);
    }
}
