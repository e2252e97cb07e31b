//! In-memory implementations of the persistence seams.
//!
//! `MemoryAlertStore` enforces the same (document_id, summary) uniqueness
//! constraint a database would, so dedupe behavior is identical in tests and in
//! the file-driven worker.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use riskwatch_common::{
    Alert, AlertId, AlertQuery, AlertStore, BatchFilter, Document, DocumentId, DocumentStore,
    NewAlert, PatternId, RiskPattern, StorageError,
};

// ---------------------------------------------------------------------------
// MemoryAlertStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct AlertState {
    alerts: Vec<Alert>,
    keys: HashSet<(DocumentId, String)>,
    patterns: HashMap<String, (PatternId, RiskPattern)>,
}

#[derive(Default)]
pub struct MemoryAlertStore {
    state: Mutex<AlertState>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, AlertState>, StorageError> {
        self.state
            .lock()
            .map_err(|_| StorageError::Backend("alert store lock poisoned".into()))
    }

    /// Every stored alert in insertion order.
    pub fn all(&self) -> Result<Vec<Alert>, StorageError> {
        Ok(self.lock()?.alerts.clone())
    }

    pub fn registered_pattern(&self, name: &str) -> Result<Option<RiskPattern>, StorageError> {
        Ok(self.lock()?.patterns.get(name).map(|(_, p)| p.clone()))
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn exists(&self, document_id: DocumentId, summary: &str) -> Result<bool, StorageError> {
        Ok(self
            .lock()?
            .keys
            .contains(&(document_id, summary.to_string())))
    }

    async fn insert(&self, alert: NewAlert) -> Result<Alert, StorageError> {
        let mut state = self.lock()?;
        let key = (alert.document_id, alert.summary.clone());
        if state.keys.contains(&key) {
            return Err(StorageError::Conflict(format!(
                "alert for document {} with identical summary already exists",
                alert.document_id
            )));
        }
        let stored = Alert::from_new(alert, Utc::now());
        state.keys.insert(key);
        state.alerts.push(stored.clone());
        Ok(stored)
    }

    async fn find_pattern(&self, name: &str) -> Result<Option<PatternId>, StorageError> {
        Ok(self.lock()?.patterns.get(name).map(|(id, _)| *id))
    }

    async fn register_pattern(&self, pattern: &RiskPattern) -> Result<PatternId, StorageError> {
        let mut state = self.lock()?;
        if state.patterns.contains_key(&pattern.name) {
            return Err(StorageError::Conflict(format!(
                "pattern {} already registered",
                pattern.name
            )));
        }
        let id = Uuid::new_v4();
        state
            .patterns
            .insert(pattern.name.clone(), (id, pattern.clone()));
        Ok(id)
    }

    async fn mark_sent(&self, alert_id: AlertId) -> Result<bool, StorageError> {
        let mut state = self.lock()?;
        let alert = state
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or_else(|| StorageError::NotFound(format!("alert {alert_id}")))?;
        Ok(alert.mark_sent())
    }

    async fn query(&self, query: &AlertQuery) -> Result<Vec<Alert>, StorageError> {
        let state = self.lock()?;
        let mut results: Vec<Alert> = state
            .alerts
            .iter()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn alerts_for_document(
        &self,
        document_id: DocumentId,
    ) -> Result<Vec<Alert>, StorageError> {
        Ok(self
            .lock()?
            .alerts
            .iter()
            .filter(|a| a.document_id == document_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryDocumentStore
// ---------------------------------------------------------------------------

/// Documents kept in insertion order; batches come back in that order.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<Vec<Document>>,
    processed: RwLock<HashSet<DocumentId>>,
}

impl MemoryDocumentStore {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: RwLock::new(documents),
            processed: RwLock::new(HashSet::new()),
        }
    }

    pub fn insert(&self, document: Document) -> Result<(), StorageError> {
        let mut docs = self
            .documents
            .write()
            .map_err(|_| StorageError::Backend("document store lock poisoned".into()))?;
        match docs.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document,
            None => docs.push(document),
        }
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<Document>, StorageError> {
        self.documents
            .read()
            .map(|docs| docs.clone())
            .map_err(|_| StorageError::Backend("document store lock poisoned".into()))
    }

    pub fn is_processed(&self, id: DocumentId) -> bool {
        self.processed
            .read()
            .map(|p| p.contains(&id))
            .unwrap_or(false)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn fetch_batch(
        &self,
        filter: &BatchFilter,
        limit: usize,
    ) -> Result<Vec<Document>, StorageError> {
        let docs = self
            .documents
            .read()
            .map_err(|_| StorageError::Backend("document store lock poisoned".into()))?;
        let processed = self
            .processed
            .read()
            .map_err(|_| StorageError::Backend("document store lock poisoned".into()))?;

        Ok(docs
            .iter()
            .filter(|d| d.created_at >= filter.created_since)
            .filter(|d| !filter.require_content || !d.content.trim().is_empty())
            .filter(|d| !filter.unprocessed_only || !processed.contains(&d.id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_processed(&self, id: DocumentId) -> Result<(), StorageError> {
        self.processed
            .write()
            .map_err(|_| StorageError::Backend("document store lock poisoned".into()))?
            .insert(id);
        Ok(())
    }
}
