//! In-memory nearest-neighbor index over document embeddings.
//!
//! Readers work on an immutable snapshot loaded from an `ArcSwap`; writers copy
//! the snapshot, modify the copy, and swap it in. A search that is running while
//! the scoring batch adds embeddings never blocks and never sees a half-applied
//! write. Entries are shared between snapshots, so a copy clones pointers and
//! never embeddings.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use riskwatch_common::{
    Document, DocumentId, DistanceMetric, IndexError, Sector, SimilarityConfig, SimilarityHit,
};

/// Optional narrowing applied before ranking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    /// Only documents with at least one alert in this sector.
    pub sector: Option<Sector>,
    /// Only documents published at or after this instant. Documents without a
    /// publication time are excluded when set.
    pub published_since: Option<DateTime<Utc>>,
    /// Only documents with at least one alert of any sector.
    pub with_alerts_only: bool,
    pub exclude: Option<DocumentId>,
}

impl SearchFilters {
    pub fn sector(sector: Sector) -> Self {
        Self {
            sector: Some(sector),
            ..Default::default()
        }
    }

    pub fn published_since(since: DateTime<Utc>) -> Self {
        Self {
            published_since: Some(since),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub id: DocumentId,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub embedding: Vec<f32>,
}

impl IndexedDocument {
    fn from_document(document: &Document, embedding: &[f32]) -> Arc<Self> {
        Arc::new(Self {
            id: document.id,
            title: document.title.clone(),
            published_at: document.published_at,
            embedding: embedding.to_vec(),
        })
    }
}

/// One consistent view of the index.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    entries: Vec<Arc<IndexedDocument>>,
    by_id: HashMap<DocumentId, usize>,
    alert_sectors: HashMap<DocumentId, HashSet<Sector>>,
    dimension: Option<usize>,
}

impl IndexSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: DocumentId) -> Option<&IndexedDocument> {
        self.by_id.get(&id).map(|&i| self.entries[i].as_ref())
    }

    pub fn has_alerts(&self, id: DocumentId) -> bool {
        self.alert_sectors.get(&id).is_some_and(|s| !s.is_empty())
    }

    fn put(&mut self, entry: Arc<IndexedDocument>) {
        match self.by_id.get(&entry.id) {
            Some(&i) => self.entries[i] = entry,
            None => {
                self.by_id.insert(entry.id, self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    fn passes(&self, entry: &IndexedDocument, filters: &SearchFilters) -> bool {
        if filters.exclude == Some(entry.id) {
            return false;
        }
        if let Some(sector) = filters.sector {
            if !self
                .alert_sectors
                .get(&entry.id)
                .is_some_and(|s| s.contains(&sector))
            {
                return false;
            }
        }
        if filters.with_alerts_only && !self.has_alerts(entry.id) {
            return false;
        }
        if let Some(since) = filters.published_since {
            if !entry.published_at.is_some_and(|p| p >= since) {
                return false;
            }
        }
        true
    }

    /// Rank filtered entries by ascending distance. Ties keep insertion order.
    pub fn search(
        &self,
        metric: DistanceMetric,
        query: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SimilarityHit>, IndexError> {
        if self.entries.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dimension {
            if query.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    got: query.len(),
                });
            }
        }

        let mut scored: Vec<(f64, &IndexedDocument)> = self
            .entries
            .iter()
            .map(|e| &**e)
            .filter(|e| self.passes(e, filters))
            .map(|e| (distance(metric, query, &e.embedding), e))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(d, e)| SimilarityHit::new(e.id, e.title.clone(), e.published_at, d))
            .collect())
    }
}

pub struct SimilarityIndex {
    inner: ArcSwap<IndexSnapshot>,
    metric: DistanceMetric,
    related_max_distance: f64,
    // Serializes writers; readers never take it.
    write_lock: Mutex<()>,
}

impl SimilarityIndex {
    pub fn new(config: &SimilarityConfig) -> Self {
        Self {
            inner: ArcSwap::new(Arc::new(IndexSnapshot {
                dimension: config.dimension,
                ..Default::default()
            })),
            metric: config.metric,
            related_max_distance: config.related_max_distance,
            write_lock: Mutex::new(()),
        }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.inner.load_full()
    }

    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }

    fn write<R>(&self, f: impl FnOnce(&mut IndexSnapshot) -> R) -> R {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = IndexSnapshot::clone(&self.inner.load());
        let result = f(&mut next);
        self.inner.store(Arc::new(next));
        result
    }

    /// Add or replace a document's vector. Returns false (and changes nothing)
    /// when the document has no embedding yet.
    pub fn upsert(&self, document: &Document) -> Result<bool, IndexError> {
        let Some(embedding) = document.embedding.as_ref().filter(|e| !e.is_empty()) else {
            return Ok(false);
        };

        self.write(|snap| {
            let expected = snap.dimension.unwrap_or(embedding.len());
            if embedding.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    got: embedding.len(),
                });
            }
            snap.dimension = Some(expected);
            snap.put(IndexedDocument::from_document(document, embedding));
            Ok(true)
        })
    }

    /// Index every embedded document in one swap. Rejected vectors are logged
    /// and skipped. Returns how many were indexed.
    pub fn upsert_many(&self, documents: &[Document]) -> usize {
        self.write(|snap| {
            let mut indexed = 0;
            for document in documents {
                let Some(embedding) = document.embedding.as_ref().filter(|e| !e.is_empty())
                else {
                    continue;
                };
                let expected = snap.dimension.unwrap_or(embedding.len());
                if embedding.len() != expected {
                    warn!(
                        document_id = %document.id,
                        expected,
                        got = embedding.len(),
                        "Skipping embedding with wrong dimension"
                    );
                    continue;
                }
                snap.dimension = Some(expected);
                snap.put(IndexedDocument::from_document(document, embedding));
                indexed += 1;
            }
            debug!(indexed, total = snap.entries.len(), "Indexed document embeddings");
            indexed
        })
    }

    /// Note that each document has an alert in the paired sector, in one swap.
    /// Feeds the sector filter and the related-alerts lookup. Nothing is written
    /// when every pair is already known.
    pub fn record_alerts(&self, alerts: impl IntoIterator<Item = (DocumentId, Sector)>) {
        let current = self.inner.load();
        let fresh: Vec<(DocumentId, Sector)> = alerts
            .into_iter()
            .filter(|(id, sector)| {
                !current
                    .alert_sectors
                    .get(id)
                    .is_some_and(|s| s.contains(sector))
            })
            .collect();
        if fresh.is_empty() {
            return;
        }
        self.write(|snap| {
            for (document_id, sector) in fresh {
                snap.alert_sectors
                    .entry(document_id)
                    .or_default()
                    .insert(sector);
            }
        });
    }

    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SimilarityHit>, IndexError> {
        self.inner.load().search(self.metric, query, limit, filters)
    }

    /// Documents closest to `document_id` that carry at least one alert,
    /// excluding the document itself and anything at or beyond the related
    /// distance cutoff. Unknown or unembedded documents yield nothing.
    pub fn related_to(&self, document_id: DocumentId, limit: usize) -> Vec<SimilarityHit> {
        let snap = self.inner.load();
        let Some(source) = snap.get(document_id) else {
            return Vec::new();
        };
        let filters = SearchFilters {
            with_alerts_only: true,
            exclude: Some(document_id),
            ..Default::default()
        };
        match snap.search(self.metric, &source.embedding, snap.len(), &filters) {
            Ok(hits) => hits
                .into_iter()
                .filter(|h| h.distance < self.related_max_distance)
                .take(limit)
                .collect(),
            Err(e) => {
                warn!(error = %e, document_id = %document_id, "Related lookup failed");
                Vec::new()
            }
        }
    }

    /// Embedded documents published at or after `since` (all when `None`), in
    /// insertion order, capped at `limit`.
    pub fn recent_documents(&self, since: Option<DateTime<Utc>>, limit: usize) -> Vec<DocumentId> {
        self.inner
            .load()
            .entries
            .iter()
            .filter(|e| match since {
                Some(since) => e.published_at.is_some_and(|p| p >= since),
                None => true,
            })
            .take(limit)
            .map(|e| e.id)
            .collect()
    }
}

pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f64 {
    match metric {
        DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
        DistanceMetric::L2 => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| {
                let d = f64::from(*x) - f64::from(*y);
                d * d
            })
            .sum::<f64>()
            .sqrt(),
    }
}

/// Zero-norm vectors have similarity 0 with everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::embedded_document;
    use chrono::Duration;

    fn index() -> SimilarityIndex {
        SimilarityIndex::new(&SimilarityConfig::default())
    }

    #[test]
    fn cosine_identical_orthogonal_and_zero() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn l2_distance_is_euclidean() {
        let d = distance(DistanceMetric::L2, &[0.0, 0.0], &[3.0, 4.0]);
        assert!((d - 5.0).abs() < 1e-9);
    }

    #[test]
    fn empty_index_returns_empty() {
        let hits = index().search(&[1.0, 0.0], 10, &SearchFilters::default()).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn results_are_sorted_and_limited() {
        let now = Utc::now();
        let idx = index();
        let far = embedded_document("far", vec![0.0, 1.0], now);
        let near = embedded_document("near", vec![1.0, 0.1], now);
        let exact = embedded_document("exact", vec![1.0, 0.0], now);
        for d in [&far, &near, &exact] {
            assert!(idx.upsert(d).unwrap());
        }

        let hits = idx.search(&[1.0, 0.0], 2, &SearchFilters::default()).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id, exact.id);
        assert_eq!(hits[1].document_id, near.id);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn unembedded_document_is_not_indexed() {
        let idx = index();
        let mut doc = embedded_document("sin vector", vec![1.0], Utc::now());
        doc.embedding = None;
        assert!(!idx.upsert(&doc).unwrap());
        assert!(idx.is_empty());
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let idx = index();
        let now = Utc::now();
        idx.upsert(&embedded_document("a", vec![1.0, 0.0], now)).unwrap();
        let err = idx
            .upsert(&embedded_document("b", vec![1.0, 0.0, 0.0], now))
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 2, got: 3 }));
        assert!(idx.search(&[1.0], 5, &SearchFilters::default()).is_err());
    }

    #[test]
    fn recency_filter_excludes_old_and_undated() {
        let now = Utc::now();
        let idx = index();
        let fresh = embedded_document("fresh", vec![1.0, 0.0], now);
        let mut old = embedded_document("old", vec![1.0, 0.0], now);
        old.published_at = Some(now - Duration::days(40));
        let mut undated = embedded_document("undated", vec![1.0, 0.0], now);
        undated.published_at = None;
        idx.upsert_many(&[fresh.clone(), old, undated]);

        let hits = idx
            .search(&[1.0, 0.0], 10, &SearchFilters::published_since(now - Duration::days(7)))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, fresh.id);
    }

    #[test]
    fn sector_filter_uses_recorded_alerts() {
        let now = Utc::now();
        let idx = index();
        let energy = embedded_document("energy", vec![1.0, 0.0], now);
        let pharma = embedded_document("pharma", vec![1.0, 0.0], now);
        idx.upsert_many(&[energy.clone(), pharma.clone()]);
        idx.record_alerts([(energy.id, Sector::Energy), (pharma.id, Sector::Pharma)]);

        let hits = idx
            .search(&[1.0, 0.0], 10, &SearchFilters::sector(Sector::Pharma))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, pharma.id);
    }

    #[test]
    fn related_excludes_self_and_distant_and_alertless() {
        let now = Utc::now();
        let idx = index();
        let base = embedded_document("base", vec![1.0, 0.0], now);
        let close = embedded_document("close", vec![1.0, 0.1], now);
        let close_no_alert = embedded_document("close2", vec![1.0, 0.05], now);
        let distant = embedded_document("distant", vec![0.0, 1.0], now);
        idx.upsert_many(&[base.clone(), close.clone(), close_no_alert, distant.clone()]);
        idx.record_alerts([&base, &close, &distant].map(|d| (d.id, Sector::Energy)));

        let related = idx.related_to(base.id, 10);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].document_id, close.id);
        assert!(related[0].distance < 0.3);

        assert!(idx.related_to(uuid::Uuid::new_v4(), 10).is_empty());
    }

    #[test]
    fn held_snapshot_is_unaffected_by_writes() {
        let now = Utc::now();
        let idx = index();
        idx.upsert(&embedded_document("a", vec![1.0, 0.0], now)).unwrap();
        let held = idx.snapshot();
        idx.upsert(&embedded_document("b", vec![0.0, 1.0], now)).unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn writes_share_unchanged_entries_with_older_snapshots() {
        let now = Utc::now();
        let idx = index();
        let a = embedded_document("a", vec![1.0, 0.0], now);
        let b = embedded_document("b", vec![0.0, 1.0], now);
        idx.upsert_many(&[a.clone(), b.clone()]);
        let before = idx.snapshot();

        idx.record_alerts([(a.id, Sector::Energy), (b.id, Sector::Mining)]);
        let after = idx.snapshot();
        assert!(Arc::ptr_eq(&before.entries[0], &after.entries[0]));
        assert!(Arc::ptr_eq(&before.entries[1], &after.entries[1]));
        assert!(!before.has_alerts(a.id));
        assert!(after.has_alerts(a.id) && after.has_alerts(b.id));

        idx.record_alerts([(a.id, Sector::Energy)]);
        assert!(Arc::ptr_eq(&after, &idx.snapshot()));
    }

    #[test]
    fn reupsert_replaces_entry_in_place() {
        let now = Utc::now();
        let idx = index();
        let mut a = embedded_document("a", vec![1.0, 0.0], now);
        let b = embedded_document("b", vec![0.0, 1.0], now);
        idx.upsert_many(&[a.clone(), b.clone()]);
        a.title = "a2".into();
        idx.upsert(&a).unwrap();
        let snap = idx.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get(a.id).map(|e| e.title.as_str()), Some("a2"));
        assert_eq!(snap.get(b.id).map(|e| e.title.as_str()), Some("b"));
    }
}
