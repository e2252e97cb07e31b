//! Query-side entry points: text search, pattern-to-document search, related
//! alerts, and embedding of documents that do not have a vector yet.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use riskwatch_common::{
    Alert, AlertStore, Document, DocumentId, EmbeddingProvider, RiskPattern, SimilarityHit,
    StorageError,
};

use crate::similarity::{SearchFilters, SimilarityIndex};

/// Embedding inputs are capped at this many characters.
const MAX_EMBED_CHARS: usize = 8000;
const EMBED_CONCURRENCY: usize = 4;

/// A nearby document together with the alerts stored against it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedAlert {
    pub hit: SimilarityHit,
    pub alerts: Vec<Alert>,
}

pub struct RetrievalService {
    index: Arc<SimilarityIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    alerts: Arc<dyn AlertStore>,
}

impl RetrievalService {
    pub fn new(
        index: Arc<SimilarityIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        alerts: Arc<dyn AlertStore>,
    ) -> Self {
        Self {
            index,
            embedder,
            alerts,
        }
    }

    pub fn index(&self) -> &Arc<SimilarityIndex> {
        &self.index
    }

    /// Embed `query` and search the index. An unavailable embedder or a
    /// mismatched vector yields no results rather than an error.
    pub async fn search_text(
        &self,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Vec<SimilarityHit> {
        let vector = match self.embedder.embed(truncate_chars(query, MAX_EMBED_CHARS)).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Query embedding failed, returning no results");
                return Vec::new();
            }
        };
        match self.index.search(&vector, limit, filters) {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Similarity search rejected query vector");
                Vec::new()
            }
        }
    }

    /// Documents most similar to a pattern's description, keywords and triggers.
    pub async fn similar_to_pattern(
        &self,
        pattern: &RiskPattern,
        limit: usize,
    ) -> Vec<SimilarityHit> {
        let text = pattern_query_text(pattern);
        self.search_text(&text, limit, &SearchFilters::default()).await
    }

    /// Alerted documents near `document_id`, with their alerts attached.
    pub async fn related_alerts(
        &self,
        document_id: DocumentId,
        limit: usize,
    ) -> Result<Vec<RelatedAlert>, StorageError> {
        let hits = self.index.related_to(document_id, limit);
        let mut related = Vec::with_capacity(hits.len());
        for hit in hits {
            let alerts = self.alerts.alerts_for_document(hit.document_id).await?;
            if alerts.is_empty() {
                continue;
            }
            related.push(RelatedAlert { hit, alerts });
        }
        Ok(related)
    }

    /// Embed documents that lack a vector and add them to the index. Failures
    /// are logged and skipped; the returned documents carry their new vectors.
    pub async fn embed_pending(&self, documents: &[Document]) -> Vec<Document> {
        let pending: Vec<&Document> = documents
            .iter()
            .filter(|d| !d.has_embedding() && !d.content.trim().is_empty())
            .collect();
        if pending.is_empty() {
            return Vec::new();
        }

        let embedded: Vec<Document> = stream::iter(pending)
            .map(|doc| async move {
                let text = doc.embedding_text();
                match self.embedder.embed(truncate_chars(&text, MAX_EMBED_CHARS)).await {
                    Ok(vector) => {
                        let mut doc = doc.clone();
                        doc.embedding = Some(vector);
                        Some(doc)
                    }
                    Err(e) => {
                        warn!(document_id = %doc.id, error = %e, "Embedding failed, skipping");
                        None
                    }
                }
            })
            .buffer_unordered(EMBED_CONCURRENCY)
            .filter_map(|d| async move { d })
            .collect()
            .await;

        let indexed = self.index.upsert_many(&embedded);
        info!(
            embedded = embedded.len(),
            indexed, "Embedded pending documents"
        );
        embedded
    }
}

fn pattern_query_text(pattern: &RiskPattern) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if !pattern.description.trim().is_empty() {
        parts.push(&pattern.description);
    }
    parts.extend(pattern.keywords.iter().map(String::as_str));
    parts.extend(pattern.triggers.iter().map(String::as_str));
    if parts.is_empty() {
        parts.push(&pattern.name);
    }
    parts.join(" ")
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
