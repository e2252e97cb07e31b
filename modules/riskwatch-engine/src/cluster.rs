//! Greedy seed-based topic clustering.
//!
//! Walk the candidate pool in order. Each unvisited document with an embedding
//! seeds a search; hits more similar than the threshold that are not yet in a
//! cluster become the group. Groups of sufficient size are kept and their
//! members marked visited. The result depends on pool order.

use std::collections::HashSet;

use tracing::debug;

use riskwatch_common::{Cluster, ClusteringConfig, DocumentId, SimilarityHit};

use crate::similarity::{SearchFilters, SimilarityIndex};

const LABEL_MAX_CHARS: usize = 100;

pub struct TopicClusterer<'a> {
    index: &'a SimilarityIndex,
    similarity_threshold: f64,
    search_limit: usize,
}

impl<'a> TopicClusterer<'a> {
    pub fn new(index: &'a SimilarityIndex, config: &ClusteringConfig) -> Self {
        Self {
            index,
            similarity_threshold: config.similarity_threshold,
            search_limit: config.search_limit,
        }
    }

    /// Cluster `pool` (document ids, in seed order). Ids absent from the index
    /// never seed a cluster.
    pub fn cluster(&self, pool: &[DocumentId], min_cluster_size: usize) -> Vec<Cluster> {
        let min_cluster_size = min_cluster_size.max(1);
        if pool.len() < min_cluster_size {
            return Vec::new();
        }

        let snapshot = self.index.snapshot();
        let metric = self.index.metric();
        let mut visited: HashSet<DocumentId> = HashSet::new();
        let mut clusters = Vec::new();

        for &seed_id in pool {
            if visited.contains(&seed_id) {
                continue;
            }
            let Some(seed) = snapshot.get(seed_id) else {
                continue;
            };

            let hits = match snapshot.search(
                metric,
                &seed.embedding,
                self.search_limit,
                &SearchFilters::default(),
            ) {
                Ok(hits) => hits,
                Err(e) => {
                    debug!(error = %e, seed = %seed_id, "Seed search failed");
                    continue;
                }
            };

            let members: Vec<SimilarityHit> = hits
                .into_iter()
                .filter(|h| h.similarity > self.similarity_threshold)
                .filter(|h| !visited.contains(&h.document_id))
                .collect();

            if members.len() < min_cluster_size {
                continue;
            }

            let avg_similarity =
                members.iter().map(|m| m.similarity).sum::<f64>() / members.len() as f64;
            visited.extend(members.iter().map(|m| m.document_id));

            clusters.push(Cluster {
                id: clusters.len(),
                label: seed.title.chars().take(LABEL_MAX_CHARS).collect(),
                seed_id,
                members,
                avg_similarity,
            });
        }

        debug!(
            pool = pool.len(),
            clusters = clusters.len(),
            "Clustered candidate pool"
        );
        clusters
    }
}
