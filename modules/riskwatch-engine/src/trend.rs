//! Trend ranking over topic clusters.
//!
//! A cluster trends when enough of its members were published recently.
//! `trend_score = recent_members * avg_similarity`.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use riskwatch_common::{Cluster, ClusteringConfig, SimilarityHit, TrendConfig, TrendingTopic};

use crate::cluster::TopicClusterer;
use crate::similarity::SimilarityIndex;

const SAMPLE_DOCUMENTS: usize = 3;

pub struct TrendRanker {
    top_n: usize,
}

impl TrendRanker {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    /// Rank clusters by trend score, highest first; ties keep cluster order.
    /// Members without a publication time never count as recent.
    pub fn rank(
        &self,
        clusters: &[Cluster],
        window: Duration,
        min_recent_members: usize,
        now: DateTime<Utc>,
    ) -> Vec<TrendingTopic> {
        let cutoff = now - window;

        let mut topics: Vec<TrendingTopic> = clusters
            .iter()
            .filter_map(|cluster| {
                let recent: Vec<&SimilarityHit> = cluster
                    .members
                    .iter()
                    .filter(|m| m.published_at.is_some_and(|p| p >= cutoff))
                    .collect();
                if recent.len() < min_recent_members {
                    return None;
                }
                Some(TrendingTopic {
                    topic: cluster.label.clone(),
                    document_count: recent.len(),
                    trend_score: recent.len() as f64 * cluster.avg_similarity,
                    avg_similarity: cluster.avg_similarity,
                    sample_documents: recent
                        .into_iter()
                        .take(SAMPLE_DOCUMENTS)
                        .cloned()
                        .collect(),
                })
            })
            .collect();

        topics.sort_by(|a, b| b.trend_score.total_cmp(&a.trend_score));
        topics.truncate(self.top_n);
        topics
    }
}

/// Cluster the recent pool from `index` and rank the result.
pub fn trending_topics(
    index: &SimilarityIndex,
    clustering: &ClusteringConfig,
    trends: &TrendConfig,
    now: DateTime<Utc>,
) -> Vec<TrendingTopic> {
    let pool_since = now - Duration::days(clustering.pool_window_days);
    let pool = index.recent_documents(Some(pool_since), clustering.pool_size);
    let clusters = TopicClusterer::new(index, clustering).cluster(&pool, trends.min_documents);
    let topics = TrendRanker::new(trends.top_n).rank(
        &clusters,
        trends.window(),
        trends.min_documents,
        now,
    );
    info!(
        pool = pool.len(),
        clusters = clusters.len(),
        topics = topics.len(),
        "Computed trending topics"
    );
    topics
}
