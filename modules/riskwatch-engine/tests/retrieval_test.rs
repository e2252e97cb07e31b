//! Similarity search, related alerts and trending topics over a shared index.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use riskwatch_common::{
    ClusteringConfig, Document, Sector, SimilarityConfig, TrendConfig,
};
use riskwatch_engine::testing::{embedded_document, sample_pattern, FixedEmbedder};
use riskwatch_engine::{
    trending_topics, CatalogStore, MemoryAlertStore, MemoryDocumentStore, PatternCatalog,
    PipelineDeps, RetrievalService, ScoringPipeline, SearchFilters, SimilarityIndex,
};

fn dated(title: &str, vector: Vec<f32>, age_days: i64, now: DateTime<Utc>) -> Document {
    let mut d = embedded_document(title, vector, now);
    d.published_at = Some(now - Duration::days(age_days));
    d
}

/// Three tight topics of different sizes plus noise.
fn corpus(now: DateTime<Utc>) -> Vec<Document> {
    vec![
        dated("Huelga en mina de cobre", vec![1.0, 0.0, 0.0, 0.0], 1, now),
        dated("Paro minero en Sonora", vec![0.97, 0.05, 0.0, 0.0], 2, now),
        dated("Mineros bloquean acceso", vec![0.95, 0.1, 0.0, 0.0], 3, now),
        dated("Protesta en mina", vec![0.96, 0.0, 0.05, 0.0], 4, now),
        dated("Refinería detenida", vec![0.0, 1.0, 0.0, 0.0], 1, now),
        dated("Fuga en refinería", vec![0.0, 0.95, 0.1, 0.0], 2, now),
        dated("Explosión en refinería", vec![0.05, 0.97, 0.0, 0.0], 3, now),
        dated("Tasas de interés", vec![0.0, 0.0, 0.0, 1.0], 1, now),
        dated("Tasas viejas", vec![0.0, 0.0, 0.1, 0.97], 20, now),
        dated("Nota antigua", vec![0.0, 0.0, 0.0, 1.0], 60, now),
    ]
}

#[test]
fn trending_topics_rank_by_recent_volume() {
    let now = Utc::now();
    let index = SimilarityIndex::new(&SimilarityConfig::default());
    index.upsert_many(&corpus(now));

    let topics = trending_topics(
        &index,
        &ClusteringConfig::default(),
        &TrendConfig::default(),
        now,
    );

    assert_eq!(topics.len(), 2);
    assert_eq!(topics[0].topic, "Huelga en mina de cobre");
    assert_eq!(topics[0].document_count, 4);
    assert_eq!(topics[1].topic, "Refinería detenida");
    assert_eq!(topics[1].document_count, 3);
    assert!(topics[0].trend_score >= topics[1].trend_score);
    assert!(topics.iter().all(|t| t.sample_documents.len() <= 3));
}

#[test]
fn search_is_sorted_and_respects_recency() {
    let now = Utc::now();
    let index = SimilarityIndex::new(&SimilarityConfig::default());
    index.upsert_many(&corpus(now));

    let hits = index
        .search(&[0.0, 0.0, 0.0, 1.0], 10, &SearchFilters::default())
        .unwrap();
    assert_eq!(hits.len(), 10);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

    let recent = index
        .search(
            &[0.0, 0.0, 0.0, 1.0],
            10,
            &SearchFilters::published_since(now - Duration::days(7)),
        )
        .unwrap();
    assert!(recent.iter().all(|h| h.published_at.unwrap() >= now - Duration::days(7)));
    assert_eq!(recent[0].title, "Tasas de interés");
}

#[tokio::test]
async fn scoring_feeds_the_index_for_related_alerts() {
    let now = Utc::now();
    let index = Arc::new(SimilarityIndex::new(&SimilarityConfig::default()));
    let alerts = Arc::new(MemoryAlertStore::new());

    let mut alerted = embedded_document("Refinería PEMEX", vec![1.0, 0.0], now);
    alerted.content = "paro técnico".into();
    let neighbor = embedded_document("Reporte cercano", vec![0.98, 0.1], now);
    let documents = Arc::new(MemoryDocumentStore::new(vec![alerted.clone(), neighbor.clone()]));

    let catalog = PatternCatalog::from_patterns(vec![sample_pattern("refinery_incident")]).unwrap();
    let pipeline = ScoringPipeline::new(
        PipelineDeps::builder()
            .catalog(Arc::new(CatalogStore::new(catalog)))
            .documents(documents)
            .alerts(alerts.clone())
            .index(Some(index.clone()))
            .build(),
    );
    let summary = pipeline.run_batch(now).await.unwrap();
    assert_eq!(summary.alerts_created, 1);
    assert_eq!(index.len(), 2);

    let sector_hits = index
        .search(&[1.0, 0.0], 5, &SearchFilters::sector(Sector::Energy))
        .unwrap();
    assert_eq!(sector_hits.len(), 1);
    assert_eq!(sector_hits[0].document_id, alerted.id);

    let service = RetrievalService::new(index, Arc::new(FixedEmbedder::new(2)), alerts);
    let related = service.related_alerts(neighbor.id, 5).await.unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].hit.document_id, alerted.id);
    assert_eq!(related[0].alerts[0].pattern_name, "refinery_incident");

    assert!(service.related_alerts(alerted.id, 5).await.unwrap().is_empty());
}
