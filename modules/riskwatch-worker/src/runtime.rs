//! Wires config, catalog, in-memory stores and the engine services together.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use riskwatch_common::{Alert, AlertStore, Config, Document, DocumentId, Sector};
use riskwatch_engine::catalog::ReloadOutcome;
use riskwatch_engine::{
    trending_topics, BatchSummary, CatalogStore, FilePatternSource, MemoryAlertStore,
    MemoryDocumentStore, PipelineDeps, ScoringPipeline, SimilarityIndex,
};

/// Read a JSON array of documents.
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read documents file: {}", path.display()))?;
    let documents: Vec<Document> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse documents file: {}", path.display()))?;
    Ok(documents)
}

/// One row of analyze output.
#[derive(Debug, Serialize)]
pub struct AnalyzeReport {
    pub batch: BatchSummary,
    pub high_risk_alerts: Vec<Alert>,
}

pub struct Runtime {
    pub config: Config,
    patterns: FilePatternSource,
    catalog: Arc<CatalogStore>,
    alerts: Arc<MemoryAlertStore>,
    index: Arc<SimilarityIndex>,
    pipeline: ScoringPipeline,
}

impl Runtime {
    /// `config_path` is the file `config` was read from, if any. A relative
    /// `patterns_path` is resolved against its directory.
    pub fn new(config: Config, config_path: Option<&Path>, documents: Vec<Document>) -> Self {
        let patterns_path = resolve_patterns_path(&config.patterns_path, config_path);
        info!(path = %patterns_path.display(), "Using risk pattern file");
        let patterns = FilePatternSource::new(patterns_path);
        let (catalog, err) = CatalogStore::load(&patterns);
        if let Some(e) = err {
            warn!(error = %e, "Starting with an empty pattern catalog");
        }
        let catalog = Arc::new(catalog);

        let index = Arc::new(SimilarityIndex::new(&config.similarity));
        let indexed = index.upsert_many(&documents);
        info!(documents = documents.len(), indexed, "Loaded documents");

        let documents = Arc::new(MemoryDocumentStore::new(documents));
        let alerts = Arc::new(MemoryAlertStore::new());

        let pipeline = ScoringPipeline::new(
            PipelineDeps::builder()
                .catalog(catalog.clone())
                .documents(documents.clone())
                .alerts(alerts.clone())
                .index(Some(index.clone()))
                .thresholds(config.thresholds)
                .batch(config.batch.clone())
                .build(),
        );

        Self {
            config,
            patterns,
            catalog,
            alerts,
            index,
            pipeline,
        }
    }

    pub fn reload_patterns(&self) {
        match self.catalog.reload(&self.patterns) {
            ReloadOutcome::Reloaded { patterns } => info!(patterns, "Pattern catalog reloaded"),
            ReloadOutcome::Failed(e) => warn!(error = %e, "Pattern reload failed, catalog is empty"),
            ReloadOutcome::Skipped => {}
        }
    }

    pub async fn analyze(&self, now: DateTime<Utc>, sector: Option<Sector>) -> Result<AnalyzeReport> {
        let batch = self.pipeline.run_batch(now).await?;
        let since = now - Duration::days(self.config.trends.window_days.max(1));
        let high_risk_alerts = self.alerts.high_risk_alerts(sector, since).await?;
        Ok(AnalyzeReport {
            batch,
            high_risk_alerts,
        })
    }

    /// Score the corpus, then list alerted neighbors of `document_id`.
    pub async fn related(
        &self,
        document_id: DocumentId,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<RelatedRow>> {
        self.pipeline.run_batch(now).await?;
        let hits = self.index.related_to(document_id, limit);
        let mut rows = Vec::with_capacity(hits.len());
        for hit in hits {
            let alerts = self.alerts.alerts_for_document(hit.document_id).await?;
            rows.push(RelatedRow {
                document_id: hit.document_id,
                title: hit.title,
                distance: hit.distance,
                alerts: alerts.into_iter().map(|a| a.summary).collect(),
            });
        }
        Ok(rows)
    }

    pub fn trends(&self, now: DateTime<Utc>) -> Vec<riskwatch_common::TrendingTopic> {
        trending_topics(&self.index, &self.config.clustering, &self.config.trends, now)
    }
}

#[derive(Debug, Serialize)]
pub struct RelatedRow {
    pub document_id: DocumentId,
    pub title: String,
    pub distance: f64,
    pub alerts: Vec<String>,
}

/// Relative pattern paths are resolved against the config file's directory, or
/// the working directory when running on defaults.
fn resolve_patterns_path(path: &Path, config_path: Option<&Path>) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    config_path
        .and_then(Path::parent)
        .map(|dir| dir.join(path))
        .unwrap_or_else(|| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PATTERNS: &str = r#"{"energy_patterns": [{
        "name": "refinery_incident", "sector": "energy", "pattern_type": "operational",
        "risk_level": "high", "keywords": ["refinería", "pemex"],
        "template": {"triggers": ["paro técnico"]}
    }]}"#;

    fn document(title: &str, content: &str, embedding: Vec<f32>, now: DateTime<Utc>) -> Document {
        Document {
            id: uuid::Uuid::new_v4(),
            title: title.into(),
            content: content.into(),
            published_at: Some(now),
            created_at: now,
            source: None,
            embedding: Some(embedding),
        }
    }

    fn runtime(documents: Vec<Document>) -> (Runtime, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PATTERNS.as_bytes()).unwrap();
        let config = Config {
            patterns_path: file.path().to_path_buf(),
            ..Config::default()
        };
        (Runtime::new(config, None, documents), file)
    }

    #[test]
    fn bundled_config_and_catalog_load() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config");
        let config = riskwatch_common::load_config(&root.join("riskwatch.toml")).unwrap();
        assert_eq!(config.thresholds, riskwatch_common::RiskThresholds::default());

        let source = FilePatternSource::new(root.join(&config.patterns_path));
        let (catalog, err) = riskwatch_engine::PatternCatalog::load_or_empty(&source);
        assert!(err.is_none(), "{err:?}");
        assert_eq!(catalog.len(), 6);
        assert_eq!(
            catalog.get("financial_distress").map(|p| p.sector),
            Some(Sector::Energy)
        );
    }

    #[test]
    fn patterns_path_follows_the_config_file() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config");
        let config_path = root.join("riskwatch.toml");
        let config = riskwatch_common::load_config(&config_path).unwrap();

        let rt = Runtime::new(config, Some(&config_path), Vec::new());
        assert_eq!(rt.catalog.snapshot().len(), 6);

        assert_eq!(
            resolve_patterns_path(Path::new("p.json"), Some(Path::new("/etc/rw/riskwatch.toml"))),
            PathBuf::from("/etc/rw/p.json")
        );
        assert_eq!(
            resolve_patterns_path(Path::new("/abs/p.json"), Some(Path::new("/etc/rw/riskwatch.toml"))),
            PathBuf::from("/abs/p.json")
        );
        assert_eq!(resolve_patterns_path(Path::new("p.json"), None), PathBuf::from("p.json"));
    }

    #[test]
    fn documents_file_round_trips_through_serde() {
        let now = Utc::now();
        let docs = vec![document("a", "b", vec![1.0], now)];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&docs).unwrap().as_bytes())
            .unwrap();
        assert_eq!(load_documents(file.path()).unwrap(), docs);
        assert!(load_documents(Path::new("/nonexistent.json")).is_err());
    }

    #[tokio::test]
    async fn analyze_reports_high_risk_alerts() {
        let now = Utc::now();
        let (rt, _file) = runtime(vec![
            document("Refinería PEMEX", "paro técnico", vec![1.0, 0.0], now),
            document("Clima", "soleado", vec![0.0, 1.0], now),
        ]);
        let report = rt.analyze(now, None).await.unwrap();
        assert_eq!(report.batch.alerts_created, 1);
        assert_eq!(report.high_risk_alerts.len(), 1);
        assert!(rt
            .analyze(now, Some(Sector::Pharma))
            .await
            .unwrap()
            .high_risk_alerts
            .is_empty());
    }

    #[tokio::test]
    async fn related_lists_alerted_neighbors() {
        let now = Utc::now();
        let alerted = document("Refinería PEMEX", "paro técnico", vec![1.0, 0.0], now);
        let neighbor = document("Nota cercana", "sin detalles", vec![0.99, 0.05], now);
        let (rt, _file) = runtime(vec![alerted.clone(), neighbor.clone()]);

        let rows = rt.related(neighbor.id, 5, now).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].document_id, alerted.id);
        assert_eq!(rows[0].alerts.len(), 1);
    }
}
