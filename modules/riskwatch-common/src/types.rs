use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::factor::RiskFactor;

pub type DocumentId = Uuid;
pub type AlertId = Uuid;
pub type PatternId = Uuid;

// --- Enums ---

/// Closed set of industry sectors a pattern (and therefore an alert) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sector {
    Energy,
    Pharma,
    Mining,
    Manufacturing,
    Finance,
    Infrastructure,
}

impl std::fmt::Display for Sector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sector::Energy => write!(f, "energy"),
            Sector::Pharma => write!(f, "pharma"),
            Sector::Mining => write!(f, "mining"),
            Sector::Manufacturing => write!(f, "manufacturing"),
            Sector::Finance => write!(f, "finance"),
            Sector::Infrastructure => write!(f, "infrastructure"),
        }
    }
}

impl FromStr for Sector {
    type Err = String;

    /// Case-insensitive. `general` is accepted as an alias for `energy`, which is
    /// where general-purpose patterns have always been filed.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "energy" | "general" => Ok(Sector::Energy),
            "pharma" => Ok(Sector::Pharma),
            "mining" => Ok(Sector::Mining),
            "manufacturing" => Ok(Sector::Manufacturing),
            "finance" => Ok(Sector::Finance),
            "infrastructure" => Ok(Sector::Infrastructure),
            other => Err(format!("unknown sector: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(format!("unknown risk level: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Rss,
    Api,
    Scraper,
    Synthetic,
}

impl SourceType {
    /// Locally generated (hyperlocal) sources get a scoring boost.
    pub fn is_hyperlocal(&self) -> bool {
        matches!(self, SourceType::Synthetic)
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Rss => write!(f, "rss"),
            SourceType::Api => write!(f, "api"),
            SourceType::Scraper => write!(f, "scraper"),
            SourceType::Synthetic => write!(f, "synthetic"),
        }
    }
}

// --- Documents ---

/// Where a document came from, including its locality tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

/// A short news-like item. The embedding is computed upstream; `None` means the
/// document is invisible to similarity search and clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl Document {
    /// Lowercased `title + " " + content`, the haystack every matcher searches.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.content).to_lowercase()
    }

    /// Text handed to the embedding provider.
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.content)
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }

    pub fn is_hyperlocal(&self) -> bool {
        self.source
            .as_ref()
            .is_some_and(|s| s.source_type.is_hyperlocal())
    }
}

// --- Patterns ---

/// A validated risk pattern. Only constructed through catalog loading, so the
/// sector and level are always inside their closed enumerations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPattern {
    pub name: String,
    pub sector: Sector,
    pub pattern_type: String,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<(RiskFactor, f64)>,
}

/// Score plus the evidence that produced it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskScoreResult {
    pub score: f64,
    pub matched_keywords: Vec<String>,
    pub matched_triggers: Vec<String>,
    pub matched_factors: Vec<RiskFactor>,
}

// --- Alerts ---

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlertLocation {
    pub state: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlertSourceInfo {
    pub name: Option<String>,
    pub source_type: Option<SourceType>,
}

/// Structured evidence stored alongside an alert.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlertDetails {
    pub pattern_type: String,
    pub keywords_matched: Vec<String>,
    pub triggers_matched: Vec<String>,
    pub factors_matched: Vec<RiskFactor>,
    pub location: AlertLocation,
    pub source: AlertSourceInfo,
}

impl AlertDetails {
    pub fn from_evidence(document: &Document, pattern: &RiskPattern, result: &RiskScoreResult) -> Self {
        let (location, source) = match &document.source {
            Some(s) => (
                AlertLocation {
                    state: s.state.clone(),
                    city: s.city.clone(),
                },
                AlertSourceInfo {
                    name: Some(s.name.clone()),
                    source_type: Some(s.source_type),
                },
            ),
            None => (AlertLocation::default(), AlertSourceInfo::default()),
        };

        Self {
            pattern_type: pattern.pattern_type.clone(),
            keywords_matched: result.matched_keywords.clone(),
            triggers_matched: result.matched_triggers.clone(),
            factors_matched: result.matched_factors.clone(),
            location,
            source,
        }
    }
}

/// An alert that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub document_id: DocumentId,
    pub pattern_id: PatternId,
    pub pattern_name: String,
    pub score: f64,
    pub level: RiskLevel,
    pub sector: Sector,
    pub summary: String,
    pub details: AlertDetails,
}

/// A persisted alert. `sent` only ever moves from false to true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub document_id: DocumentId,
    pub pattern_id: PatternId,
    pub pattern_name: String,
    pub score: f64,
    pub level: RiskLevel,
    pub sector: Sector,
    pub summary: String,
    pub details: AlertDetails,
    pub sent: bool,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn from_new(alert: NewAlert, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id: alert.document_id,
            pattern_id: alert.pattern_id,
            pattern_name: alert.pattern_name,
            score: alert.score,
            level: alert.level,
            sector: alert.sector,
            summary: alert.summary,
            details: alert.details,
            sent: false,
            created_at,
        }
    }

    /// Apply the `unsent -> sent` transition. Returns false when the alert was
    /// already sent; there is no way back.
    pub fn mark_sent(&mut self) -> bool {
        if self.sent {
            return false;
        }
        self.sent = true;
        true
    }
}

// --- Retrieval ---

/// One nearest-neighbor result. Lower distance is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityHit {
    pub document_id: DocumentId,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
    pub distance: f64,
    pub similarity: f64,
}

impl SimilarityHit {
    pub fn new(
        document_id: DocumentId,
        title: String,
        published_at: Option<DateTime<Utc>>,
        distance: f64,
    ) -> Self {
        Self {
            document_id,
            title,
            published_at,
            distance,
            similarity: 1.0 - distance,
        }
    }
}

/// A group of documents seeded by one document. Recomputed per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: usize,
    pub label: String,
    pub seed_id: DocumentId,
    pub members: Vec<SimilarityHit>,
    pub avg_similarity: f64,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingTopic {
    pub topic: String,
    pub document_count: usize,
    pub trend_score: f64,
    pub avg_similarity: f64,
    pub sample_documents: Vec<SimilarityHit>,
}
