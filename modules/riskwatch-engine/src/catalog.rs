//! Pattern catalog: parsing, validation, and snapshot-swapped reloads.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, error, info};

use riskwatch_common::{ConfigError, RiskFactor, RiskLevel, RiskPattern, Sector};

/// Anything that can produce a fresh catalog.
pub trait PatternSource: Send + Sync {
    fn load(&self) -> Result<PatternCatalog, ConfigError>;
}

/// Reads the grouped JSON definition file from disk.
pub struct FilePatternSource {
    path: PathBuf,
}

impl FilePatternSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PatternSource for FilePatternSource {
    fn load(&self) -> Result<PatternCatalog, ConfigError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        PatternCatalog::from_json(&content, &self.path)
    }
}

// --- Raw file shape ---

#[derive(Debug, Deserialize)]
struct RawPattern {
    name: String,
    sector: String,
    pattern_type: String,
    risk_level: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    keywords: Vec<String>,
    template: RawTemplate,
}

#[derive(Debug, Deserialize)]
struct RawTemplate {
    #[serde(default)]
    triggers: Vec<String>,
    #[serde(default)]
    risk_factors: BTreeMap<String, f64>,
}

impl RawPattern {
    fn validate(self) -> Result<RiskPattern, ConfigError> {
        let sector: Sector = self.sector.parse().map_err(|_| ConfigError::UnknownSector {
            pattern: self.name.clone(),
            value: self.sector.clone(),
        })?;
        let risk_level: RiskLevel =
            self.risk_level
                .parse()
                .map_err(|_| ConfigError::UnknownRiskLevel {
                    pattern: self.name.clone(),
                    value: self.risk_level.clone(),
                })?;

        let mut risk_factors = Vec::with_capacity(self.template.risk_factors.len());
        for (key, weight) in self.template.risk_factors {
            if !(weight.is_finite() && weight > 0.0) {
                return Err(ConfigError::InvalidWeight {
                    pattern: self.name.clone(),
                    factor: key,
                    weight,
                });
            }
            risk_factors.push((RiskFactor::from(key), weight));
        }

        Ok(RiskPattern {
            name: self.name,
            sector,
            pattern_type: self.pattern_type,
            risk_level,
            description: self.description,
            keywords: self.keywords,
            triggers: self.template.triggers,
            risk_factors,
        })
    }
}

// --- Catalog ---

/// Immutable set of validated patterns with unique names.
#[derive(Debug, Clone, Default)]
pub struct PatternCatalog {
    patterns: Vec<RiskPattern>,
    by_name: HashMap<String, usize>,
}

impl PatternCatalog {
    /// The inert catalog used after a failed load. Scores nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_patterns(patterns: Vec<RiskPattern>) -> Result<Self, ConfigError> {
        let mut by_name = HashMap::with_capacity(patterns.len());
        for (i, pattern) in patterns.iter().enumerate() {
            if by_name.insert(pattern.name.clone(), i).is_some() {
                return Err(ConfigError::DuplicatePattern(pattern.name.clone()));
            }
        }
        Ok(Self { patterns, by_name })
    }

    /// Parse the grouped definition format: a JSON object whose array-valued
    /// members (e.g. `energy_patterns`, `general_patterns`) hold pattern entries.
    /// Non-array members are ignored. Catalog order is file order, groups first
    /// and then entries within each group.
    pub fn from_json(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let groups: IndexMap<String, serde_json::Value> =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut patterns = Vec::new();
        for (group, value) in groups {
            if !value.is_array() {
                debug!(group = group.as_str(), "Skipping non-array catalog member");
                continue;
            }
            let raw: Vec<RawPattern> =
                serde_json::from_value(value).map_err(|e| ConfigError::Parse {
                    path: origin.to_path_buf(),
                    message: format!("group {group}: {e}"),
                })?;
            for entry in raw {
                patterns.push(entry.validate()?);
            }
        }

        Self::from_patterns(patterns)
    }

    /// Load from `source`, degrading to the empty catalog on failure. The error
    /// is logged and handed back so the caller can report it.
    pub fn load_or_empty(source: &dyn PatternSource) -> (Self, Option<ConfigError>) {
        match source.load() {
            Ok(catalog) => {
                info!(patterns = catalog.len(), "Loaded risk pattern catalog");
                (catalog, None)
            }
            Err(e) => {
                error!(error = %e, "Failed to load risk patterns, using empty catalog");
                (Self::empty(), Some(e))
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&RiskPattern> {
        self.by_name.get(name).map(|&i| &self.patterns[i])
    }

    pub fn patterns(&self) -> &[RiskPattern] {
        &self.patterns
    }

    pub fn iter(&self) -> impl Iterator<Item = &RiskPattern> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

// --- Store ---

#[derive(Debug)]
pub enum ReloadOutcome {
    Reloaded { patterns: usize },
    /// The source failed; the empty catalog is now active.
    Failed(ConfigError),
    /// Another reload was already running.
    Skipped,
}

/// Holds the active catalog. Readers take an owned snapshot and keep a
/// consistent view even if a reload swaps in new data mid-pass.
pub struct CatalogStore {
    inner: ArcSwap<PatternCatalog>,
    reloading: AtomicBool,
}

impl CatalogStore {
    pub fn new(initial: PatternCatalog) -> Self {
        Self {
            inner: ArcSwap::new(Arc::new(initial)),
            reloading: AtomicBool::new(false),
        }
    }

    /// Initial load at startup. Never fails; see `PatternCatalog::load_or_empty`.
    pub fn load(source: &dyn PatternSource) -> (Self, Option<ConfigError>) {
        let (catalog, err) = PatternCatalog::load_or_empty(source);
        (Self::new(catalog), err)
    }

    pub fn snapshot(&self) -> Arc<PatternCatalog> {
        self.inner.load_full()
    }

    /// Replace the catalog wholesale. Only one reload runs at a time.
    pub fn reload(&self, source: &dyn PatternSource) -> ReloadOutcome {
        if self
            .reloading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Pattern catalog reload already in progress, skipping");
            return ReloadOutcome::Skipped;
        }

        let (catalog, err) = PatternCatalog::load_or_empty(source);
        let patterns = catalog.len();
        self.inner.store(Arc::new(catalog));
        self.reloading.store(false, Ordering::SeqCst);

        match err {
            Some(e) => ReloadOutcome::Failed(e),
            None => ReloadOutcome::Reloaded { patterns },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "version": "1.0",
        "energy_patterns": [
            {
                "name": "refinery_incident",
                "sector": "energy",
                "pattern_type": "operational",
                "risk_level": "high",
                "keywords": ["refinería", "pemex"],
                "template": {
                    "triggers": ["explosión en refinería"],
                    "risk_factors": {"explosion": 2.0, "oil_spill": 1.5}
                }
            }
        ],
        "general_patterns": [
            {
                "name": "community_conflict",
                "sector": "general",
                "pattern_type": "social",
                "risk_level": "medium",
                "template": {}
            }
        ]
    }"#;

    struct StaticSource(&'static str);

    impl PatternSource for StaticSource {
        fn load(&self) -> Result<PatternCatalog, ConfigError> {
            PatternCatalog::from_json(self.0, Path::new("inline.json"))
        }
    }

    #[test]
    fn parses_grouped_file_and_defaults_optional_fields() {
        let catalog = PatternCatalog::from_json(CATALOG, Path::new("inline.json")).unwrap();
        assert_eq!(catalog.len(), 2);

        let refinery = catalog.get("refinery_incident").unwrap();
        assert_eq!(refinery.sector, Sector::Energy);
        assert_eq!(refinery.risk_level, RiskLevel::High);
        assert_eq!(refinery.risk_factors.len(), 2);
        assert!(refinery
            .risk_factors
            .contains(&(RiskFactor::Explosion, 2.0)));

        let general = catalog.get("community_conflict").unwrap();
        assert_eq!(general.sector, Sector::Energy);
        assert!(general.keywords.is_empty());
        assert!(general.triggers.is_empty());
        assert!(general.risk_factors.is_empty());
    }

    #[test]
    fn rejects_unknown_sector_at_load() {
        let json = r#"{"p": [{"name": "a", "sector": "agriculture", "pattern_type": "x",
                              "risk_level": "low", "template": {}}]}"#;
        let err = PatternCatalog::from_json(json, Path::new("p.json")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSector { ref value, .. } if value == "agriculture"));
    }

    #[test]
    fn rejects_duplicate_names_across_groups() {
        let json = r#"{
            "a": [{"name": "dup", "sector": "energy", "pattern_type": "x", "risk_level": "low", "template": {}}],
            "b": [{"name": "dup", "sector": "pharma", "pattern_type": "y", "risk_level": "low", "template": {}}]
        }"#;
        let err = PatternCatalog::from_json(json, Path::new("p.json")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePattern(ref n) if n == "dup"));
    }

    #[test]
    fn catalog_keeps_file_order_of_groups_and_entries() {
        let json = r#"{
            "energy_patterns": [
                {"name": "e2", "sector": "energy", "pattern_type": "x", "risk_level": "low", "template": {}},
                {"name": "e1", "sector": "energy", "pattern_type": "x", "risk_level": "low", "template": {}}
            ],
            "pharma_patterns": [
                {"name": "p1", "sector": "pharma", "pattern_type": "x", "risk_level": "low", "template": {}}
            ],
            "general_patterns": [
                {"name": "g1", "sector": "general", "pattern_type": "x", "risk_level": "low", "template": {}}
            ]
        }"#;
        let catalog = PatternCatalog::from_json(json, Path::new("p.json")).unwrap();
        let names: Vec<&str> = catalog.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["e2", "e1", "p1", "g1"]);
    }

    #[test]
    fn rejects_non_positive_weight() {
        let json = r#"{"p": [{"name": "a", "sector": "mining", "pattern_type": "x",
                              "risk_level": "low",
                              "template": {"risk_factors": {"explosion": 0.0}}}]}"#;
        assert!(matches!(
            PatternCatalog::from_json(json, Path::new("p.json")),
            Err(ConfigError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn missing_template_is_a_parse_error() {
        let json = r#"{"p": [{"name": "a", "sector": "mining", "pattern_type": "x", "risk_level": "low"}]}"#;
        assert!(matches!(
            PatternCatalog::from_json(json, Path::new("p.json")),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn failed_load_yields_empty_catalog_and_error() {
        let source = FilePatternSource::new("/nonexistent/risk_patterns.json");
        let (catalog, err) = PatternCatalog::load_or_empty(&source);
        assert!(catalog.is_empty());
        assert!(matches!(err, Some(ConfigError::Io { .. })));
    }

    #[test]
    fn reload_swaps_snapshot_without_touching_held_ones() {
        let (store, err) = CatalogStore::load(&StaticSource(CATALOG));
        assert!(err.is_none());
        let held = store.snapshot();
        assert_eq!(held.len(), 2);

        let outcome = store.reload(&StaticSource("not json"));
        assert!(matches!(outcome, ReloadOutcome::Failed(ConfigError::Parse { .. })));
        assert!(store.snapshot().is_empty());
        assert_eq!(held.len(), 2);

        let outcome = store.reload(&StaticSource(CATALOG));
        assert!(matches!(outcome, ReloadOutcome::Reloaded { patterns: 2 }));
    }
}
