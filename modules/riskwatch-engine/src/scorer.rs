//! Risk scoring: pure functions from (document, pattern, evaluation time) to a
//! score in [0, 1] plus the evidence behind it.
//!
//! Terms, in evaluation order:
//! - keywords: fraction of pattern keywords present, weight 0.4
//! - triggers: flat 0.3 per trigger phrase present, unbounded before the clamp
//! - risk factors: `weight * 0.1` per factor with any phrase present
//! - hyperlocal source: +0.1
//! - recency: +0.1 within 7 days, +0.05 within 30 days
//!
//! The sum is clamped to 1.0. Triggers are deliberately uncapped: two trigger
//! hits alone can saturate the score.

use chrono::{DateTime, Utc};

use riskwatch_common::{Document, RiskLevel, RiskPattern, RiskScoreResult, RiskThresholds};

pub const KEYWORD_WEIGHT: f64 = 0.4;
pub const TRIGGER_BONUS: f64 = 0.3;
pub const FACTOR_SCALE: f64 = 0.1;
pub const HYPERLOCAL_BOOST: f64 = 0.1;
pub const RECENT_WEEK_BOOST: f64 = 0.1;
pub const RECENT_MONTH_BOOST: f64 = 0.05;

const RECENT_WEEK_DAYS: i64 = 7;
const RECENT_MONTH_DAYS: i64 = 30;

/// Score `document` against `pattern` as of `now`.
///
/// Works with or without an embedding; only keyword, trigger, factor, source and
/// recency terms are involved.
pub fn score(document: &Document, pattern: &RiskPattern, now: DateTime<Utc>) -> RiskScoreResult {
    let text = document.search_text();

    let matched_keywords: Vec<String> = pattern
        .keywords
        .iter()
        .filter(|k| phrase_in(&text, k))
        .cloned()
        .collect();
    let keyword_term = if pattern.keywords.is_empty() {
        0.0
    } else {
        let fraction = matched_keywords.len() as f64 / pattern.keywords.len() as f64;
        fraction.min(1.0) * KEYWORD_WEIGHT
    };

    let matched_triggers: Vec<String> = pattern
        .triggers
        .iter()
        .filter(|t| phrase_in(&text, t))
        .cloned()
        .collect();
    let trigger_term = matched_triggers.len() as f64 * TRIGGER_BONUS;

    let mut factor_term = 0.0;
    let mut matched_factors = Vec::new();
    for (factor, weight) in &pattern.risk_factors {
        if factor.search_terms().iter().any(|term| phrase_in(&text, term)) {
            factor_term += weight * FACTOR_SCALE;
            matched_factors.push(factor.clone());
        }
    }

    let locality_term = if document.is_hyperlocal() {
        HYPERLOCAL_BOOST
    } else {
        0.0
    };

    let recency_term = recency_boost(document.published_at, now);

    let total = keyword_term + trigger_term + factor_term + locality_term + recency_term;

    RiskScoreResult {
        score: total.min(1.0),
        matched_keywords,
        matched_triggers,
        matched_factors,
    }
}

/// Recency boost by whole days of age: 0.1 up to 7 days, 0.05 up to 30.
pub fn recency_boost(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(published) = published_at else {
        return 0.0;
    };
    let days_old = (now - published).num_days();
    if days_old <= RECENT_WEEK_DAYS {
        RECENT_WEEK_BOOST
    } else if days_old <= RECENT_MONTH_DAYS {
        RECENT_MONTH_BOOST
    } else {
        0.0
    }
}

/// Map a score to the highest level whose cutoff it reaches:
/// `>= high` critical, `>= medium` high, `>= low` medium, else low.
pub fn determine_level(score: f64, thresholds: &RiskThresholds) -> RiskLevel {
    if score >= thresholds.high {
        RiskLevel::Critical
    } else if score >= thresholds.medium {
        RiskLevel::High
    } else if score >= thresholds.low {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Case-insensitive substring match. `haystack` must already be lowercase.
/// Blank phrases never match.
fn phrase_in(haystack: &str, phrase: &str) -> bool {
    let needle = phrase.trim().to_lowercase();
    !needle.is_empty() && haystack.contains(&needle)
}
