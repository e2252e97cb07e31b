use tracing::warn;

use riskwatch_common::{Document, RiskPattern, SummaryGenerator};

/// Deterministic summary used when no generator is configured or it fails.
/// Identical inputs always produce identical text, which keeps the
/// (document, summary) dedupe key stable across reruns.
pub fn fallback_summary(pattern: &RiskPattern, score: f64) -> String {
    format!(
        "{} risk detected by pattern {} ({}) in sector {}, score {:.2}",
        pattern.risk_level, pattern.name, pattern.pattern_type, pattern.sector, score
    )
}

/// Ask the generator for a summary; any failure (or a blank answer) falls back
/// to the template.
pub async fn summarize_or_fallback(
    generator: Option<&dyn SummaryGenerator>,
    document: &Document,
    pattern: &RiskPattern,
    score: f64,
) -> String {
    let Some(generator) = generator else {
        return fallback_summary(pattern, score);
    };

    match generator.summarize(document, pattern, score).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            warn!(
                document_id = %document.id,
                pattern = pattern.name.as_str(),
                "Summary generator returned empty text, using fallback"
            );
            fallback_summary(pattern, score)
        }
        Err(e) => {
            warn!(
                document_id = %document.id,
                pattern = pattern.name.as_str(),
                error = %e,
                "Summary generation failed, using fallback"
            );
            fallback_summary(pattern, score)
        }
    }
}
