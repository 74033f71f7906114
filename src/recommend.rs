//! Recommendation rules
//!
//! A small static rule table keyed by risk level and contributing-factor
//! labels. This is deliberately not a content engine; it selects from fixed
//! guidance strings, with a positive default when nothing matches.

use crate::types::RiskLevel;

/// Factor-keyed guidance. Labels are matched case-insensitively on a
/// keyword so "Elevated depression" and "depression risk" both hit.
const FACTOR_RULES: &[(&str, &str)] = &[
    (
        "depression",
        "Consider cognitive behavioral therapy (CBT) or counseling.",
    ),
    (
        "anxiety",
        "Practice mindfulness and relaxation techniques.",
    ),
    (
        "stress",
        "Engage in regular physical activity and stress management.",
    ),
    (
        "sleep",
        "Maintain a consistent sleep schedule and create a restful environment.",
    ),
];

const CRITICAL_NOTICE: &str =
    "Your recent scores are very high. Please consider reaching out to a mental health professional or a crisis line.";

const HIGH_NOTICE: &str =
    "Your recent scores are elevated. Checking in with someone you trust can help.";

const DEFAULT_MESSAGE: &str = "You're doing well. Keep checking in every day.";

/// Select recommendations for a risk level and its ordered factor labels.
///
/// The first (dominant) factor decides nothing special beyond ordering:
/// factor rules fire in the order the labels arrive, so the dominant
/// factor's guidance leads. An empty result falls back to a positive
/// default message.
pub fn recommendations(level: RiskLevel, top_factors: &[String]) -> Vec<String> {
    let mut result = Vec::new();

    match level {
        RiskLevel::Critical => result.push(CRITICAL_NOTICE.to_string()),
        RiskLevel::High => result.push(HIGH_NOTICE.to_string()),
        _ => {}
    }

    for factor in top_factors {
        let lowered = factor.to_lowercase();
        for (keyword, text) in FACTOR_RULES {
            if lowered.contains(keyword) && !result.iter().any(|r| r == text) {
                result.push((*text).to_string());
            }
        }
    }

    if result.is_empty() {
        result.push(DEFAULT_MESSAGE.to_string());
    }
    result
}
