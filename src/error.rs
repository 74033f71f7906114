//! Error types for the analytics core

use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur while ingesting or aggregating wellness data
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Completion dated {date} precedes last recorded day {last}")]
    OutOfOrderEvent { date: NaiveDate, last: NaiveDate },

    #[error("Concurrent update lost on {entity}: {detail}")]
    ConcurrencyConflict { entity: &'static str, detail: String },

    #[error("Missing or malformed score input: {0}")]
    MissingScoreInput(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Date parse error: {0}")]
    DateParseError(String),
}
