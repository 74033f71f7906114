//! Daily record ingestion
//!
//! Single write entry point for the engine. Each completed quiz produces one
//! submission; ingestion normalizes the day key, writes the daily record
//! (same-day resubmission replaces, last-write-wins), and drives the streak
//! tracker and the per-category episode detectors. A category with an absent
//! or malformed score is skipped and logged while the rest proceed.

use crate::config::AnalyticsConfig;
use crate::episode::EpisodeDetector;
use crate::error::AnalyticsError;
use crate::store::StateStore;
use crate::streak::StreakTracker;
use crate::types::{
    CategoryScores, DailyRiskRecord, EpisodeType, IngestOutcome, RiskCategory, UserId,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Normalize a UTC timestamp to its calendar-day key.
///
/// Day boundaries are fixed at UTC midnight everywhere in this crate.
pub fn utc_day_key(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}

/// Parse a `YYYY-MM-DD` day key
pub fn parse_day(s: &str) -> Result<NaiveDate, AnalyticsError> {
    s.parse::<NaiveDate>()
        .map_err(|e| AnalyticsError::DateParseError(format!("{s}: {e}")))
}

/// One scored quiz submission from the scoring collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSubmission {
    pub user: UserId,
    pub date: NaiveDate,
    /// Overall risk score, 0-100
    pub overall_score: f64,
    #[serde(default)]
    pub categories: CategoryScores,
    #[serde(default)]
    pub top_factors: Vec<String>,
}

/// Write-side coordinator for daily submissions
pub struct RecordIngestor {
    store: Arc<dyn StateStore>,
    config: AnalyticsConfig,
    streaks: StreakTracker,
    episodes: EpisodeDetector,
}

impl RecordIngestor {
    pub fn new(store: Arc<dyn StateStore>, config: AnalyticsConfig) -> Self {
        Self {
            streaks: StreakTracker::new(store.clone(), config.clone()),
            episodes: EpisodeDetector::new(store.clone(), config.clone()),
            store,
            config,
        }
    }

    /// Ingest one submission.
    ///
    /// A backdated submission is rejected with `OutOfOrderEvent` before any
    /// state is written. A malformed overall score rejects the submission;
    /// a malformed category score only skips that category's episode stream.
    pub fn ingest(&self, submission: QuizSubmission) -> Result<IngestOutcome, AnalyticsError> {
        let QuizSubmission {
            user,
            date,
            overall_score,
            categories,
            top_factors,
        } = submission;

        if !self.config.score_in_range(overall_score) {
            return Err(AnalyticsError::MissingScoreInput(format!(
                "overall score {overall_score} outside 0-100"
            )));
        }

        // The streak tracker validates event ordering, so it runs first and
        // rejects backdated submissions before anything else is written.
        let (streak, new_milestones) = self.streaks.record_completion(user, date)?;

        let record = DailyRiskRecord {
            user,
            date,
            overall_score,
            level: self.config.risk_level(overall_score),
            categories,
            top_factors,
            recorded_at: Utc::now(),
        };
        let replaced_existing = self.store.put_record(record.clone())?;
        if replaced_existing {
            debug!(user = %user, %date, "same-day resubmission replaced earlier record");
        }

        let mut episode_transitions = Vec::new();
        let mut skipped_categories = Vec::new();
        for category in RiskCategory::ALL {
            match categories.get(category) {
                Some(score) if self.config.score_in_range(score) => {
                    if let Some(transition) =
                        self.episodes
                            .ingest(user, category.episode_type(), date, score)?
                    {
                        episode_transitions.push(transition);
                    }
                }
                Some(bad) => {
                    warn!(
                        user = %user,
                        category = category.as_str(),
                        score = bad,
                        "category score outside 0-100, skipping its episode stream"
                    );
                    skipped_categories.push(category);
                }
                None => {
                    debug!(user = %user, category = category.as_str(), "no category score");
                    skipped_categories.push(category);
                }
            }
        }

        // The overall score feeds the general episode stream
        if let Some(transition) =
            self.episodes
                .ingest(user, EpisodeType::General, date, overall_score)?
        {
            episode_transitions.push(transition);
        }

        Ok(IngestOutcome {
            record,
            replaced_existing,
            streak,
            new_milestones,
            episode_transitions,
            skipped_categories,
        })
    }
}
