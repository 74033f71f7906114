//! Engine facade
//!
//! Wires the store, the two write-side state machines, and the read-side
//! aggregator into one object exposing the full dashboard contract. Use this
//! when you want the whole pipeline; the individual components remain public
//! for callers that only need one of them.

use crate::config::AnalyticsConfig;
use crate::episode::EpisodeDetector;
use crate::error::AnalyticsError;
use crate::ingest::{QuizSubmission, RecordIngestor};
use crate::insights::InsightsAggregator;
use crate::store::{MemoryStore, StateStore};
use crate::streak::StreakTracker;
use crate::types::{
    DailyInsights, Episode, IngestOutcome, LeaderboardEntry, LeaderboardTimeframe,
    MonthlyInsights, Streak, StreakStats, UserId, WeeklyInsights,
};
use chrono::NaiveDate;
use std::sync::Arc;

/// The temporal wellness analytics engine
pub struct PulseEngine {
    store: Arc<dyn StateStore>,
    ingestor: RecordIngestor,
    streaks: StreakTracker,
    episodes: EpisodeDetector,
    insights: InsightsAggregator,
}

impl Default for PulseEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseEngine {
    /// Engine over a fresh in-memory store with default thresholds
    pub fn new() -> Self {
        Self::with_config(AnalyticsConfig::default())
    }

    pub fn with_config(config: AnalyticsConfig) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), config)
    }

    pub fn with_store(store: Arc<dyn StateStore>, config: AnalyticsConfig) -> Self {
        Self {
            ingestor: RecordIngestor::new(store.clone(), config.clone()),
            streaks: StreakTracker::new(store.clone(), config.clone()),
            episodes: EpisodeDetector::new(store.clone(), config.clone()),
            insights: InsightsAggregator::new(store.clone(), config),
            store,
        }
    }

    /// Record one scored quiz submission.
    ///
    /// Drives the streak tracker and episode detectors, then drops any
    /// cached views for the user.
    pub fn submit(&self, submission: QuizSubmission) -> Result<IngestOutcome, AnalyticsError> {
        let user = submission.user;
        let outcome = self.ingestor.ingest(submission)?;
        self.insights.invalidate(user);
        Ok(outcome)
    }

    pub fn streak_info(&self, user: UserId) -> Streak {
        self.streaks.streak_info(user)
    }

    pub fn streak_stats(&self, user: UserId, window_days: u32, as_of: NaiveDate) -> StreakStats {
        self.streaks.streak_stats(user, window_days, as_of)
    }

    /// True until the user has recorded a submission for `date`.
    pub fn quiz_eligibility(&self, user: UserId, date: NaiveDate) -> bool {
        self.streaks.eligible(user, date)
    }

    pub fn leaderboard(
        &self,
        limit: usize,
        timeframe: LeaderboardTimeframe,
    ) -> Vec<LeaderboardEntry> {
        self.streaks.leaderboard(limit, timeframe)
    }

    pub fn daily_insights(&self, user: UserId, as_of: NaiveDate) -> DailyInsights {
        self.insights.daily(user, as_of)
    }

    pub fn weekly_insights(&self, user: UserId, as_of: NaiveDate) -> WeeklyInsights {
        self.insights.weekly(user, as_of)
    }

    pub fn monthly_insights(&self, user: UserId, as_of: NaiveDate) -> MonthlyInsights {
        self.insights.monthly(user, as_of)
    }

    pub fn ongoing_episodes(&self, user: UserId) -> Vec<Episode> {
        self.episodes.ongoing(user)
    }

    pub fn episode_history(&self, user: UserId) -> Vec<Episode> {
        self.episodes.history(user)
    }

    /// Serialize the full engine state to JSON
    pub fn export_state(&self) -> Result<String, AnalyticsError> {
        self.store.export_json()
    }

    /// Restore engine state from a JSON snapshot
    pub fn import_state(&self, json: &str) -> Result<(), AnalyticsError> {
        self.store.import_json(json)
    }
}
