//! Core types for the wellness analytics engine
//!
//! This module defines the data that flows through the engine: per-day risk
//! records coming in from the quiz scorer, the persistent episode and streak
//! documents the engine owns, and the read-side views served to dashboards.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Identifier for a tracked user
pub type UserId = Uuid;

/// Overall risk band derived from the 0-100 overall score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Moderate => "MODERATE",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }

    /// High and critical days count toward sustained-risk alerts
    pub fn is_elevated(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

/// Per-category quiz dimension tracked by the episode detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Depression,
    Anxiety,
    Stress,
    Sleep,
}

impl RiskCategory {
    pub const ALL: [RiskCategory; 4] = [
        RiskCategory::Depression,
        RiskCategory::Anxiety,
        RiskCategory::Stress,
        RiskCategory::Sleep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Depression => "depression",
            RiskCategory::Anxiety => "anxiety",
            RiskCategory::Stress => "stress",
            RiskCategory::Sleep => "sleep",
        }
    }

    /// Episode stream this category's scores feed
    pub fn episode_type(&self) -> EpisodeType {
        match self {
            RiskCategory::Depression => EpisodeType::Depression,
            RiskCategory::Anxiety => EpisodeType::Anxiety,
            RiskCategory::Stress => EpisodeType::Stress,
            RiskCategory::Sleep => EpisodeType::SleepIssues,
        }
    }
}

/// Episode classification, one state machine per (user, type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeType {
    Depression,
    Anxiety,
    Stress,
    SleepIssues,
    /// Driven by the overall score rather than a single category
    General,
}

impl EpisodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeType::Depression => "depression",
            EpisodeType::Anxiety => "anxiety",
            EpisodeType::Stress => "stress",
            EpisodeType::SleepIssues => "sleep_issues",
            EpisodeType::General => "general",
        }
    }
}

/// Per-category scores (0-100). A missing category means the user skipped
/// that quiz; the rest of the pipeline still proceeds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CategoryScores {
    pub depression: Option<f64>,
    pub anxiety: Option<f64>,
    pub stress: Option<f64>,
    pub sleep: Option<f64>,
}

impl CategoryScores {
    pub fn get(&self, category: RiskCategory) -> Option<f64> {
        match category {
            RiskCategory::Depression => self.depression,
            RiskCategory::Anxiety => self.anxiety,
            RiskCategory::Stress => self.stress,
            RiskCategory::Sleep => self.sleep,
        }
    }
}

/// One risk measurement per user per calendar day.
///
/// Immutable once written for a given date; a same-day resubmission replaces
/// it wholesale (last-write-wins on that date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRiskRecord {
    pub user: UserId,
    /// Calendar day key, UTC day boundary
    pub date: NaiveDate,
    /// Overall risk score, 0-100
    pub overall_score: f64,
    /// Band derived from the overall score via fixed cut points
    pub level: RiskLevel,
    pub categories: CategoryScores,
    /// Contributing-factor labels, strongest first
    pub top_factors: Vec<String>,
    pub recorded_at: chrono::DateTime<Utc>,
}

/// One dated point inside an episode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyScore {
    pub date: NaiveDate,
    pub score: f64,
}

/// A persisted run of sustained elevated risk in one category for one user.
///
/// At most one episode per (user, episode_type) may be ongoing at any time.
/// Episodes are never deleted; closing sets `end_date` and freezes the stats
/// over the span up to that date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: Uuid,
    pub user: UserId,
    pub episode_type: EpisodeType,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_ongoing: bool,
    pub duration_days: i64,
    pub peak_score: f64,
    pub average_score: f64,
    pub lowest_score: f64,
    /// Factor labels present on at least half of the episode's days,
    /// recomputed when the episode closes
    pub triggers: Vec<String>,
    /// Ordered day-by-day scores spanning the episode
    pub daily_scores: Vec<DailyScore>,
}

impl Episode {
    /// Latest day whose score met the continue threshold
    pub fn last_qualifying_date(&self, continue_threshold: f64) -> Option<NaiveDate> {
        self.daily_scores
            .iter()
            .filter(|p| p.score >= continue_threshold)
            .map(|p| p.date)
            .max()
    }

    /// Latest day with any recorded score
    pub fn last_observed_date(&self) -> Option<NaiveDate> {
        self.daily_scores.iter().map(|p| p.date).max()
    }

    /// Recompute peak/average/lowest/duration over points up to `through`
    pub(crate) fn recompute_stats(&mut self, through: NaiveDate) {
        let span: Vec<f64> = self
            .daily_scores
            .iter()
            .filter(|p| p.date <= through)
            .map(|p| p.score)
            .collect();
        if span.is_empty() {
            return;
        }
        self.peak_score = span.iter().cloned().fold(f64::MIN, f64::max);
        self.lowest_score = span.iter().cloned().fold(f64::MAX, f64::min);
        self.average_score = span.iter().sum::<f64>() / span.len() as f64;
        self.duration_days = (through - self.start_date).num_days() + 1;
    }
}

/// A recorded streak achievement, append-only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakMilestone {
    pub milestone: u32,
    pub achieved_date: NaiveDate,
}

/// Per-user daily-engagement streak document, one per user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Streak {
    pub user: UserId,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_quiz_date: Option<NaiveDate>,
    pub total_quizzes_completed: u64,
    /// First missed day of the most recent break
    pub streak_break_date: Option<NaiveDate>,
    pub milestones: Vec<StreakMilestone>,
}

impl Streak {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            current_streak: 0,
            longest_streak: 0,
            last_quiz_date: None,
            total_quizzes_completed: 0,
            streak_break_date: None,
            milestones: Vec::new(),
        }
    }

    pub fn has_milestone(&self, milestone: u32) -> bool {
        self.milestones.iter().any(|m| m.milestone == milestone)
    }
}

/// Direction of risk movement between compared days.
///
/// Lower scores mean lower risk, so a falling score reads as improving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Steady,
    Declining,
    Unknown,
}

/// Daily dashboard view built from the latest record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyInsights {
    pub date: Option<NaiveDate>,
    pub score: Option<f64>,
    pub level: Option<RiskLevel>,
    pub trend: Trend,
    pub top_factors: Vec<String>,
    pub recommendations: Vec<String>,
}

/// One chart row: a calendar day with whatever was recorded for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayBreakdown {
    pub date: NaiveDate,
    pub score: Option<f64>,
    pub level: Option<RiskLevel>,
    pub categories: CategoryScores,
}

/// Pattern alert raised by the weekly aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PatternAlert {
    /// Scores are climbing faster than the configured velocity
    RapidIncrease { message: String },
    /// Three or more high/critical days inside the window
    SustainedHighRisk { message: String },
}

/// Shared summary for weekly and monthly windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSummary {
    pub avg_score: Option<f64>,
    pub trend: Trend,
    /// Percentage of window days with a recorded measurement, 0-100
    pub consistency: u32,
    pub days_tracked: u32,
    /// Score change per tracked day across the window, first vs last
    pub velocity: Option<f64>,
}

/// Weekly dashboard view: 7-day window ending at the as-of date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyInsights {
    pub summary: WindowSummary,
    pub chart_data: Vec<DayBreakdown>,
    pub alerts: Vec<PatternAlert>,
}

/// One 7-day bucket of the monthly overview bar chart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyBucket {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub avg_score: Option<f64>,
    pub days_tracked: u32,
}

/// Monthly dashboard view: 30-day window plus weekly buckets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyInsights {
    pub summary: WindowSummary,
    pub chart_data: Vec<DayBreakdown>,
    pub weekly_overview: Vec<WeeklyBucket>,
}

/// One leaderboard row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user: UserId,
    pub streak: u32,
    pub last_quiz_date: Option<NaiveDate>,
}

/// Which streak counter the leaderboard ranks by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardTimeframe {
    /// Rank by current streak
    Current,
    /// Rank by longest streak ever
    All,
}

/// One calendar cell in the streak-stats view
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalendarDay {
    pub completed: bool,
    pub score: Option<f64>,
}

/// Streak info plus windowed consistency and a day-by-day calendar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakStats {
    pub streak: Streak,
    pub window_days: u32,
    pub days_tracked: u32,
    /// Percentage of window days with a recorded measurement, 0-100
    pub consistency: u32,
    pub calendar: BTreeMap<NaiveDate, CalendarDay>,
}

/// Episode state-machine outcome reported back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "transition")]
pub enum EpisodeTransition {
    Opened {
        episode_type: EpisodeType,
        start_date: NaiveDate,
    },
    Extended {
        episode_type: EpisodeType,
        duration_days: i64,
    },
    Closed {
        episode_type: EpisodeType,
        end_date: NaiveDate,
    },
    /// A silent gap closed the previous episode and the new score
    /// immediately opened another
    ClosedAndOpened {
        episode_type: EpisodeType,
        end_date: NaiveDate,
        start_date: NaiveDate,
    },
}

/// Result of ingesting one daily submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub record: DailyRiskRecord,
    /// True when a same-day resubmission replaced an earlier record
    pub replaced_existing: bool,
    pub streak: Streak,
    pub new_milestones: Vec<StreakMilestone>,
    pub episode_transitions: Vec<EpisodeTransition>,
    /// Categories skipped because their score was absent or malformed
    pub skipped_categories: Vec<RiskCategory>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn risk_level_serializes_uppercase() {
        let json = serde_json::to_string(&RiskLevel::Moderate).unwrap();
        assert_eq!(json, "\"MODERATE\"");
    }

    #[test]
    fn episode_type_serializes_snake_case() {
        let json = serde_json::to_string(&EpisodeType::SleepIssues).unwrap();
        assert_eq!(json, "\"sleep_issues\"");
    }

    #[test]
    fn category_scores_lookup() {
        let scores = CategoryScores {
            anxiety: Some(62.0),
            ..Default::default()
        };
        assert_eq!(scores.get(RiskCategory::Anxiety), Some(62.0));
        assert_eq!(scores.get(RiskCategory::Sleep), None);
    }

    #[test]
    fn episode_stats_truncate_to_span() {
        let mut episode = Episode {
            id: Uuid::new_v4(),
            user: Uuid::new_v4(),
            episode_type: EpisodeType::Anxiety,
            start_date: date(2026, 1, 1),
            end_date: None,
            is_ongoing: true,
            duration_days: 0,
            peak_score: 0.0,
            average_score: 0.0,
            lowest_score: 100.0,
            triggers: vec![],
            daily_scores: vec![
                DailyScore { date: date(2026, 1, 1), score: 65.0 },
                DailyScore { date: date(2026, 1, 2), score: 80.0 },
                DailyScore { date: date(2026, 1, 3), score: 30.0 },
            ],
        };

        episode.recompute_stats(date(2026, 1, 2));
        assert_eq!(episode.peak_score, 80.0);
        assert_eq!(episode.lowest_score, 65.0);
        assert_eq!(episode.duration_days, 2);
        assert!((episode.average_score - 72.5).abs() < 1e-9);
    }

    #[test]
    fn last_qualifying_date_skips_sub_threshold_days() {
        let episode = Episode {
            id: Uuid::new_v4(),
            user: Uuid::new_v4(),
            episode_type: EpisodeType::Stress,
            start_date: date(2026, 3, 1),
            end_date: None,
            is_ongoing: true,
            duration_days: 3,
            peak_score: 70.0,
            average_score: 55.0,
            lowest_score: 40.0,
            triggers: vec![],
            daily_scores: vec![
                DailyScore { date: date(2026, 3, 1), score: 70.0 },
                DailyScore { date: date(2026, 3, 2), score: 55.0 },
                DailyScore { date: date(2026, 3, 3), score: 40.0 },
            ],
        };
        assert_eq!(episode.last_qualifying_date(50.0), Some(date(2026, 3, 2)));
    }
}
