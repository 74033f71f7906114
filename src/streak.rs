//! Daily-engagement streak tracking
//!
//! One document per user tracks consecutive completion days, the longest run
//! ever, lifetime totals, and the milestone ladder. The transition itself is
//! a pure function over the prior document so every branch of the gap
//! arithmetic is testable without storage.

use crate::config::AnalyticsConfig;
use crate::error::AnalyticsError;
use crate::store::StateStore;
use crate::types::{
    CalendarDay, LeaderboardEntry, LeaderboardTimeframe, Streak, StreakMilestone, StreakStats,
    UserId,
};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Outcome of advancing a streak document by one completion event
#[derive(Debug, Clone)]
pub(crate) struct StreakAdvance {
    pub streak: Streak,
    pub new_milestones: Vec<StreakMilestone>,
    /// False on the idempotent same-day path; nothing needs writing
    pub changed: bool,
}

/// Advance a streak document for a completion on `date`.
///
/// Gap semantics, in whole UTC calendar days against the last recorded day:
/// absent -> start at 1; 0 -> idempotent no-op; 1 -> extend; >1 -> break and
/// restart at 1 with the break dated to the first missed day; <0 -> rejected.
pub(crate) fn advance(
    current: Option<Streak>,
    user: UserId,
    date: NaiveDate,
    ladder: &[u32],
) -> Result<StreakAdvance, AnalyticsError> {
    let mut streak = current.unwrap_or_else(|| Streak::new(user));

    match streak.last_quiz_date {
        None => {
            streak.current_streak = 1;
        }
        Some(last) => {
            let gap = (date - last).num_days();
            if gap < 0 {
                return Err(AnalyticsError::OutOfOrderEvent { date, last });
            }
            if gap == 0 {
                // Same day already recorded; totals must not double-increment
                return Ok(StreakAdvance {
                    streak,
                    new_milestones: Vec::new(),
                    changed: false,
                });
            }
            if gap == 1 {
                streak.current_streak += 1;
            } else {
                streak.streak_break_date = Some(last + Duration::days(1));
                streak.current_streak = 1;
            }
        }
    }

    streak.longest_streak = streak.longest_streak.max(streak.current_streak);
    streak.total_quizzes_completed += 1;
    streak.last_quiz_date = Some(date);

    let mut new_milestones = Vec::new();
    if ladder.contains(&streak.current_streak) && !streak.has_milestone(streak.current_streak) {
        let milestone = StreakMilestone {
            milestone: streak.current_streak,
            achieved_date: date,
        };
        streak.milestones.push(milestone);
        new_milestones.push(milestone);
    }

    Ok(StreakAdvance {
        streak,
        new_milestones,
        changed: true,
    })
}

/// Streak state machine over the document store
pub struct StreakTracker {
    store: Arc<dyn StateStore>,
    config: AnalyticsConfig,
}

impl StreakTracker {
    pub fn new(store: Arc<dyn StateStore>, config: AnalyticsConfig) -> Self {
        Self { store, config }
    }

    /// Record a quiz completion and return the updated streak snapshot plus
    /// any milestones achieved by this event.
    ///
    /// Applied under an optimistic guard: on a version conflict the document
    /// is reread and the write retried once, then the conflict surfaces.
    pub fn record_completion(
        &self,
        user: UserId,
        date: NaiveDate,
    ) -> Result<(Streak, Vec<StreakMilestone>), AnalyticsError> {
        let mut attempts = 0;
        loop {
            let existing = self.store.streak(user);
            let expected = existing.as_ref().map(|v| v.version);
            let advance = advance(
                existing.map(|v| v.doc),
                user,
                date,
                &self.config.milestone_ladder,
            )?;

            if !advance.changed {
                return Ok((advance.streak, Vec::new()));
            }

            match self.store.put_streak(expected, advance.streak) {
                Ok(written) => return Ok((written.doc, advance.new_milestones)),
                Err(AnalyticsError::ConcurrencyConflict { .. }) if attempts == 0 => {
                    debug!(user = %user, "streak write conflicted, rereading once");
                    attempts += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Current streak snapshot; users with no completions get a zeroed one
    pub fn streak_info(&self, user: UserId) -> Streak {
        self.store
            .streak(user)
            .map(|v| v.doc)
            .unwrap_or_else(|| Streak::new(user))
    }

    /// Whether the user can still record a completion for `date`.
    ///
    /// False only when that day is already recorded; the submission itself
    /// would be accepted either way (same-day resubmission replaces).
    pub fn eligible(&self, user: UserId, date: NaiveDate) -> bool {
        self.streak_info(user).last_quiz_date != Some(date)
    }

    /// Streak info plus windowed consistency and a completion calendar.
    ///
    /// Consistency comes from daily-record presence over the window, not
    /// from the streak counter itself.
    pub fn streak_stats(&self, user: UserId, window_days: u32, as_of: NaiveDate) -> StreakStats {
        let window_days = window_days.max(1);
        let from = as_of - Duration::days(window_days as i64 - 1);
        let records = self.store.records_between(user, from, as_of);

        let mut calendar: BTreeMap<NaiveDate, CalendarDay> = BTreeMap::new();
        let mut day = from;
        while day <= as_of {
            calendar.insert(
                day,
                CalendarDay {
                    completed: false,
                    score: None,
                },
            );
            day += Duration::days(1);
        }
        for record in &records {
            calendar.insert(
                record.date,
                CalendarDay {
                    completed: true,
                    score: Some(record.overall_score),
                },
            );
        }

        let days_tracked = records.len() as u32;
        let consistency =
            ((days_tracked as f64 / window_days as f64) * 100.0).round() as u32;

        StreakStats {
            streak: self.streak_info(user),
            window_days,
            days_tracked,
            consistency: consistency.min(100),
            calendar,
        }
    }

    /// Top streaks, ranked by the requested counter with ties broken by the
    /// earliest last completion day.
    pub fn leaderboard(
        &self,
        limit: usize,
        timeframe: LeaderboardTimeframe,
    ) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self
            .store
            .all_streaks()
            .into_iter()
            .map(|s| LeaderboardEntry {
                user: s.user,
                streak: match timeframe {
                    LeaderboardTimeframe::Current => s.current_streak,
                    LeaderboardTimeframe::All => s.longest_streak,
                },
                last_quiz_date: s.last_quiz_date,
            })
            .collect();

        entries.sort_by(|a, b| {
            b.streak.cmp(&a.streak).then_with(|| {
                let a_date = a.last_quiz_date.unwrap_or(NaiveDate::MAX);
                let b_date = b.last_quiz_date.unwrap_or(NaiveDate::MAX);
                a_date.cmp(&b_date)
            })
        });
        entries.truncate(limit);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{CategoryScores, DailyRiskRecord, RiskLevel};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tracker() -> (StreakTracker, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            StreakTracker::new(store.clone(), AnalyticsConfig::default()),
            store,
        )
    }

    #[test]
    fn first_completion_starts_at_one() {
        let user = Uuid::new_v4();
        let result = advance(None, user, date(2026, 1, 1), &[3, 7]).unwrap();
        assert_eq!(result.streak.current_streak, 1);
        assert_eq!(result.streak.longest_streak, 1);
        assert_eq!(result.streak.total_quizzes_completed, 1);
        assert!(result.changed);
    }

    #[test]
    fn same_day_is_idempotent() {
        let user = Uuid::new_v4();
        let first = advance(None, user, date(2026, 1, 1), &[3]).unwrap();
        let second = advance(Some(first.streak.clone()), user, date(2026, 1, 1), &[3]).unwrap();
        assert!(!second.changed);
        assert_eq!(second.streak.total_quizzes_completed, 1);
        assert_eq!(second.streak.current_streak, first.streak.current_streak);
    }

    #[test]
    fn backdated_completion_is_rejected() {
        let user = Uuid::new_v4();
        let first = advance(None, user, date(2026, 1, 5), &[]).unwrap();
        let result = advance(Some(first.streak), user, date(2026, 1, 3), &[]);
        assert!(matches!(
            result,
            Err(AnalyticsError::OutOfOrderEvent { .. })
        ));
    }

    #[test]
    fn gap_breaks_streak_and_dates_the_break() {
        // Scenario B: Jan 1, 2, 3, then a gap, then Jan 5
        let user = Uuid::new_v4();
        let mut streak = None;
        for d in 1..=3 {
            streak = Some(advance(streak, user, date(2026, 1, d), &[3]).unwrap().streak);
        }
        let after_gap = advance(streak, user, date(2026, 1, 5), &[3]).unwrap().streak;

        assert_eq!(after_gap.current_streak, 1);
        assert_eq!(after_gap.longest_streak, 3);
        assert_eq!(after_gap.streak_break_date, Some(date(2026, 1, 4)));
        assert_eq!(after_gap.total_quizzes_completed, 4);
    }

    #[test]
    fn milestone_awarded_exactly_once() {
        // Scenario C: hitting 7 awards the milestone once, not on later days
        let user = Uuid::new_v4();
        let mut streak = None;
        let mut awarded = Vec::new();
        for d in 1..=9 {
            let result = advance(streak, user, date(2026, 1, d), &[3, 7]).unwrap();
            awarded.extend(result.new_milestones);
            streak = Some(result.streak);
        }

        let sevens: Vec<_> = awarded.iter().filter(|m| m.milestone == 7).collect();
        assert_eq!(sevens.len(), 1);
        assert_eq!(sevens[0].achieved_date, date(2026, 1, 7));
        let streak = streak.unwrap();
        assert_eq!(streak.milestones.len(), 2);
    }

    #[test]
    fn monotonicity_holds_across_breaks() {
        let user = Uuid::new_v4();
        let days = [1, 2, 3, 7, 8, 20, 21, 22, 23];
        let mut streak = None;
        for d in days {
            let result = advance(streak, user, date(2026, 1, d), &[3]).unwrap();
            let s = &result.streak;
            assert!(u64::from(s.current_streak) <= s.total_quizzes_completed);
            assert!(s.longest_streak >= s.current_streak);
            streak = Some(result.streak);
        }
    }

    #[test]
    fn record_completion_persists_through_store() {
        let (tracker, store) = tracker();
        let user = Uuid::new_v4();

        tracker.record_completion(user, date(2026, 2, 1)).unwrap();
        let (streak, _) = tracker.record_completion(user, date(2026, 2, 2)).unwrap();

        assert_eq!(streak.current_streak, 2);
        assert_eq!(store.streak(user).unwrap().version, 2);
    }

    #[test]
    fn same_day_resubmission_does_not_bump_version() {
        let (tracker, store) = tracker();
        let user = Uuid::new_v4();

        tracker.record_completion(user, date(2026, 2, 1)).unwrap();
        let (streak, milestones) = tracker.record_completion(user, date(2026, 2, 1)).unwrap();

        assert_eq!(streak.total_quizzes_completed, 1);
        assert!(milestones.is_empty());
        assert_eq!(store.streak(user).unwrap().version, 1);
    }

    #[test]
    fn eligibility_flips_after_a_completion() {
        let (tracker, _) = tracker();
        let user = Uuid::new_v4();
        let day = date(2026, 2, 1);

        assert!(tracker.eligible(user, day));
        tracker.record_completion(user, day).unwrap();
        assert!(!tracker.eligible(user, day));
        assert!(tracker.eligible(user, day + Duration::days(1)));
    }

    #[test]
    fn stats_consistency_counts_daily_records() {
        let (tracker, store) = tracker();
        let user = Uuid::new_v4();
        let as_of = date(2026, 3, 10);

        // 5 of the last 10 days have a record
        for d in [1, 3, 5, 7, 9] {
            store
                .put_record(DailyRiskRecord {
                    user,
                    date: date(2026, 3, d),
                    overall_score: 42.0,
                    level: RiskLevel::Low,
                    categories: CategoryScores::default(),
                    top_factors: vec![],
                    recorded_at: Utc::now(),
                })
                .unwrap();
        }

        let stats = tracker.streak_stats(user, 10, as_of);
        assert_eq!(stats.days_tracked, 5);
        assert_eq!(stats.consistency, 50);
        assert_eq!(stats.calendar.len(), 10);
        assert!(stats.calendar[&date(2026, 3, 3)].completed);
        assert!(!stats.calendar[&date(2026, 3, 4)].completed);
    }

    #[test]
    fn stats_with_no_records_is_well_formed() {
        let (tracker, _) = tracker();
        let stats = tracker.streak_stats(Uuid::new_v4(), 7, date(2026, 3, 10));
        assert_eq!(stats.days_tracked, 0);
        assert_eq!(stats.consistency, 0);
        assert_eq!(stats.calendar.len(), 7);
    }

    #[test]
    fn leaderboard_ranks_and_breaks_ties_by_earliest_completion() {
        let (tracker, store) = tracker();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let mut sa = Streak::new(a);
        sa.current_streak = 5;
        sa.longest_streak = 9;
        sa.last_quiz_date = Some(date(2026, 3, 2));
        let mut sb = Streak::new(b);
        sb.current_streak = 5;
        sb.longest_streak = 5;
        sb.last_quiz_date = Some(date(2026, 3, 1));
        let mut sc = Streak::new(c);
        sc.current_streak = 8;
        sc.longest_streak = 8;
        sc.last_quiz_date = Some(date(2026, 3, 3));
        for s in [sa, sb, sc] {
            store.put_streak(None, s).unwrap();
        }

        let current = tracker.leaderboard(10, LeaderboardTimeframe::Current);
        assert_eq!(
            current.iter().map(|e| e.user).collect::<Vec<_>>(),
            vec![c, b, a]
        );

        let all_time = tracker.leaderboard(2, LeaderboardTimeframe::All);
        assert_eq!(all_time.len(), 2);
        assert_eq!(all_time[0].user, a);
        assert_eq!(all_time[0].streak, 9);
    }
}
