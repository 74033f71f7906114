//! Dashboard aggregations
//!
//! Stateless read side: daily, weekly, and monthly views are recomputed on
//! demand by windowing the stored daily records, never materialized. Missing
//! days are simply absent from averages and count against consistency; a
//! user with no records gets a well-formed empty view, not an error.
//!
//! Views are cached with a short TTL keyed by (user, as-of day, window) and
//! invalidated whenever a new record is ingested for that user.

use crate::config::AnalyticsConfig;
use crate::recommend;
use crate::store::StateStore;
use crate::types::{
    DailyInsights, DailyRiskRecord, DayBreakdown, MonthlyInsights, PatternAlert, Trend, UserId,
    WeeklyBucket, WeeklyInsights, WindowSummary,
};
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration as StdDuration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WindowKind {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Clone)]
enum CachedView {
    Daily(DailyInsights),
    Weekly(WeeklyInsights),
    Monthly(MonthlyInsights),
}

/// In-process TTL cache for computed views
struct ViewCache {
    entries: RwLock<HashMap<(UserId, NaiveDate, WindowKind), (Instant, CachedView)>>,
    ttl: StdDuration,
}

impl ViewCache {
    fn new(ttl: StdDuration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn get(&self, key: &(UserId, NaiveDate, WindowKind)) -> Option<CachedView> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(key).and_then(|(stored_at, view)| {
            (stored_at.elapsed() < self.ttl).then(|| view.clone())
        })
    }

    fn put(&self, key: (UserId, NaiveDate, WindowKind), view: CachedView) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key, (Instant::now(), view));
    }

    fn invalidate_user(&self, user: UserId) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.retain(|(u, _, _), _| *u != user);
    }
}

/// Read-side aggregator over stored records and episodes
pub struct InsightsAggregator {
    store: Arc<dyn StateStore>,
    config: AnalyticsConfig,
    cache: ViewCache,
}

impl InsightsAggregator {
    pub fn new(store: Arc<dyn StateStore>, config: AnalyticsConfig) -> Self {
        let ttl = StdDuration::from_secs(config.cache_ttl_secs);
        Self {
            store,
            config,
            cache: ViewCache::new(ttl),
        }
    }

    /// Drop cached views for a user; called after every ingest
    pub fn invalidate(&self, user: UserId) {
        self.cache.invalidate_user(user);
    }

    /// Latest-record view with day-over-day trend and recommendations
    pub fn daily(&self, user: UserId, as_of: NaiveDate) -> DailyInsights {
        let key = (user, as_of, WindowKind::Daily);
        if let Some(CachedView::Daily(view)) = self.cache.get(&key) {
            return view;
        }

        let view = match self.store.latest_record(user, as_of) {
            None => DailyInsights {
                date: None,
                score: None,
                level: None,
                trend: Trend::Unknown,
                top_factors: Vec::new(),
                recommendations: Vec::new(),
            },
            Some(latest) => {
                let previous = self.store.record(user, latest.date - Duration::days(1));
                let trend = match previous {
                    Some(prev) => self.trend_between(prev.overall_score, latest.overall_score),
                    None => Trend::Unknown,
                };
                DailyInsights {
                    date: Some(latest.date),
                    score: Some(latest.overall_score),
                    level: Some(latest.level),
                    trend,
                    recommendations: recommend::recommendations(latest.level, &latest.top_factors),
                    top_factors: latest.top_factors,
                }
            }
        };

        self.cache.put(key, CachedView::Daily(view.clone()));
        view
    }

    /// 7-day window: summary, per-day chart rows, pattern alerts
    pub fn weekly(&self, user: UserId, as_of: NaiveDate) -> WeeklyInsights {
        let key = (user, as_of, WindowKind::Weekly);
        if let Some(CachedView::Weekly(view)) = self.cache.get(&key) {
            return view;
        }

        let from = as_of - Duration::days(6);
        let records = self.store.records_between(user, from, as_of);
        let summary = self.summarize(7, &records);
        let chart_data = self.chart_rows(from, as_of, &records);
        let alerts = self.pattern_alerts(&summary, &records);

        let view = WeeklyInsights {
            summary,
            chart_data,
            alerts,
        };
        self.cache.put(key, CachedView::Weekly(view.clone()));
        view
    }

    /// 30-day window: summary, chart rows, and 7-day bucket overview
    pub fn monthly(&self, user: UserId, as_of: NaiveDate) -> MonthlyInsights {
        let key = (user, as_of, WindowKind::Monthly);
        if let Some(CachedView::Monthly(view)) = self.cache.get(&key) {
            return view;
        }

        let from = as_of - Duration::days(29);
        let records = self.store.records_between(user, from, as_of);
        let summary = self.summarize(30, &records);
        let chart_data = self.chart_rows(from, as_of, &records);
        let weekly_overview = self.weekly_buckets(from, as_of, &records);

        let view = MonthlyInsights {
            summary,
            chart_data,
            weekly_overview,
        };
        self.cache.put(key, CachedView::Monthly(view.clone()));
        view
    }

    fn trend_between(&self, earlier: f64, later: f64) -> Trend {
        let tolerance = self.config.trend_tolerance;
        if later < earlier - tolerance {
            Trend::Improving
        } else if later > earlier + tolerance {
            Trend::Declining
        } else {
            Trend::Steady
        }
    }

    /// Window summary over the records present; `records` arrive date-sorted
    fn summarize(&self, window_days: u32, records: &[DailyRiskRecord]) -> WindowSummary {
        let days_tracked = records.len() as u32;
        let avg_score = (days_tracked > 0).then(|| {
            records.iter().map(|r| r.overall_score).sum::<f64>() / days_tracked as f64
        });
        let consistency = ((days_tracked as f64 / window_days as f64) * 100.0).round() as u32;

        let (trend, velocity) = match (records.first(), records.last()) {
            (Some(first), Some(last)) if days_tracked >= 2 => (
                self.trend_between(first.overall_score, last.overall_score),
                Some((last.overall_score - first.overall_score) / days_tracked as f64),
            ),
            (Some(_), Some(_)) => (Trend::Steady, Some(0.0)),
            _ => (Trend::Unknown, None),
        };

        WindowSummary {
            avg_score,
            trend,
            consistency: consistency.min(100),
            days_tracked,
            velocity,
        }
    }

    /// One chart row per calendar day in the window, recorded or not
    fn chart_rows(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        records: &[DailyRiskRecord],
    ) -> Vec<DayBreakdown> {
        let by_date: HashMap<NaiveDate, &DailyRiskRecord> =
            records.iter().map(|r| (r.date, r)).collect();

        let mut rows = Vec::new();
        let mut day = from;
        while day <= to {
            rows.push(match by_date.get(&day) {
                Some(record) => DayBreakdown {
                    date: day,
                    score: Some(record.overall_score),
                    level: Some(record.level),
                    categories: record.categories,
                },
                None => DayBreakdown {
                    date: day,
                    score: None,
                    level: None,
                    categories: Default::default(),
                },
            });
            day += Duration::days(1);
        }
        rows
    }

    fn pattern_alerts(
        &self,
        summary: &WindowSummary,
        records: &[DailyRiskRecord],
    ) -> Vec<PatternAlert> {
        let mut alerts = Vec::new();

        if let Some(velocity) = summary.velocity {
            if velocity > self.config.velocity_alert {
                alerts.push(PatternAlert::RapidIncrease {
                    message: format!(
                        "Risk score climbing {velocity:.1} points per tracked day this week"
                    ),
                });
            }
        }

        let elevated_days = records.iter().filter(|r| r.level.is_elevated()).count() as u32;
        if elevated_days >= self.config.high_risk_days_alert {
            alerts.push(PatternAlert::SustainedHighRisk {
                message: format!("{elevated_days} high-risk days in the last week"),
            });
        }

        alerts
    }

    /// Split the window into 7-day buckets from the start; the final bucket
    /// may be short.
    fn weekly_buckets(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        records: &[DailyRiskRecord],
    ) -> Vec<WeeklyBucket> {
        let mut buckets = Vec::new();
        let mut start = from;
        while start <= to {
            let end = (start + Duration::days(6)).min(to);
            let in_bucket: Vec<&DailyRiskRecord> = records
                .iter()
                .filter(|r| r.date >= start && r.date <= end)
                .collect();
            let days_tracked = in_bucket.len() as u32;
            let avg_score = (days_tracked > 0).then(|| {
                in_bucket.iter().map(|r| r.overall_score).sum::<f64>() / days_tracked as f64
            });
            buckets.push(WeeklyBucket {
                start,
                end,
                avg_score,
                days_tracked,
            });
            start = end + Duration::days(1);
        }
        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{CategoryScores, RiskLevel};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn aggregator() -> (InsightsAggregator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            InsightsAggregator::new(store.clone(), AnalyticsConfig::default()),
            store,
        )
    }

    fn put_record(store: &MemoryStore, user: UserId, day: NaiveDate, score: f64) {
        let config = AnalyticsConfig::default();
        store
            .put_record(DailyRiskRecord {
                user,
                date: day,
                overall_score: score,
                level: config.risk_level(score),
                categories: CategoryScores {
                    anxiety: Some(score),
                    ..Default::default()
                },
                top_factors: vec!["High anxiety".to_string()],
                recorded_at: Utc::now(),
            })
            .unwrap();
    }

    #[test]
    fn daily_with_no_records_is_well_formed() {
        let (aggregator, _) = aggregator();
        let view = aggregator.daily(Uuid::new_v4(), date(2026, 5, 1));
        assert_eq!(view.score, None);
        assert_eq!(view.level, None);
        assert_eq!(view.trend, Trend::Unknown);
        assert!(view.recommendations.is_empty());
    }

    #[test]
    fn daily_trend_compares_previous_day_within_tolerance() {
        let (aggregator, store) = aggregator();
        let user = Uuid::new_v4();
        put_record(&store, user, date(2026, 5, 1), 60.0);
        put_record(&store, user, date(2026, 5, 2), 48.0);

        let view = aggregator.daily(user, date(2026, 5, 2));
        assert_eq!(view.trend, Trend::Improving);
        assert_eq!(view.score, Some(48.0));

        // A small move stays steady
        let user2 = Uuid::new_v4();
        put_record(&store, user2, date(2026, 5, 1), 50.0);
        put_record(&store, user2, date(2026, 5, 2), 53.0);
        assert_eq!(aggregator.daily(user2, date(2026, 5, 2)).trend, Trend::Steady);
    }

    #[test]
    fn daily_includes_recommendations_for_factors() {
        let (aggregator, store) = aggregator();
        let user = Uuid::new_v4();
        put_record(&store, user, date(2026, 5, 2), 75.0);

        let view = aggregator.daily(user, date(2026, 5, 2));
        assert_eq!(view.level, Some(RiskLevel::High));
        assert!(view
            .recommendations
            .iter()
            .any(|r| r.contains("mindfulness")));
    }

    #[test]
    fn weekly_consistency_and_average() {
        let (aggregator, store) = aggregator();
        let user = Uuid::new_v4();
        // 4 of 7 days tracked
        for d in [1, 2, 4, 6] {
            put_record(&store, user, date(2026, 5, d), 40.0);
        }

        let view = aggregator.weekly(user, date(2026, 5, 7));
        assert_eq!(view.summary.days_tracked, 4);
        assert_eq!(view.summary.consistency, 57);
        assert_eq!(view.summary.avg_score, Some(40.0));
        assert_eq!(view.chart_data.len(), 7);
        assert_eq!(view.chart_data[0].score, Some(40.0));
        assert_eq!(view.chart_data[2].score, None);
    }

    #[test]
    fn weekly_velocity_alert_fires_on_rapid_climb() {
        let (aggregator, store) = aggregator();
        let user = Uuid::new_v4();
        put_record(&store, user, date(2026, 5, 1), 30.0);
        put_record(&store, user, date(2026, 5, 4), 45.0);
        put_record(&store, user, date(2026, 5, 7), 60.0);

        let view = aggregator.weekly(user, date(2026, 5, 7));
        // velocity = (60 - 30) / 3 = 10 points per tracked day
        assert_eq!(view.summary.velocity, Some(10.0));
        assert!(view
            .alerts
            .iter()
            .any(|a| matches!(a, PatternAlert::RapidIncrease { .. })));
    }

    #[test]
    fn weekly_sustained_high_risk_alert() {
        let (aggregator, store) = aggregator();
        let user = Uuid::new_v4();
        for d in 1..=3 {
            put_record(&store, user, date(2026, 5, d), 75.0);
        }

        let view = aggregator.weekly(user, date(2026, 5, 7));
        assert!(view
            .alerts
            .iter()
            .any(|a| matches!(a, PatternAlert::SustainedHighRisk { .. })));
    }

    #[test]
    fn weekly_with_no_records_has_no_alerts() {
        let (aggregator, _) = aggregator();
        let view = aggregator.weekly(Uuid::new_v4(), date(2026, 5, 7));
        assert_eq!(view.summary.days_tracked, 0);
        assert_eq!(view.summary.consistency, 0);
        assert_eq!(view.summary.avg_score, None);
        assert_eq!(view.summary.trend, Trend::Unknown);
        assert!(view.alerts.is_empty());
    }

    #[test]
    fn monthly_buckets_cover_thirty_days() {
        let (aggregator, store) = aggregator();
        let user = Uuid::new_v4();
        for d in 1..=30 {
            put_record(&store, user, date(2026, 5, d), 50.0);
        }

        let view = aggregator.monthly(user, date(2026, 5, 30));
        assert_eq!(view.chart_data.len(), 30);
        assert_eq!(view.weekly_overview.len(), 5);
        assert_eq!(view.weekly_overview[0].days_tracked, 7);
        // 30 = 4 * 7 + 2
        assert_eq!(view.weekly_overview[4].days_tracked, 2);
        assert_eq!(view.summary.consistency, 100);
    }

    #[test]
    fn cache_serves_until_invalidated() {
        let (aggregator, store) = aggregator();
        let user = Uuid::new_v4();
        let as_of = date(2026, 5, 7);
        put_record(&store, user, date(2026, 5, 1), 40.0);

        let before = aggregator.weekly(user, as_of);
        assert_eq!(before.summary.days_tracked, 1);

        // A new record lands; the cached view still serves
        put_record(&store, user, date(2026, 5, 2), 42.0);
        assert_eq!(aggregator.weekly(user, as_of).summary.days_tracked, 1);

        // Until invalidation
        aggregator.invalidate(user);
        assert_eq!(aggregator.weekly(user, as_of).summary.days_tracked, 2);
    }
}
