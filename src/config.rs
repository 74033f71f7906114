//! Engine configuration
//!
//! Thresholds and ladders are deployment-tunable rather than hard-coded so
//! the episode detector and streak tracker stay deterministic under test.

use crate::types::RiskLevel;
use serde::{Deserialize, Serialize};

/// Default episode open threshold (0-100 scale)
pub const DEFAULT_OPEN_THRESHOLD: f64 = 60.0;

/// Default episode continue threshold; lower than open for hysteresis
pub const DEFAULT_CONTINUE_THRESHOLD: f64 = 50.0;

/// Default consecutive sub-threshold days tolerated before closing
pub const DEFAULT_GRACE_DAYS: u32 = 3;

/// Streak milestone ladder
pub const DEFAULT_MILESTONES: [u32; 9] = [3, 7, 14, 21, 30, 60, 90, 100, 365];

/// Tunable parameters for the analytics engine.
///
/// Day boundaries are fixed UTC calendar days throughout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Score at which a new episode opens
    pub open_threshold: f64,
    /// Score that sustains an already-ongoing episode
    pub continue_threshold: f64,
    /// Consecutive sub-threshold days before an episode closes
    pub grace_days: u32,
    /// Days of silence (no record at all) after which an ongoing episode
    /// is closed the same way a grace run would close it
    pub max_silent_days: u32,
    /// Ascending streak milestones, each awarded at most once
    pub milestone_ladder: Vec<u32>,
    /// Score delta within which day-over-day movement reads as steady
    pub trend_tolerance: f64,
    /// Overall-score cut points for risk bands
    pub critical_cutoff: f64,
    pub high_cutoff: f64,
    pub moderate_cutoff: f64,
    /// Weekly velocity above which a rapid-increase alert is raised
    pub velocity_alert: f64,
    /// High/critical day count within a week that raises a sustained alert
    pub high_risk_days_alert: u32,
    /// Insights cache time-to-live in seconds
    pub cache_ttl_secs: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            open_threshold: DEFAULT_OPEN_THRESHOLD,
            continue_threshold: DEFAULT_CONTINUE_THRESHOLD,
            grace_days: DEFAULT_GRACE_DAYS,
            max_silent_days: DEFAULT_GRACE_DAYS,
            milestone_ladder: DEFAULT_MILESTONES.to_vec(),
            trend_tolerance: 5.0,
            critical_cutoff: 85.0,
            high_cutoff: 70.0,
            moderate_cutoff: 50.0,
            velocity_alert: 3.0,
            high_risk_days_alert: 3,
            cache_ttl_secs: 300,
        }
    }
}

impl AnalyticsConfig {
    /// Config with custom episode thresholds, everything else default
    pub fn with_thresholds(open: f64, continue_: f64, grace_days: u32) -> Self {
        Self {
            open_threshold: open,
            continue_threshold: continue_,
            grace_days,
            max_silent_days: grace_days,
            ..Self::default()
        }
    }

    /// Derive the risk band for an overall score
    pub fn risk_level(&self, score: f64) -> RiskLevel {
        if score >= self.critical_cutoff {
            RiskLevel::Critical
        } else if score >= self.high_cutoff {
            RiskLevel::High
        } else if score >= self.moderate_cutoff {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }

    /// A usable score is finite and on the 0-100 scale
    pub fn score_in_range(&self, score: f64) -> bool {
        score.is_finite() && (0.0..=100.0).contains(&score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_thresholds_keep_hysteresis_gap() {
        let config = AnalyticsConfig::default();
        assert!(config.continue_threshold < config.open_threshold);
        assert_eq!(config.grace_days, 3);
    }

    #[test]
    fn risk_levels_follow_cut_points() {
        let config = AnalyticsConfig::default();
        assert_eq!(config.risk_level(20.0), RiskLevel::Low);
        assert_eq!(config.risk_level(50.0), RiskLevel::Moderate);
        assert_eq!(config.risk_level(70.0), RiskLevel::High);
        assert_eq!(config.risk_level(92.0), RiskLevel::Critical);
    }

    #[test]
    fn score_range_rejects_nan_and_out_of_scale() {
        let config = AnalyticsConfig::default();
        assert!(config.score_in_range(0.0));
        assert!(config.score_in_range(100.0));
        assert!(!config.score_in_range(f64::NAN));
        assert!(!config.score_in_range(101.0));
        assert!(!config.score_in_range(-1.0));
    }
}
