//! SoulSync Pulse - Temporal wellness analytics core
//!
//! Pulse turns a stream of per-day risk measurements into three projections:
//! persistent episode records describing sustained runs of elevated risk, a
//! daily-engagement streak with milestones and a leaderboard, and on-demand
//! daily/weekly/monthly rollups for dashboards.
//!
//! ## Modules
//!
//! - **Ingestion**: one submission per user per calendar day drives the
//!   write-side state machines
//! - **Episodes**: per-(user, category) hysteresis machines with a grace
//!   period before closing
//! - **Streaks**: per-user consecutive-day tracking with a milestone ladder
//! - **Insights**: stateless windowed aggregations, cached with a short TTL

pub mod config;
pub mod engine;
pub mod episode;
pub mod error;
pub mod ingest;
pub mod insights;
pub mod recommend;
pub mod store;
pub mod streak;
pub mod types;

pub use config::AnalyticsConfig;
pub use engine::PulseEngine;
pub use episode::EpisodeDetector;
pub use error::AnalyticsError;
pub use ingest::{QuizSubmission, RecordIngestor};
pub use insights::InsightsAggregator;
pub use store::{MemoryStore, StateStore, Versioned};
pub use streak::StreakTracker;

/// Pulse version embedded in CLI output
pub const PULSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for exported snapshots and reports
pub const PRODUCER_NAME: &str = "soulsync-pulse";
