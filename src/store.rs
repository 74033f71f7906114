//! Versioned state storage
//!
//! The engine owns three collections: daily risk records keyed by
//! (user, date), one streak document per user, and episode documents keyed
//! by id with (user, type, ongoing) lookups. Streak and episode writes go
//! through compare-and-swap on a per-document version so two near-simultaneous
//! submissions for the same user cannot silently overwrite each other.
//!
//! `MemoryStore` is the in-process implementation; its JSON snapshot helpers
//! let callers persist and restore engine state between runs.

use crate::error::AnalyticsError;
use crate::types::{DailyRiskRecord, Episode, EpisodeType, Streak, UserId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

/// A stored document together with its write version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub doc: T,
}

/// Storage contract for the three engine-owned collections.
///
/// Conditional writes take the version the caller read; a mismatch returns
/// `ConcurrencyConflict` and the caller decides whether to reread and retry.
/// `expected: None` means the document must not exist yet.
pub trait StateStore: Send + Sync {
    fn put_record(&self, record: DailyRiskRecord) -> Result<bool, AnalyticsError>;
    fn record(&self, user: UserId, date: NaiveDate) -> Option<DailyRiskRecord>;
    fn records_between(&self, user: UserId, from: NaiveDate, to: NaiveDate)
        -> Vec<DailyRiskRecord>;
    fn latest_record(&self, user: UserId, as_of: NaiveDate) -> Option<DailyRiskRecord>;

    fn streak(&self, user: UserId) -> Option<Versioned<Streak>>;
    fn put_streak(
        &self,
        expected: Option<u64>,
        streak: Streak,
    ) -> Result<Versioned<Streak>, AnalyticsError>;
    fn all_streaks(&self) -> Vec<Streak>;

    /// The ongoing episode for (user, type), if any. Finding more than one
    /// is a singleton-invariant violation and surfaces loudly.
    fn ongoing_episode(
        &self,
        user: UserId,
        episode_type: EpisodeType,
    ) -> Result<Option<Versioned<Episode>>, AnalyticsError>;
    fn episodes_for(&self, user: UserId) -> Vec<Episode>;
    /// Creating an ongoing episode (`expected: None`) must atomically reject
    /// the write with `ConcurrencyConflict` when another ongoing episode
    /// already exists for the same (user, type).
    fn put_episode(
        &self,
        expected: Option<u64>,
        episode: Episode,
    ) -> Result<Versioned<Episode>, AnalyticsError>;

    fn export_json(&self) -> Result<String, AnalyticsError>;
    fn import_json(&self, json: &str) -> Result<(), AnalyticsError>;
}

/// In-memory store backing the engine
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<(UserId, NaiveDate), DailyRiskRecord>>,
    streaks: RwLock<HashMap<UserId, Versioned<Streak>>>,
    episodes: RwLock<HashMap<Uuid, Versioned<Episode>>>,
}

/// Serializable snapshot of the full store contents, stamped with the
/// producing crate and version
#[derive(Serialize, Deserialize)]
struct StoreSnapshot {
    #[serde(default)]
    producer: String,
    #[serde(default)]
    version: String,
    records: Vec<DailyRiskRecord>,
    streaks: Vec<Versioned<Streak>>,
    episodes: Vec<Versioned<Episode>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a store from a snapshot produced by `export_json`
    pub fn from_json(json: &str) -> Result<Self, AnalyticsError> {
        let store = Self::new();
        store.import_json(json)?;
        Ok(store)
    }
}

// Lock poisoning only happens if a writer panicked mid-update; the data
// itself is still coherent for these whole-document operations.
fn read_guard<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_guard<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StateStore for MemoryStore {
    fn put_record(&self, record: DailyRiskRecord) -> Result<bool, AnalyticsError> {
        let mut records = write_guard(&self.records);
        let replaced = records
            .insert((record.user, record.date), record)
            .is_some();
        Ok(replaced)
    }

    fn record(&self, user: UserId, date: NaiveDate) -> Option<DailyRiskRecord> {
        read_guard(&self.records).get(&(user, date)).cloned()
    }

    fn records_between(
        &self,
        user: UserId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<DailyRiskRecord> {
        read_guard(&self.records)
            .range((user, from)..=(user, to))
            .map(|(_, record)| record.clone())
            .collect()
    }

    fn latest_record(&self, user: UserId, as_of: NaiveDate) -> Option<DailyRiskRecord> {
        read_guard(&self.records)
            .range((user, NaiveDate::MIN)..=(user, as_of))
            .next_back()
            .map(|(_, record)| record.clone())
    }

    fn streak(&self, user: UserId) -> Option<Versioned<Streak>> {
        read_guard(&self.streaks).get(&user).cloned()
    }

    fn put_streak(
        &self,
        expected: Option<u64>,
        streak: Streak,
    ) -> Result<Versioned<Streak>, AnalyticsError> {
        let mut streaks = write_guard(&self.streaks);
        let current = streaks.get(&streak.user).map(|v| v.version);
        if current != expected {
            warn!(
                user = %streak.user,
                expected = ?expected,
                found = ?current,
                "streak write lost a version race"
            );
            return Err(AnalyticsError::ConcurrencyConflict {
                entity: "streak",
                detail: format!(
                    "expected version {expected:?}, found {current:?} for user {}",
                    streak.user
                ),
            });
        }
        let next = Versioned {
            version: expected.map_or(1, |v| v + 1),
            doc: streak,
        };
        streaks.insert(next.doc.user, next.clone());
        Ok(next)
    }

    fn all_streaks(&self) -> Vec<Streak> {
        read_guard(&self.streaks)
            .values()
            .map(|v| v.doc.clone())
            .collect()
    }

    fn ongoing_episode(
        &self,
        user: UserId,
        episode_type: EpisodeType,
    ) -> Result<Option<Versioned<Episode>>, AnalyticsError> {
        let episodes = read_guard(&self.episodes);
        let mut ongoing: Vec<&Versioned<Episode>> = episodes
            .values()
            .filter(|v| {
                v.doc.user == user && v.doc.episode_type == episode_type && v.doc.is_ongoing
            })
            .collect();
        if ongoing.len() > 1 {
            return Err(AnalyticsError::InvariantViolation(format!(
                "{} ongoing {} episodes for user {user}",
                ongoing.len(),
                episode_type.as_str(),
            )));
        }
        Ok(ongoing.pop().cloned())
    }

    fn episodes_for(&self, user: UserId) -> Vec<Episode> {
        let mut result: Vec<Episode> = read_guard(&self.episodes)
            .values()
            .filter(|v| v.doc.user == user)
            .map(|v| v.doc.clone())
            .collect();
        result.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        result
    }

    fn put_episode(
        &self,
        expected: Option<u64>,
        episode: Episode,
    ) -> Result<Versioned<Episode>, AnalyticsError> {
        let mut episodes = write_guard(&self.episodes);
        // Creates are keyed by a fresh id, so the version check alone cannot
        // see a concurrent create of the same stream. The singleton check has
        // to happen under this write lock or two racing submissions both
        // open an episode for the same (user, type).
        if expected.is_none() && episode.is_ongoing {
            let clashing = episodes.values().any(|v| {
                v.doc.user == episode.user
                    && v.doc.episode_type == episode.episode_type
                    && v.doc.is_ongoing
            });
            if clashing {
                warn!(
                    user = %episode.user,
                    episode_type = episode.episode_type.as_str(),
                    "episode create lost a race with another ongoing episode"
                );
                return Err(AnalyticsError::ConcurrencyConflict {
                    entity: "episode",
                    detail: format!(
                        "ongoing {} episode already exists for user {}",
                        episode.episode_type.as_str(),
                        episode.user
                    ),
                });
            }
        }
        let current = episodes.get(&episode.id).map(|v| v.version);
        if current != expected {
            warn!(
                user = %episode.user,
                episode = %episode.id,
                expected = ?expected,
                found = ?current,
                "episode write lost a version race"
            );
            return Err(AnalyticsError::ConcurrencyConflict {
                entity: "episode",
                detail: format!(
                    "expected version {expected:?}, found {current:?} for episode {}",
                    episode.id
                ),
            });
        }
        let next = Versioned {
            version: expected.map_or(1, |v| v + 1),
            doc: episode,
        };
        episodes.insert(next.doc.id, next.clone());
        Ok(next)
    }

    fn export_json(&self) -> Result<String, AnalyticsError> {
        let snapshot = StoreSnapshot {
            producer: crate::PRODUCER_NAME.to_string(),
            version: crate::PULSE_VERSION.to_string(),
            records: read_guard(&self.records).values().cloned().collect(),
            streaks: read_guard(&self.streaks).values().cloned().collect(),
            episodes: read_guard(&self.episodes).values().cloned().collect(),
        };
        Ok(serde_json::to_string(&snapshot)?)
    }

    fn import_json(&self, json: &str) -> Result<(), AnalyticsError> {
        let snapshot: StoreSnapshot = serde_json::from_str(json)?;
        *write_guard(&self.records) = snapshot
            .records
            .into_iter()
            .map(|r| ((r.user, r.date), r))
            .collect();
        *write_guard(&self.streaks) = snapshot
            .streaks
            .into_iter()
            .map(|v| (v.doc.user, v))
            .collect();
        *write_guard(&self.episodes) = snapshot
            .episodes
            .into_iter()
            .map(|v| (v.doc.id, v))
            .collect();
        Ok(())
    }
}
