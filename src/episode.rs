//! Episode detection
//!
//! A per-(user, category) hysteresis state machine over daily scores. An
//! episode opens when a score reaches the open threshold, is sustained by
//! anything at or above the lower continue threshold, and closes once a
//! grace run of consecutive sub-threshold days completes. The transition
//! logic is a pure function over the prior episode document; the detector
//! applies it through the versioned store.
//!
//! Missing days carry no signal: they neither sustain an episode nor count
//! toward the grace run. A silent stretch longer than the configured limit
//! still closes an ongoing episode, since one should not live forever on
//! absent data.

use crate::config::AnalyticsConfig;
use crate::error::AnalyticsError;
use crate::store::StateStore;
use crate::types::{DailyScore, Episode, EpisodeTransition, EpisodeType, UserId};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// One day's score for one episode stream
#[derive(Debug, Clone, Copy)]
pub(crate) struct Observation {
    pub date: NaiveDate,
    pub score: f64,
}

/// Outcome of stepping the state machine by one observation
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// No episode ongoing and the score stays below the open threshold
    NoEpisode,
    /// Observation predates the episode's latest point; dropped
    Ignore,
    Open(Episode),
    /// Ongoing episode mutated: extended, same-day point replaced, or a
    /// sub-threshold day appended without completing the grace run
    Update(Episode),
    /// Grace run or silent gap completed; episode finalized
    Close(Episode),
    /// A silent gap closed the old episode and the new score opened another
    CloseAndOpen { closed: Episode, opened: Episode },
}

/// Count of trailing recorded days below the continue threshold
fn trailing_sub_threshold_run(episode: &Episode, continue_threshold: f64) -> u32 {
    episode
        .daily_scores
        .iter()
        .rev()
        .take_while(|p| p.score < continue_threshold)
        .count() as u32
}

fn open_episode(user: UserId, episode_type: EpisodeType, obs: Observation) -> Episode {
    Episode {
        id: Uuid::new_v4(),
        user,
        episode_type,
        start_date: obs.date,
        end_date: None,
        is_ongoing: true,
        duration_days: 1,
        peak_score: obs.score,
        average_score: obs.score,
        lowest_score: obs.score,
        triggers: Vec::new(),
        daily_scores: vec![DailyScore {
            date: obs.date,
            score: obs.score,
        }],
    }
}

/// Finalize a closing episode: the end date is the last day that met the
/// continue threshold, and the frozen stats cover only the span up to it.
fn finalize(mut episode: Episode, continue_threshold: f64) -> Episode {
    let end = episode
        .last_qualifying_date(continue_threshold)
        .unwrap_or(episode.start_date);
    episode.daily_scores.retain(|p| p.date <= end);
    episode.recompute_stats(end);
    episode.end_date = Some(end);
    episode.is_ongoing = false;
    episode
}

/// Advance one (user, type) stream by a single observation
pub(crate) fn step(
    user: UserId,
    episode_type: EpisodeType,
    current: Option<Episode>,
    obs: Observation,
    config: &AnalyticsConfig,
) -> Step {
    let mut episode = match current {
        None => {
            return if obs.score >= config.open_threshold {
                Step::Open(open_episode(user, episode_type, obs))
            } else {
                Step::NoEpisode
            };
        }
        Some(episode) => episode,
    };

    let last = match episode.last_observed_date() {
        Some(last) => last,
        // An ongoing episode always has at least its opening point
        None => episode.start_date,
    };

    if obs.date < last {
        return Step::Ignore;
    }

    // Days with no data strictly between the last point and this one
    let silent_days = (obs.date - last).num_days() - 1;
    if silent_days > config.max_silent_days as i64 {
        let closed = finalize(episode, config.continue_threshold);
        return if obs.score >= config.open_threshold {
            Step::CloseAndOpen {
                closed,
                opened: open_episode(user, episode_type, obs),
            }
        } else {
            Step::Close(closed)
        };
    }

    if obs.date == last {
        // Same-day resubmission replaces that day's point
        if let Some(point) = episode.daily_scores.iter_mut().find(|p| p.date == obs.date) {
            point.score = obs.score;
        }
    } else {
        episode.daily_scores.push(DailyScore {
            date: obs.date,
            score: obs.score,
        });
    }

    if trailing_sub_threshold_run(&episode, config.continue_threshold) >= config.grace_days {
        return Step::Close(finalize(episode, config.continue_threshold));
    }

    episode.recompute_stats(obs.date);
    Step::Update(episode)
}

/// Episode state machine over the document store
pub struct EpisodeDetector {
    store: Arc<dyn StateStore>,
    config: AnalyticsConfig,
}

impl EpisodeDetector {
    pub fn new(store: Arc<dyn StateStore>, config: AnalyticsConfig) -> Self {
        Self { store, config }
    }

    /// Feed one day's score into the (user, type) stream.
    ///
    /// Returns the resulting transition, or `None` when nothing changed.
    /// Applied under an optimistic guard with one internal retry.
    pub fn ingest(
        &self,
        user: UserId,
        episode_type: EpisodeType,
        date: NaiveDate,
        score: f64,
    ) -> Result<Option<EpisodeTransition>, AnalyticsError> {
        let mut attempts = 0;
        loop {
            let current = self.store.ongoing_episode(user, episode_type)?;
            let expected = current.as_ref().map(|v| v.version);
            let step = step(
                user,
                episode_type,
                current.map(|v| v.doc),
                Observation { date, score },
                &self.config,
            );

            let result = self.apply(expected, step);
            match result {
                Err(AnalyticsError::ConcurrencyConflict { .. }) if attempts == 0 => {
                    debug!(user = %user, episode_type = episode_type.as_str(),
                        "episode write conflicted, rereading once");
                    attempts += 1;
                }
                other => return other,
            }
        }
    }

    fn apply(
        &self,
        expected: Option<u64>,
        step: Step,
    ) -> Result<Option<EpisodeTransition>, AnalyticsError> {
        match step {
            Step::NoEpisode | Step::Ignore => Ok(None),
            Step::Open(episode) => {
                let start_date = episode.start_date;
                let episode_type = episode.episode_type;
                self.store.put_episode(None, episode)?;
                Ok(Some(EpisodeTransition::Opened {
                    episode_type,
                    start_date,
                }))
            }
            Step::Update(episode) => {
                let duration_days = episode.duration_days;
                let episode_type = episode.episode_type;
                self.store.put_episode(expected, episode)?;
                Ok(Some(EpisodeTransition::Extended {
                    episode_type,
                    duration_days,
                }))
            }
            Step::Close(mut episode) => {
                episode.triggers = self.compute_triggers(&episode);
                let end_date = episode.end_date.unwrap_or(episode.start_date);
                let episode_type = episode.episode_type;
                self.store.put_episode(expected, episode)?;
                Ok(Some(EpisodeTransition::Closed {
                    episode_type,
                    end_date,
                }))
            }
            Step::CloseAndOpen { mut closed, opened } => {
                closed.triggers = self.compute_triggers(&closed);
                let end_date = closed.end_date.unwrap_or(closed.start_date);
                let start_date = opened.start_date;
                let episode_type = opened.episode_type;
                self.store.put_episode(expected, closed)?;
                self.store.put_episode(None, opened)?;
                Ok(Some(EpisodeTransition::ClosedAndOpened {
                    episode_type,
                    end_date,
                    start_date,
                }))
            }
        }
    }

    /// Factor labels present on at least half of the episode's days,
    /// strongest (most frequent) first.
    fn compute_triggers(&self, episode: &Episode) -> Vec<String> {
        let days = episode.daily_scores.len();
        if days == 0 {
            return Vec::new();
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for point in &episode.daily_scores {
            if let Some(record) = self.store.record(episode.user, point.date) {
                for factor in record.top_factors {
                    *counts.entry(factor).or_insert(0) += 1;
                }
            }
        }

        let mut triggers: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, count)| count * 2 >= days)
            .collect();
        triggers.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        triggers.into_iter().map(|(label, _)| label).collect()
    }

    /// Every ongoing episode for a user, across all types
    pub fn ongoing(&self, user: UserId) -> Vec<Episode> {
        self.store
            .episodes_for(user)
            .into_iter()
            .filter(|e| e.is_ongoing)
            .collect()
    }

    /// Full episode history, most recent first
    pub fn history(&self, user: UserId) -> Vec<Episode> {
        self.store.episodes_for(user)
    }
}
