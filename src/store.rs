//! Process-wide schedule state and playlist selection.
//!
//! The store holds exactly one [`ScheduleSnapshot`] at a time. A rescan
//! replaces it wholesale under the same lock a selection reads it with, so a
//! selection never sees once-events from one scan and weekly events from
//! another.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::{info, warn};

use crate::clock::normalize;
use crate::config::DEFAULT_STANDARD_RECHECK;
use crate::schedule::{Playlist, ScheduleSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Once {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    Weekly {
        weekday: u32,
        start_hour: u32,
        end_hour: u32,
    },
    Standard,
}

impl SelectionSource {
    /// Whether a scheduled (once or weekly) event is playing.
    pub fn is_event(&self) -> bool {
        !matches!(self, Self::Standard)
    }
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub playlist: Playlist,
    /// The selection must be re-evaluated once this instant is reached.
    pub valid_until: NaiveDateTime,
    pub source: SelectionSource,
    /// Snapshot generation the selection was taken from.
    pub generation: u64,
}

impl ScheduleSnapshot {
    /// Resolve the playlist for `now`: once-events, then weekly events, then standard.
    ///
    /// Window checks use `now` truncated to the minute. The standard playlist
    /// stays valid for `standard_recheck` past the untruncated `now`.
    pub fn select(
        &self,
        now: NaiveDateTime,
        standard_recheck: TimeDelta,
    ) -> (Playlist, NaiveDateTime, SelectionSource) {
        let minute = normalize(now);

        if let Some(event) = self.once_events.iter().find(|e| e.contains(minute)) {
            return (
                event.playlist.clone(),
                event.end,
                SelectionSource::Once {
                    start: event.start,
                    end: event.end,
                },
            );
        }

        for event in &self.weekly_events {
            if !event.contains(minute) {
                continue;
            }
            if let Some(end) = event.end_on(minute.date()) {
                return (
                    event.playlist.clone(),
                    end,
                    SelectionSource::Weekly {
                        weekday: event.weekday,
                        start_hour: event.start_hour,
                        end_hour: event.end_hour,
                    },
                );
            }
        }

        (
            self.standard.clone(),
            now + standard_recheck,
            SelectionSource::Standard,
        )
    }
}

#[derive(Debug)]
struct StoreState {
    generation: u64,
    snapshot: Arc<ScheduleSnapshot>,
}

/// Versioned holder of the current schedule, shared by the rescan task and the player.
#[derive(Debug)]
pub struct ScheduleStore {
    standard_recheck: TimeDelta,
    state: Mutex<StoreState>,
}

impl Default for ScheduleStore {
    fn default() -> Self {
        Self::new(DEFAULT_STANDARD_RECHECK)
    }
}

impl ScheduleStore {
    pub fn new(standard_recheck: Duration) -> Self {
        Self {
            standard_recheck: TimeDelta::from_std(standard_recheck)
                .unwrap_or_else(|_| TimeDelta::seconds(30)),
            state: Mutex::new(StoreState {
                generation: 0,
                snapshot: Arc::new(ScheduleSnapshot::default()),
            }),
        }
    }

    /// Replace the current snapshot. Returns the new generation.
    pub fn install(&self, snapshot: ScheduleSnapshot) -> u64 {
        for (a, b) in snapshot.overlapping_once_events() {
            let (first, second) = (&snapshot.once_events[a], &snapshot.once_events[b]);
            warn!(
                first_start = %first.start,
                first_end = %first.end,
                second_start = %second.start,
                second_end = %second.end,
                "once events overlap; the earlier folder wins"
            );
        }
        let summary = (
            snapshot.once_events.len(),
            snapshot.weekly_events.len(),
            snapshot.standard.len(),
        );
        let snapshot = Arc::new(snapshot);

        let generation = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.generation += 1;
            state.snapshot = snapshot;
            state.generation
        };
        info!(
            generation,
            once_events = summary.0,
            weekly_events = summary.1,
            standard_items = summary.2,
            "installed schedule"
        );
        generation
    }

    pub fn select_current(&self, now: NaiveDateTime) -> Selection {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (playlist, valid_until, source) = state.snapshot.select(now, self.standard_recheck);
        Selection {
            playlist,
            valid_until,
            source,
            generation: state.generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    pub fn snapshot(&self) -> Arc<ScheduleSnapshot> {
        Arc::clone(
            &self
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot,
        )
    }
}
