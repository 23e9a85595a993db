//! Directory-encoded schedule parsing.
//!
//! ```text
//! <root>/
//!   once/<YYYY-MM-DD>/<HH-HH>/<media files>
//!   weekly/<1-7>/<HH-HH>/<media files>
//!   standard/<media files>
//!   syncInProgress.lock
//! ```
//!
//! Malformed folder names are skipped with a warning. Any listing failure
//! aborts the whole scan so a partial schedule is never produced.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::playlist::{Listing, PlaylistBuilder, PlaylistItem, list_dir};

pub const ONCE_DIR: &str = "once";
pub const WEEKLY_DIR: &str = "weekly";
pub const STANDARD_DIR: &str = "standard";
pub const LOG_DIR: &str = "log";
pub const SYNC_LOCK: &str = "syncInProgress.lock";

static DATE_DIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]{4})-([0-9]{2})-([0-9]{2})$").expect("date folder pattern")
});
static HOUR_RANGE_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-2][0-9])-([0-2][0-9])").expect("hour range pattern"));
static WEEKDAY_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-7]$").expect("weekday folder pattern"));

pub type Playlist = Vec<Arc<PlaylistItem>>;

/// A dated one-off window, `start` inclusive and `end` exclusive.
#[derive(Debug, Clone)]
pub struct OnceEvent {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub playlist: Playlist,
}

impl OnceEvent {
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        self.start <= now && now < self.end
    }

    pub fn overlaps(&self, other: &OnceEvent) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A recurring window on one weekday (0 = Sunday), hours `[start_hour, end_hour)`.
#[derive(Debug, Clone)]
pub struct WeeklyEvent {
    pub weekday: u32,
    pub start_hour: u32,
    pub end_hour: u32,
    pub playlist: Playlist,
}

impl WeeklyEvent {
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        now.weekday().num_days_from_sunday() == self.weekday
            && self.start_hour <= now.hour()
            && now.hour() < self.end_hour
    }

    /// End of this window on `date`.
    pub fn end_on(&self, date: NaiveDate) -> Option<NaiveDateTime> {
        at_hour(date, self.end_hour)
    }
}

/// Everything one rescan produced. Installed into the store as a whole.
#[derive(Debug, Clone, Default)]
pub struct ScheduleSnapshot {
    pub once_events: Vec<OnceEvent>,
    pub weekly_events: Vec<WeeklyEvent>,
    pub standard: Playlist,
}

impl ScheduleSnapshot {
    /// Index pairs of once-events whose windows intersect.
    pub fn overlapping_once_events(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for (i, a) in self.once_events.iter().enumerate() {
            for (j, b) in self.once_events.iter().enumerate().skip(i + 1) {
                if a.overlaps(b) {
                    out.push((i, j));
                }
            }
        }
        out
    }

    pub fn item_count(&self) -> usize {
        self.once_events.iter().map(|e| e.playlist.len()).sum::<usize>()
            + self
                .weekly_events
                .iter()
                .map(|e| e.playlist.len())
                .sum::<usize>()
            + self.standard.len()
    }
}

#[derive(Debug)]
pub enum ScanOutcome {
    Snapshot(ScheduleSnapshot),
    /// The sync sentinel was present; nothing was scanned.
    SyncInProgress,
}

/// `date` at `hour:00`; hour 24 is midnight of the following day.
pub fn at_hour(date: NaiveDate, hour: u32) -> Option<NaiveDateTime> {
    if hour == 24 {
        return date.succ_opt()?.and_hms_opt(0, 0, 0);
    }
    date.and_hms_opt(hour, 0, 0)
}

/// Parse a `YYYY-MM-DD` folder name.
pub fn parse_date_dir(name: &str) -> Result<NaiveDate, Error> {
    const EXPECTED: &str = "a YYYY-MM-DD date";
    let caps = DATE_DIR
        .captures(name)
        .ok_or_else(|| Error::malformed(name, EXPECTED))?;
    let field = |i: usize| caps[i].parse::<u32>().map_err(|_| Error::malformed(name, EXPECTED));
    let year = caps[1]
        .parse::<i32>()
        .map_err(|_| Error::malformed(name, EXPECTED))?;
    NaiveDate::from_ymd_opt(year, field(2)?, field(3)?)
        .ok_or_else(|| Error::malformed(name, EXPECTED))
}

/// Parse an `HH-HH` folder name (trailing text is allowed) into `(start, end)` hours.
pub fn parse_hour_range(name: &str) -> Result<(u32, u32), Error> {
    const EXPECTED: &str = "an HH-HH hour range with start < end <= 24";
    let caps = HOUR_RANGE_DIR
        .captures(name)
        .ok_or_else(|| Error::malformed(name, EXPECTED))?;
    let start = caps[1]
        .parse::<u32>()
        .map_err(|_| Error::malformed(name, EXPECTED))?;
    let end = caps[2]
        .parse::<u32>()
        .map_err(|_| Error::malformed(name, EXPECTED))?;
    if start >= end || end > 24 {
        return Err(Error::malformed(name, EXPECTED));
    }
    Ok((start, end))
}

/// Parse a `1`-`7` weekday folder name into a Sunday-based weekday (`7` -> `0`).
pub fn parse_weekday_dir(name: &str) -> Result<u32, Error> {
    const EXPECTED: &str = "a weekday digit 1-7";
    if !WEEKDAY_DIR.is_match(name) {
        return Err(Error::malformed(name, EXPECTED));
    }
    let day = name
        .parse::<u32>()
        .map_err(|_| Error::malformed(name, EXPECTED))?;
    Ok(day % 7)
}

/// Walks the media tree and builds a [`ScheduleSnapshot`].
#[derive(Debug, Clone)]
pub struct ScheduleParser {
    builder: PlaylistBuilder,
}

impl ScheduleParser {
    pub fn new(builder: PlaylistBuilder) -> Self {
        Self { builder }
    }

    /// Scan the whole tree under `root`. Once-events ending at or before `now` are dropped.
    ///
    /// Blocking; run it on a blocking thread.
    pub fn scan(&self, root: &Path, now: NaiveDateTime) -> Result<ScanOutcome, Error> {
        let entries = list_dir(root)?;
        if entries.iter().any(|e| e.name == SYNC_LOCK) {
            info!(root = %root.display(), "sync in progress; skipping scan");
            return Ok(ScanOutcome::SyncInProgress);
        }

        let mut snapshot = ScheduleSnapshot::default();
        for entry in entries {
            match (entry.name.as_str(), entry.is_dir) {
                (ONCE_DIR, true) => snapshot.once_events = self.parse_once(&entry.path, now)?,
                (WEEKLY_DIR, true) => snapshot.weekly_events = self.parse_weekly(&entry.path)?,
                (STANDARD_DIR, true) => snapshot.standard = self.builder.build(&entry.path)?,
                (LOG_DIR, _) => {}
                _ => debug!(path = %entry.path.display(), "ignoring entry in media root"),
            }
        }
        Ok(ScanOutcome::Snapshot(snapshot))
    }

    pub fn parse_once(&self, dir: &Path, now: NaiveDateTime) -> Result<Vec<OnceEvent>, Error> {
        let mut events = Vec::new();
        for day_entry in list_dir(dir)? {
            let Some(day) = checked_dir(&day_entry, parse_date_dir) else {
                continue;
            };
            for range_entry in list_dir(&day_entry.path)? {
                let Some((start_hour, end_hour)) = checked_dir(&range_entry, parse_hour_range)
                else {
                    continue;
                };
                let (Some(start), Some(end)) = (at_hour(day, start_hour), at_hour(day, end_hour))
                else {
                    warn!(
                        path = %range_entry.path.display(),
                        "skipping unrepresentable event window"
                    );
                    continue;
                };
                if end <= now {
                    debug!(path = %range_entry.path.display(), %end, "skipping past event");
                    continue;
                }
                events.push(OnceEvent {
                    start,
                    end,
                    playlist: self.builder.build(&range_entry.path)?,
                });
            }
        }
        Ok(events)
    }

    pub fn parse_weekly(&self, dir: &Path) -> Result<Vec<WeeklyEvent>, Error> {
        let mut events = Vec::new();
        for day_entry in list_dir(dir)? {
            let Some(weekday) = checked_dir(&day_entry, parse_weekday_dir) else {
                continue;
            };
            for range_entry in list_dir(&day_entry.path)? {
                let Some((start_hour, end_hour)) = checked_dir(&range_entry, parse_hour_range)
                else {
                    continue;
                };
                events.push(WeeklyEvent {
                    weekday,
                    start_hour,
                    end_hour,
                    playlist: self.builder.build(&range_entry.path)?,
                });
            }
        }
        Ok(events)
    }
}

fn checked_dir<T>(entry: &Listing, parse: impl FnOnce(&str) -> Result<T, Error>) -> Option<T> {
    if !entry.is_dir {
        warn!(path = %entry.path.display(), "skipping non-directory entry");
        return None;
    }
    match parse(&entry.name) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(path = %entry.path.display(), error = %err, "skipping malformed directory");
            None
        }
    }
}
