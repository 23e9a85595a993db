use std::sync::{Mutex, PoisonError};

use chrono::{Local, NaiveDateTime, TimeDelta, Timelike, Utc};
use chrono_tz::Tz;

/// Wall-clock source for schedule evaluation, in the schedule's local time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    timezone: Option<Tz>,
}

impl SystemClock {
    pub fn new(timezone: Option<Tz>) -> Self {
        Self { timezone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        match self.timezone {
            Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
            None => Local::now().naive_local(),
        }
    }
}

/// A clock that only moves when told to. Used by `--dry-run` and tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drop seconds and sub-seconds so window boundaries compare at minute resolution.
pub fn normalize(now: NaiveDateTime) -> NaiveDateTime {
    now.date()
        .and_hms_opt(now.hour(), now.minute(), 0)
        .unwrap_or(now)
}
