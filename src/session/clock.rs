// src/session/clock.rs

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};

/// Source of wall-clock time. Production uses [`SystemTime`]; tests drive a [`ManualTime`].
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Simulated time that only moves when told to.
#[derive(Debug)]
pub struct ManualTime {
    now: Mutex<DateTime<Utc>>,
}

impl ManualTime {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualTime {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, seconds: i64) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += TimeDelta::seconds(seconds);
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Countdown bound to an attempt's persisted start time.
///
/// The clock holds no running state: remaining time is always recomputed
/// from `started_at`, so rebuilding it on resume continues the original budget.
#[derive(Clone)]
pub struct SessionClock {
    started_at: DateTime<Utc>,
    duration: TimeDelta,
    time: Arc<dyn TimeSource>,
}

impl SessionClock {
    pub fn new(started_at: DateTime<Utc>, duration: TimeDelta, time: Arc<dyn TimeSource>) -> Self {
        SessionClock {
            started_at,
            duration,
            time,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration(&self) -> TimeDelta {
        self.duration
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + self.duration
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.time.now()
    }

    /// Whole seconds left, never negative.
    pub fn remaining(&self) -> i64 {
        let left = self.deadline() - self.time.now();
        left.num_seconds().max(0)
    }

    pub fn is_expired(&self) -> bool {
        self.time.now() >= self.deadline()
    }
}

impl std::fmt::Debug for SessionClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClock")
            .field("started_at", &self.started_at)
            .field("duration", &self.duration)
            .finish()
    }
}
