//! Reconnect backoff.
//!
//! A [`BackoffSchedule`] is the list of delays between reconnect attempts.
//! It is parsed once per registry from `PMCD_RECONNECT_TIMEOUT` (or the
//! config file) and shared by every host context. Each connection keeps its
//! own [`BackoffState`]: the attempt counter and the earliest instant the
//! next attempt may run.

use std::time::{Duration, Instant};
use tracing::warn;

const DEFAULT_DELAYS_SECS: [u64; 5] = [5, 10, 20, 40, 80];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            delays: DEFAULT_DELAYS_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        }
    }
}

impl BackoffSchedule {
    /// Parse a comma-separated list of positive whole seconds.
    ///
    /// Returns `None` when any element is missing, non-numeric, or zero; a
    /// partially valid list is never used.
    pub fn parse(text: &str) -> Option<Self> {
        let mut delays = Vec::new();
        for part in text.split(',') {
            let secs: u64 = part.trim().parse().ok()?;
            if secs == 0 {
                return None;
            }
            delays.push(Duration::from_secs(secs));
        }
        if delays.is_empty() {
            None
        } else {
            Some(Self { delays })
        }
    }

    /// Schedule from an optional configured value, falling back to the
    /// built-in list. A malformed value is reported once and ignored.
    pub fn from_setting(setting: Option<&str>) -> Self {
        match setting.map(str::trim) {
            None | Some("") => Self::default(),
            Some(text) => Self::parse(text).unwrap_or_else(|| {
                warn!(value = %text, "bad PMCD_RECONNECT_TIMEOUT, using default backoff");
                Self::default()
            }),
        }
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    pub fn len(&self) -> usize {
        self.delays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    /// Delay after the `attempt`-th consecutive failure (0-based). Attempts
    /// past the end of the list reuse the last delay.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let idx = attempt.min(self.delays.len().saturating_sub(1));
        self.delays.get(idx).copied().unwrap_or_default()
    }
}

/// Per-connection retry bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackoffState {
    attempts: usize,
    retry_after: Option<Instant>,
}

impl BackoffState {
    /// Remaining wait if an attempt at `now` would be too early.
    pub fn too_soon(&self, now: Instant) -> Option<Duration> {
        match self.retry_after {
            Some(at) if now < at => Some(at - now),
            _ => None,
        }
    }

    /// Record a failed attempt at `now` and return the delay until the next
    /// one is allowed.
    pub fn note_failure(&mut self, schedule: &BackoffSchedule, now: Instant) -> Duration {
        let delay = schedule.delay_for(self.attempts);
        if self.attempts < schedule.len() {
            self.attempts += 1;
        }
        self.retry_after = Some(now + delay);
        delay
    }

    /// Forget all failures after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.retry_after = None;
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn retry_after(&self) -> Option<Instant> {
        self.retry_after
    }
}
