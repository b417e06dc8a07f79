use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds + microseconds timestamp, as stored in archive labels.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timeval {
    pub sec: i64,
    pub usec: i32,
}

impl Timeval {
    pub const fn new(sec: i64, usec: i32) -> Self {
        Self { sec, usec }
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.sec, (self.usec.max(0) as u32) * 1000)
    }
}

impl fmt::Display for Timeval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.sec, self.usec)
    }
}

/// How samples are delivered relative to the window origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeMode {
    #[default]
    Live,
    Interpolated,
    Forward,
    Backward,
}

impl TimeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeMode::Live => "LIVE",
            TimeMode::Interpolated => "INTERP",
            TimeMode::Forward => "FORW",
            TimeMode::Backward => "BACK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// Per-context time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WindowState {
    pub origin: Timeval,
    /// Step between samples, milliseconds
    pub delta_ms: i64,
    pub direction: Direction,
    pub mode: TimeMode,
}

impl WindowState {
    /// Window for a freshly opened archive: origin at its first record,
    /// reading forwards.
    pub fn archive_start(origin: Timeval) -> Self {
        Self {
            origin,
            delta_ms: 0,
            direction: Direction::Forward,
            mode: TimeMode::Forward,
        }
    }
}
