//! Time utilities for turnstile
//!
//! Wall-clock time stamps submissions and audit entries; monotonic time
//! measures how long an execution ran.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `TURNSTILE_MOCK_TIME` environment variable can be set
//! to shift the wall clock. The mocked clock keeps advancing at real speed.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "TURNSTILE_MOCK_TIME";

static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)]
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            let mock_time_str = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
            let Ok(naive_dt) = NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S")
            else {
                tracing::warn!(
                    mock_time = %mock_time_str,
                    expected_format = "%Y-%m-%d %H:%M:%S",
                    "Invalid mock time format"
                );
                return None;
            };
            let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() else {
                tracing::warn!(
                    mock_time = %mock_time_str,
                    "Failed to convert mock time to local timezone"
                );
                return None;
            };
            let offset = mock_dt.signed_duration_since(chrono::Local::now());
            tracing::info!(
                mock_time = %mock_time_str,
                offset_secs = offset.num_seconds(),
                "Mock time enabled"
            );
            Some(offset)
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)]
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// A point in monotonic time, immune to wall-clock changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonotonicInstant(Instant);

impl MonotonicInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }

    pub fn duration_since(&self, earlier: MonotonicInstant) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }
}

impl std::ops::Add<Duration> for MonotonicInstant {
    type Output = MonotonicInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        MonotonicInstant(self.0 + rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_non_decreasing() {
        let a = now();
        let b = now();
        assert!(b >= a);
    }

    #[test]
    fn monotonic_duration_since() {
        let start = MonotonicInstant::now();
        let later = start + Duration::from_secs(5);
        assert_eq!(later.duration_since(start), Duration::from_secs(5));
        assert_eq!(start.duration_since(later), Duration::ZERO);
    }
}
