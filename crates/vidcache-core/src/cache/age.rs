use std::fmt;

use chrono::{DateTime, Utc};

/// How long ago the collection was last bulk-refreshed, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshAge {
    refreshed_at: Option<i64>,
    now: i64,
}

impl RefreshAge {
    pub fn new(refreshed_at: Option<i64>, now: i64) -> Self {
        Self { refreshed_at, now }
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at.and_then(DateTime::from_timestamp_millis)
    }

    /// Whole minutes since the refresh, or `None` if there never was one.
    pub fn minutes(&self) -> Option<i64> {
        self.refreshed_at.map(|at| self.now.saturating_sub(at) / 60_000)
    }
}

impl fmt::Display for RefreshAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(minutes) = self.minutes() else {
            return write!(f, "never");
        };
        if minutes < 1 {
            // Covers clock skew too
            write!(f, "just now")
        } else if minutes < 60 {
            write!(f, "{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            // Round up: 1h 30m+ becomes 2h
            let hours = if minutes % 60 >= 30 { hours + 1 } else { hours };
            write!(f, "{}h ago", hours)
        } else {
            let days = minutes / 1440;
            // Round up: 1d 12h+ becomes 2d
            let days = if (minutes % 1440) / 60 >= 12 { days + 1 } else { days };
            write!(f, "{}d ago", days)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000;

    fn age(minutes_ago: i64) -> String {
        let now = 10_000 * 1440 * MINUTE;
        RefreshAge::new(Some(now - minutes_ago * MINUTE), now).to_string()
    }

    #[test]
    fn test_never_refreshed() {
        let age = RefreshAge::new(None, 1000);
        assert_eq!(age.to_string(), "never");
        assert_eq!(age.refreshed_at(), None);
    }

    #[test]
    fn test_age_display() {
        assert_eq!(age(0), "just now");
        assert_eq!(age(-5), "just now");
        assert_eq!(age(5), "5m ago");
        assert_eq!(age(89), "1h ago");
        assert_eq!(age(90), "2h ago");
        assert_eq!(age(1440 + 11 * 60), "1d ago");
        assert_eq!(age(1440 + 12 * 60), "2d ago");
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let now = 1_700_000_000_000;
        let ancient = RefreshAge::new(Some(i64::MIN), now);
        assert!(ancient.to_string().ends_with("d ago"));
        assert_eq!(ancient.refreshed_at(), None);

        let future = RefreshAge::new(Some(i64::MAX), now);
        assert_eq!(future.to_string(), "just now");
    }

    #[test]
    fn test_refreshed_at_converts_epoch_ms() {
        let age = RefreshAge::new(Some(1_700_000_000_000), 1_700_000_000_000);
        assert_eq!(age.refreshed_at().unwrap().timestamp(), 1_700_000_000);
    }
}
