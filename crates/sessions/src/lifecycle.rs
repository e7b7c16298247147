//! When a cron session stops being reused.
//!
//! Checked once per turn during resolution.  A stale entry is replaced by a
//! fresh session under the same key; see [`SessionEntry::rotated`].

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use ct_domain::config::LifecycleConfig;

use crate::store::SessionEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    /// The entry predates the most recent `hour:00` UTC boundary.
    DailyBoundary { hour: u8 },
    /// The entry was idle for at least `minutes`.
    Idle { minutes: u32 },
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DailyBoundary { hour } => write!(f, "daily reset at {hour:02}:00 UTC"),
            Self::Idle { minutes } => write!(f, "idle for {minutes}m"),
        }
    }
}

/// Applies the `[session.reset]` rules.  The default manager never resets.
#[derive(Debug, Clone, Default)]
pub struct LifecycleManager {
    rules: LifecycleConfig,
}

impl LifecycleManager {
    pub fn new(rules: LifecycleConfig) -> Self {
        Self { rules }
    }

    pub fn should_reset(&self, entry: &SessionEntry, now: DateTime<Utc>) -> Option<ResetReason> {
        let last = entry.updated_at;

        let daily = self.rules.daily_reset_hour.and_then(|hour| {
            let boundary = last_boundary(now, hour)?;
            (last < boundary && now - last >= Duration::minutes(1))
                .then_some(ResetReason::DailyBoundary { hour })
        });

        daily.or_else(|| {
            let minutes = self.rules.idle_minutes?;
            (now - last >= Duration::minutes(i64::from(minutes)))
                .then_some(ResetReason::Idle { minutes })
        })
    }
}

/// The latest `hour:00` UTC at or before `now`.  `None` for hours past 23.
fn last_boundary(now: DateTime<Utc>, hour: u8) -> Option<DateTime<Utc>> {
    let today = now.date_naive().and_hms_opt(u32::from(hour), 0, 0)?.and_utc();
    Some(if today <= now {
        today
    } else {
        today - Duration::days(1)
    })
}
