//! Wall-clock access and relative "last seen" label arithmetic.
//!
//! Presence labels read like "just now", "5 minutes ago", "2 hours ago",
//! "today at 10:15", "yesterday at 22:40" and finally an absolute date. The
//! functions here do not render labels; they only answer *when* the current
//! label stops being accurate, which is what the presence scheduler needs.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone, Utc};

use crate::constants::{MAX_FUTURE_SKEW_SECS, MAX_RELATIVE_HOURS, MINUTES_PER_HOUR};

/// Source of "now", including the local UTC offset used for day boundaries.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// The host clock in the host time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let now = Local::now();
        now.with_timezone(now.offset())
    }
}

/// A clock that only moves when told to. Used by tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
    offset: FixedOffset,
}

impl ManualClock {
    /// A UTC clock frozen at `millis` since the epoch.
    pub fn new(millis: i64) -> Self {
        Self::with_offset(millis, Utc.fix())
    }

    pub fn with_offset(millis: i64, offset: FixedOffset) -> Self {
        Self {
            millis: AtomicI64::new(millis),
            offset,
        }
    }

    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance_millis(&self, delta: i64) {
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let millis = self.millis.load(Ordering::SeqCst);
        DateTime::<Utc>::from_timestamp_millis(millis)
            .unwrap_or_default()
            .with_timezone(&self.offset)
    }

    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Milliseconds until the relative label for `was_online` (unix seconds)
/// changes, seen from `now`.
///
/// Returns `None` once the label has become an absolute date (two or more
/// calendar days ago), after which no refresh is ever needed.
pub fn next_label_change_ms(
    was_online: i64,
    now: &DateTime<FixedOffset>,
    just_now_secs: i64,
) -> Option<i64> {
    let now_ms = now.timestamp_millis();
    let then_ms = was_online.saturating_mul(1000);
    let diff_ms = now_ms - then_ms;
    let diff = diff_ms / 1000;

    if diff >= -MAX_FUTURE_SKEW_SECS {
        if diff < just_now_secs {
            return Some(just_now_secs * 1000 - diff_ms);
        }
        if diff < 60 {
            return Some(1000 - diff_ms.rem_euclid(1000));
        }
        let minutes = diff / 60;
        if minutes < MINUTES_PER_HOUR {
            return Some((minutes + 1) * 60_000 - diff_ms);
        }
        let hours = minutes / MINUTES_PER_HOUR;
        if hours < MAX_RELATIVE_HOURS {
            return Some((hours + 1) * 3_600_000 - diff_ms);
        }
    }

    // "today at" / "yesterday at" change at the next local midnight.
    let offset = now.offset();
    let then = DateTime::<Utc>::from_timestamp_millis(then_ms)?.with_timezone(offset);
    let days = (now.date_naive() - then.date_naive()).num_days();
    if days != 0 && days != 1 {
        return None;
    }

    let next_midnight = now.date_naive().succ_opt()?.and_hms_opt(0, 0, 0)?;
    let next_midnight = offset.from_local_datetime(&next_midnight).single()?;
    Some((next_midnight.timestamp_millis() - now_ms).max(0))
}
