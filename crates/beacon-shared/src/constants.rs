/// Width of the "just now" presence window in seconds
pub const JUST_NOW_SECS: i64 = 60;

/// Negative clock skew tolerated before a timestamp stops being "relative"
pub const MAX_FUTURE_SKEW_SECS: i64 = 5 * 60;

/// Relative labels switch from minutes to hours after this many minutes
pub const MINUTES_PER_HOUR: i64 = 60;

/// Hour-based labels stop after this many hours and fall back to day labels
pub const MAX_RELATIVE_HOURS: i64 = 4;

/// Default capacity of the backend request queue
pub const DEFAULT_BACKEND_QUEUE: usize = 256;

/// Age after which an active call with no update is force-released (2 hours)
pub const DEFAULT_CALL_STALE_SECS: u64 = 2 * 60 * 60;

/// Interval of the stale-call sweep
pub const DEFAULT_HOUSEKEEPING_SECS: u64 = 60;
