//! Cache configuration loaded from environment variables.
//!
//! Every setting has a default, so an embedding application can start the
//! cache without any configuration.

use std::time::Duration;

use beacon_shared::constants::{
    DEFAULT_BACKEND_QUEUE, DEFAULT_CALL_STALE_SECS, DEFAULT_HOUSEKEEPING_SECS, JUST_NOW_SECS,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Capacity of the request queue used by the channel-backed backend.
    /// Env: `BEACON_BACKEND_QUEUE`
    /// Default: `256`
    pub backend_queue: usize,

    /// Whether presence refresh starts out paused until the UI reports it is
    /// visible.
    /// Env: `BEACON_START_PAUSED` (true/false)
    /// Default: `true`
    pub start_paused: bool,

    /// Active calls with no update for this long are force-released.
    /// Env: `BEACON_CALL_STALE_SECS`
    /// Default: 2 hours
    pub call_stale_after: Duration,

    /// Interval of the stale-call sweep.
    /// Env: `BEACON_HOUSEKEEPING_SECS`
    /// Default: `60`
    pub housekeeping_interval: Duration,

    /// Width of the "just now" presence window in seconds.
    /// Env: `BEACON_JUST_NOW_SECS`
    pub just_now_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend_queue: DEFAULT_BACKEND_QUEUE,
            start_paused: true,
            call_stale_after: Duration::from_secs(DEFAULT_CALL_STALE_SECS),
            housekeeping_interval: Duration::from_secs(DEFAULT_HOUSEKEEPING_SECS),
            just_now_secs: JUST_NOW_SECS,
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = var("BEACON_BACKEND_QUEUE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.backend_queue = n,
                _ => tracing::warn!(value = %val, "Invalid BEACON_BACKEND_QUEUE, using default"),
            }
        }

        if let Some(val) = var("BEACON_START_PAUSED") {
            config.start_paused = val != "false" && val != "0";
        }

        if let Some(val) = var("BEACON_CALL_STALE_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.call_stale_after = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid BEACON_CALL_STALE_SECS, using default"),
            }
        }

        if let Some(val) = var("BEACON_HOUSEKEEPING_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.housekeeping_interval = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid BEACON_HOUSEKEEPING_SECS, using default"),
            }
        }

        if let Some(val) = var("BEACON_JUST_NOW_SECS") {
            match val.parse::<i64>() {
                Ok(secs) if secs >= 0 => config.just_now_secs = secs,
                _ => tracing::warn!(value = %val, "Invalid BEACON_JUST_NOW_SECS, using default"),
            }
        }

        config
    }

    pub(crate) fn call_stale_after_ms(&self) -> i64 {
        i64::try_from(self.call_stale_after.as_millis()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CacheConfig::from_vars(vars(&[]));
        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.backend_queue, 256);
        assert!(config.start_paused);
        assert_eq!(config.call_stale_after, Duration::from_secs(7200));
    }

    #[test]
    fn test_overrides() {
        let config = CacheConfig::from_vars(vars(&[
            ("BEACON_BACKEND_QUEUE", "16"),
            ("BEACON_START_PAUSED", "false"),
            ("BEACON_CALL_STALE_SECS", "30"),
            ("BEACON_HOUSEKEEPING_SECS", "5"),
            ("BEACON_JUST_NOW_SECS", "0"),
        ]));
        assert_eq!(config.backend_queue, 16);
        assert!(!config.start_paused);
        assert_eq!(config.call_stale_after_ms(), 30_000);
        assert_eq!(config.housekeeping_interval, Duration::from_secs(5));
        assert_eq!(config.just_now_secs, 0);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = CacheConfig::from_vars(vars(&[
            ("BEACON_BACKEND_QUEUE", "0"),
            ("BEACON_CALL_STALE_SECS", "soon"),
            ("BEACON_JUST_NOW_SECS", "-1"),
        ]));
        assert_eq!(config.backend_queue, DEFAULT_BACKEND_QUEUE);
        assert_eq!(config.call_stale_after, Duration::from_secs(DEFAULT_CALL_STALE_SECS));
        assert_eq!(config.just_now_secs, JUST_NOW_SECS);
    }
}
