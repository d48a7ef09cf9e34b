use std::path::PathBuf;
use std::time::Duration;

use crate::limits::*;
use crate::model::Minutes;

/// Scheduling constants consulted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingPolicy {
    pub buffer_minutes: Minutes,
    pub day_start: Minutes,
    pub day_end: Minutes,
    pub min_duration: Minutes,
    pub suggestion_step: Minutes,
    pub last_suggestion_start: Minutes,
    pub max_suggestions: usize,
    pub sweep_min_interval: chrono::Duration,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            buffer_minutes: BUFFER_MINUTES,
            day_start: DAY_START,
            day_end: DAY_END,
            min_duration: MIN_BOOKING_MINUTES,
            suggestion_step: SUGGESTION_STEP_MINUTES,
            last_suggestion_start: LAST_SUGGESTION_START,
            max_suggestions: MAX_SUGGESTIONS,
            sweep_min_interval: chrono::Duration::seconds(SWEEP_MIN_INTERVAL_SECS),
        }
    }
}

/// Daemon configuration, read from `HALLBOOK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub sweep_interval: Duration,
    pub compact_threshold: u64,
    pub policy: SchedulingPolicy,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("HALLBOOK_DATA_DIR").unwrap_or_else(|| "./data".into());
        let metrics_port: Option<u16> = lookup("HALLBOOK_METRICS_PORT").and_then(|s| s.parse().ok());
        let sweep_secs: u64 = lookup("HALLBOOK_SWEEP_INTERVAL_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(SWEEP_MIN_INTERVAL_SECS as u64);
        let compact_threshold: u64 = lookup("HALLBOOK_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);

        let mut policy = SchedulingPolicy::default();
        if let Some(buffer) = lookup("HALLBOOK_BUFFER_MINUTES")
            .and_then(|s| s.parse::<Minutes>().ok())
            .filter(|b| *b >= 0)
        {
            policy.buffer_minutes = buffer;
        }

        Self {
            data_dir: PathBuf::from(data_dir),
            metrics_port,
            sweep_interval: Duration::from_secs(sweep_secs.max(1)),
            compact_threshold,
            policy,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(lookup(&[]));
        assert_eq!(cfg.data_dir, PathBuf::from("./data"));
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(cfg.sweep_interval, Duration::from_secs(300));
        assert_eq!(cfg.compact_threshold, 1000);
        assert_eq!(cfg.policy, SchedulingPolicy::default());
        assert_eq!(cfg.policy.buffer_minutes, 44);
        assert_eq!(cfg.wal_path(), PathBuf::from("./data/reservations.wal"));
    }

    #[test]
    fn overrides_from_env() {
        let cfg = Config::from_lookup(lookup(&[
            ("HALLBOOK_DATA_DIR", "/var/lib/hallbook"),
            ("HALLBOOK_METRICS_PORT", "9100"),
            ("HALLBOOK_SWEEP_INTERVAL_SECS", "60"),
            ("HALLBOOK_BUFFER_MINUTES", "15"),
        ]));
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/hallbook"));
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(60));
        assert_eq!(cfg.policy.buffer_minutes, 15);
    }

    #[test]
    fn garbage_values_fall_back() {
        let cfg = Config::from_lookup(lookup(&[
            ("HALLBOOK_METRICS_PORT", "not-a-port"),
            ("HALLBOOK_BUFFER_MINUTES", "-5"),
            ("HALLBOOK_SWEEP_INTERVAL_SECS", "0"),
        ]));
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(cfg.policy.buffer_minutes, 44);
        assert_eq!(cfg.sweep_interval, Duration::from_secs(1));
    }
}
