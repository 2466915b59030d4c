use std::env;
use std::time::Duration;

use storage::repository::MAX_IN_FILTER;

/// How often a ready tracker persists progress while playing.
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(15);

/// Default length of the recently-watched list.
pub const DEFAULT_RECENT_LIMIT: u32 = 10;

/// Default size of the `SQLite` connection pool.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Tunables for trackers, aggregation and history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackerConfig {
    pub save_interval: Duration,
    pub query_chunk_size: usize,
    pub recent_limit: u32,
    pub db_max_connections: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            save_interval: DEFAULT_SAVE_INTERVAL,
            query_chunk_size: MAX_IN_FILTER,
            recent_limit: DEFAULT_RECENT_LIMIT,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
        }
    }
}

fn positive<T: std::str::FromStr + PartialOrd + Default>(raw: Option<String>) -> Option<T> {
    raw.and_then(|raw| raw.trim().parse::<T>().ok())
        .filter(|value| *value > T::default())
}

impl TrackerConfig {
    /// Read overrides from the environment, falling back to defaults.
    ///
    /// Recognised keys: `PROGRESS_SAVE_INTERVAL_SECS`, `PROGRESS_QUERY_CHUNK`,
    /// `PROGRESS_RECENT_LIMIT`, `PROGRESS_DB_MAX_CONNECTIONS`. Unparseable or
    /// zero values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Self::from_env`], reading keys through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let save_interval = positive::<u64>(lookup("PROGRESS_SAVE_INTERVAL_SECS"))
            .map_or(defaults.save_interval, Duration::from_secs);
        let query_chunk_size = positive::<usize>(lookup("PROGRESS_QUERY_CHUNK"))
            .unwrap_or(defaults.query_chunk_size);
        let recent_limit =
            positive::<u32>(lookup("PROGRESS_RECENT_LIMIT")).unwrap_or(defaults.recent_limit);
        let db_max_connections = positive::<u32>(lookup("PROGRESS_DB_MAX_CONNECTIONS"))
            .unwrap_or(defaults.db_max_connections);

        Self {
            save_interval,
            query_chunk_size,
            recent_limit,
            db_max_connections,
        }
        .normalized()
    }

    #[must_use]
    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self.normalized()
    }

    #[must_use]
    pub fn with_query_chunk_size(mut self, size: usize) -> Self {
        self.query_chunk_size = size;
        self.normalized()
    }

    /// Clamp values into ranges the store and timer accept.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.query_chunk_size = self.query_chunk_size.clamp(1, MAX_IN_FILTER);
        if self.save_interval.is_zero() {
            self.save_interval = DEFAULT_SAVE_INTERVAL;
        }
        if self.recent_limit == 0 {
            self.recent_limit = DEFAULT_RECENT_LIMIT;
        }
        self.db_max_connections = self.db_max_connections.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    #[test]
    fn defaults_match_store_limits() {
        let config = TrackerConfig::default();
        assert_eq!(config.save_interval, Duration::from_secs(15));
        assert_eq!(config.query_chunk_size, 10);
        assert_eq!(config.recent_limit, 10);
    }

    #[test]
    fn chunk_size_is_capped_by_filter_limit() {
        let config = TrackerConfig::default().with_query_chunk_size(50);
        assert_eq!(config.query_chunk_size, MAX_IN_FILTER);
        let config = TrackerConfig::default().with_query_chunk_size(0);
        assert_eq!(config.query_chunk_size, 1);
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = TrackerConfig::from_lookup(lookup(&[
            ("PROGRESS_SAVE_INTERVAL_SECS", " 30 "),
            ("PROGRESS_QUERY_CHUNK", "4"),
            ("PROGRESS_RECENT_LIMIT", "25"),
            ("PROGRESS_DB_MAX_CONNECTIONS", "1"),
        ]));
        assert_eq!(config.save_interval, Duration::from_secs(30));
        assert_eq!(config.query_chunk_size, 4);
        assert_eq!(config.recent_limit, 25);
        assert_eq!(config.db_max_connections, 1);
    }

    #[test]
    fn zero_and_garbage_values_are_ignored() {
        let config = TrackerConfig::from_lookup(lookup(&[
            ("PROGRESS_SAVE_INTERVAL_SECS", "0"),
            ("PROGRESS_QUERY_CHUNK", "lots"),
            ("PROGRESS_RECENT_LIMIT", "-3"),
        ]));
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn lookup_chunk_size_is_capped() {
        let config = TrackerConfig::from_lookup(lookup(&[("PROGRESS_QUERY_CHUNK", "50")]));
        assert_eq!(config.query_chunk_size, MAX_IN_FILTER);
    }

    #[test]
    fn from_env_is_always_normalized() {
        let config = TrackerConfig::from_env();
        assert!((1..=MAX_IN_FILTER).contains(&config.query_chunk_size));
        assert!(!config.save_interval.is_zero());
        assert!(config.recent_limit > 0);
        assert!(config.db_max_connections > 0);
    }

    #[test]
    fn zero_interval_falls_back_to_default() {
        let config = TrackerConfig::default().with_save_interval(Duration::ZERO);
        assert_eq!(config.save_interval, DEFAULT_SAVE_INTERVAL);
    }
}
