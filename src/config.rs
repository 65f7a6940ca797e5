use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the time-series store
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Directory for durable storage. `None` disables persistence: eviction
    /// becomes a pure in-memory drop and cold reads see no data.
    pub dir: Option<PathBuf>,

    /// Retention window in days: only the last `retention_days` closed days
    /// are queryable (default: 30)
    pub retention_days: u32,

    /// Maximum number of closed days resident in memory (default: 10)
    pub resident_limit: usize,

    /// Recover current day number and users from disk on startup (default: false)
    pub recover: bool,

    /// When set, a background task rotates the current day at this interval
    pub rotation_interval: Option<Duration>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            dir: None,
            retention_days: 30,
            resident_limit: 10,
            recover: false,
            rotation_interval: None,
        }
    }
}

impl DbConfig {
    /// Create a new config persisting to the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            ..Default::default()
        }
    }

    /// Create a memory-only config (no persistence, no recovery)
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Set the retention window length in days
    pub fn retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Set the maximum number of in-memory resident closed days
    pub fn resident_limit(mut self, limit: usize) -> Self {
        self.resident_limit = limit;
        self
    }

    /// Enable recovery from persisted state on startup
    pub fn recover(mut self, enabled: bool) -> Self {
        self.recover = enabled;
        self
    }

    /// Enable periodic day rotation
    pub fn rotation_interval(mut self, interval: Duration) -> Self {
        self.rotation_interval = Some(interval);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DbConfig::default();
        assert_eq!(config.dir, None);
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.resident_limit, 10);
        assert!(!config.recover);
        assert!(config.rotation_interval.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/tallydb")
            .retention_days(7)
            .resident_limit(3)
            .recover(true)
            .rotation_interval(Duration::from_secs(60));

        assert_eq!(config.dir, Some(PathBuf::from("/tmp/tallydb")));
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.resident_limit, 3);
        assert!(config.recover);
        assert_eq!(config.rotation_interval, Some(Duration::from_secs(60)));
    }
}
