//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

pub const DEFAULT_LIST_CACHE_KEY: &str = "workout_list_cache";
pub const DEFAULT_PAGINATION_CACHE_KEY: &str = "workout_pagination_cache";

/// Sync engine configuration.
///
/// Missing fields in JSON fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Records requested per remote page
    pub page_size: u32,
    /// Upper bound on a single remote fetch, in seconds
    pub request_timeout_secs: u64,
    /// Refresh in the background after serving a warm cache
    pub background_refresh: bool,
    /// Cache key for the serialized record list
    pub list_cache_key: String,
    /// Cache key for the serialized pagination info
    pub pagination_cache_key: String,
    /// Buffered events per subscriber before the slowest one starts lagging
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            request_timeout_secs: 30,
            background_refresh: true,
            list_cache_key: DEFAULT_LIST_CACHE_KEY.to_string(),
            pagination_cache_key: DEFAULT_PAGINATION_CACHE_KEY.to_string(),
            event_capacity: 64,
        }
    }
}

impl SyncConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SyncConfig = serde_json::from_str(json).map_err(|e| SyncError::Config {
            message: format!("invalid sync config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(SyncError::config("page_size must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(SyncError::config("request_timeout_secs must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(SyncError::config("event_capacity must be at least 1"));
        }
        if self.list_cache_key.is_empty() || self.pagination_cache_key.is_empty() {
            return Err(SyncError::config("cache keys must not be empty"));
        }
        if self.list_cache_key == self.pagination_cache_key {
            return Err(SyncError::config(format!(
                "list and pagination cache keys must differ (both '{}')",
                self.list_cache_key
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.page_size, 10);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SyncConfig::from_json(r#"{"page_size": 25, "background_refresh": false}"#)
            .unwrap();
        assert_eq!(config.page_size, 25);
        assert!(!config.background_refresh);
        assert_eq!(config.list_cache_key, DEFAULT_LIST_CACHE_KEY);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(matches!(
            SyncConfig::from_json(r#"{"page_size": 0}"#),
            Err(SyncError::Config { .. })
        ));
        assert!(matches!(
            SyncConfig::from_json(r#"{"list_cache_key": "k", "pagination_cache_key": "k"}"#),
            Err(SyncError::Config { .. })
        ));
        assert!(SyncConfig::from_json("{not json").is_err());
    }
}
