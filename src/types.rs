//! Value types shared by the engine, the cache and the remote source.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Current layout of [`CachedPaginationInfo`]; anything else is a cache miss.
pub const CACHE_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Record
// ============================================================================

/// One workout/activity record as delivered by the remote system.
///
/// Two records with the same `id` are the same logical entity regardless of
/// field differences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub start_time: DateTime<Utc>,
    /// Ordering key for the canonical collection
    pub end_time: DateTime<Utc>,
    /// Sport type (e.g., "Run", "Ride")
    pub activity_type: String,
    /// Distance in meters, absent for non-distance activities
    #[serde(default)]
    pub distance_meters: Option<f64>,
    /// Duration in seconds
    pub duration_seconds: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub calories: Option<f64>,
    #[serde(default)]
    pub avg_heart_rate: Option<f64>,
    /// Any further metrics, carried through untouched
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Record {
    /// Create a record with the required fields; optional metrics start empty.
    pub fn new(
        id: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        activity_type: impl Into<String>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            id: id.into(),
            start_time,
            end_time,
            activity_type: activity_type.into(),
            distance_meters: None,
            duration_seconds,
            name: None,
            calories: None,
            avg_heart_rate: None,
            extra: Map::new(),
        }
    }

    pub fn with_distance(mut self, meters: f64) -> Self {
        self.distance_meters = Some(meters);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

// ============================================================================
// Pagination
// ============================================================================

/// Result of one remote fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub records: Vec<Record>,
    /// More records exist older than this page
    pub has_more: bool,
    /// More records exist newer than this page
    pub has_newer: bool,
}

impl PageResult {
    pub fn new(records: Vec<Record>, has_more: bool, has_newer: bool) -> Self {
        Self {
            records,
            has_more,
            has_newer,
        }
    }

    /// A terminal page: nothing returned, nothing further in either direction.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Cursor state describing the canonical collection.
///
/// `newest_id` and `oldest_id` are always derived from the collection they
/// describe and are both `None` iff it is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationState {
    /// Id of the most recent record held; "before" cursor for refresh
    pub newest_id: Option<String>,
    /// Id of the least recent record held; "after" cursor for load-more
    pub oldest_id: Option<String>,
    pub has_more_older: bool,
    pub has_newer_available: bool,
}

/// Serializable snapshot of [`PaginationState`] stored next to the cached
/// collection so a cold start can resume where it left off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPaginationInfo {
    pub version: u32,
    pub newest_id: Option<String>,
    pub oldest_id: Option<String>,
    pub has_more_older: bool,
    pub has_newer_available: bool,
    /// Last successful remote merge
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl CachedPaginationInfo {
    pub fn from_state(state: &PaginationState, last_synced_at: Option<DateTime<Utc>>) -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            newest_id: state.newest_id.clone(),
            oldest_id: state.oldest_id.clone(),
            has_more_older: state.has_more_older,
            has_newer_available: state.has_newer_available,
            last_synced_at,
        }
    }

    pub fn is_current_version(&self) -> bool {
        self.version == CACHE_FORMAT_VERSION
    }
}

// ============================================================================
// Operations
// ============================================================================

/// The three independently tracked engine operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Cache hydrate plus cold fetch or background refresh
    Initial,
    /// Pull records newer than the newest held
    Refresh,
    /// Pull records older than the oldest held
    LoadMore,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Initial,
        OperationKind::Refresh,
        OperationKind::LoadMore,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            OperationKind::Initial => 0,
            OperationKind::Refresh => 1,
            OperationKind::LoadMore => 2,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Initial => write!(f, "initial"),
            OperationKind::Refresh => write!(f, "refresh"),
            OperationKind::LoadMore => write!(f, "load_more"),
        }
    }
}

/// Lifecycle phase of one operation kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OperationPhase {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}

/// What a completed engine call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A page was fetched and committed
    Merged { added: usize, total: usize },
    /// Warm cache served; a background refresh may be running
    FromCache { total: usize },
    /// Precondition not met, nothing fetched
    Skipped,
    /// Superseded or cancelled before commit
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_deserializes_without_optional_metrics() {
        let json = r#"{
            "id": "w-1",
            "start_time": "2024-05-01T07:00:00Z",
            "end_time": "2024-05-01T07:45:00Z",
            "activity_type": "Run",
            "duration_seconds": 2700.0
        }"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "w-1");
        assert_eq!(record.distance_meters, None);
        assert!(record.extra.is_empty());
        assert_eq!(
            record.end_time,
            Utc.with_ymd_and_hms(2024, 5, 1, 7, 45, 0).unwrap()
        );
    }

    #[test]
    fn test_pagination_info_version() {
        let state = PaginationState {
            newest_id: Some("a".into()),
            oldest_id: Some("b".into()),
            has_more_older: true,
            has_newer_available: false,
        };
        let mut info = CachedPaginationInfo::from_state(&state, None);
        assert!(info.is_current_version());
        info.version = 0;
        assert!(!info.is_current_version());
    }

    #[test]
    fn test_operation_kind_display() {
        assert_eq!(OperationKind::LoadMore.to_string(), "load_more");
        let json = serde_json::to_string(&OperationKind::LoadMore).unwrap();
        assert_eq!(json, "\"load_more\"");
    }
}
