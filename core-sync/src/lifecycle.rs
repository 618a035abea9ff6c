//! # Engine Lifecycle
//!
//! ```text
//!              fetch_cache_items
//!   Init ───────────────────────> FetchingCache ──> CacheOnly
//!    │                                                 │ fetch_next
//!    │ fetch_next                                      v
//!    │                                          CacheOnlyFetching
//!    v                                                 │
//!  Fetching <──── fetch_next / fetch_latest ──── Normal│Error
//!    │                                                 │
//!    ├── ok, continuation ──> Normal <─────────────────┘
//!    ├── ok, no continuation ──> Complete (fetch_latest only)
//!    └── failure ──> Error (retryable)
//! ```

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// State of a [`PaginatedSyncEngine`](crate::PaginatedSyncEngine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Nothing loaded yet
    Init,
    /// Reading the offline copy
    FetchingCache,
    /// Serving the offline copy, no network page yet
    CacheOnly,
    /// Serving the offline copy while the first network page loads
    CacheOnlyFetching,
    /// Network items loaded, more pages available
    Normal,
    /// A network request is outstanding
    Fetching,
    /// The last forward page has been loaded
    Complete,
    /// The last network request failed; retry by issuing it again
    Error,
}

impl LifecycleState {
    /// States in which a request is outstanding. Commands are rejected here.
    pub fn is_fetching(&self) -> bool {
        matches!(
            self,
            LifecycleState::FetchingCache
                | LifecycleState::Fetching
                | LifecycleState::CacheOnlyFetching
        )
    }

    /// States in which `get_items` serves the offline copy.
    pub fn is_cache_mode(&self) -> bool {
        matches!(
            self,
            LifecycleState::FetchingCache
                | LifecycleState::CacheOnly
                | LifecycleState::CacheOnlyFetching
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Init => "init",
            LifecycleState::FetchingCache => "fetching_cache",
            LifecycleState::CacheOnly => "cache_only",
            LifecycleState::CacheOnlyFetching => "cache_only_fetching",
            LifecycleState::Normal => "normal",
            LifecycleState::Fetching => "fetching",
            LifecycleState::Complete => "complete",
            LifecycleState::Error => "error",
        }
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        LifecycleState::Init
    }
}

impl FromStr for LifecycleState {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "init" => Ok(LifecycleState::Init),
            "fetching_cache" => Ok(LifecycleState::FetchingCache),
            "cache_only" => Ok(LifecycleState::CacheOnly),
            "cache_only_fetching" => Ok(LifecycleState::CacheOnlyFetching),
            "normal" => Ok(LifecycleState::Normal),
            "fetching" => Ok(LifecycleState::Fetching),
            "complete" => Ok(LifecycleState::Complete),
            "error" => Ok(LifecycleState::Error),
            _ => Err(SyncError::InvalidState(s.to_string())),
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The request ran and the item list was updated
    Applied,
    /// Rejected by the entry guard; no event was emitted
    Skipped,
    /// The request failed; a failure event was emitted
    Failed,
    /// The engine was disposed while the request was outstanding
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LifecycleState; 8] = [
        LifecycleState::Init,
        LifecycleState::FetchingCache,
        LifecycleState::CacheOnly,
        LifecycleState::CacheOnlyFetching,
        LifecycleState::Normal,
        LifecycleState::Fetching,
        LifecycleState::Complete,
        LifecycleState::Error,
    ];

    #[test]
    fn test_state_string_conversion() {
        for state in ALL {
            assert_eq!(state.as_str().parse::<LifecycleState>().unwrap(), state);
        }
        assert!("paused".parse::<LifecycleState>().is_err());
    }

    #[test]
    fn test_fetching_and_cache_mode_sets() {
        let fetching: Vec<_> = ALL.iter().filter(|s| s.is_fetching()).collect();
        assert_eq!(fetching.len(), 3);
        assert!(!LifecycleState::Error.is_fetching());

        assert!(LifecycleState::CacheOnlyFetching.is_cache_mode());
        assert!(!LifecycleState::Normal.is_cache_mode());
    }

    #[test]
    fn test_default_is_init() {
        assert_eq!(LifecycleState::default(), LifecycleState::Init);
        assert_eq!(LifecycleState::CacheOnlyFetching.to_string(), "cache_only_fetching");
    }
}
