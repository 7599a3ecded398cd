//! Dedup tracker: two interchangeable backings behind one contract, an
//! in-memory set, or an embedded SQLite store. `save`/`load` are no-ops in
//! memory mode; the persistent backing commits on every mutating call so a
//! crash mid-run never loses a seen-id.

mod sqlite;

pub use sqlite::SqliteDedupStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::RwLock;

use crate::errors::AppResult;

/// Shared contract for both backings.
#[async_trait]
pub trait DedupTracker: Send + Sync {
    async fn has_seen(&self, id: &str) -> AppResult<bool>;
    async fn mark_seen(&self, id: &str) -> AppResult<()>;
    async fn get_last_collection_time(&self) -> AppResult<Option<DateTime<Utc>>>;
    async fn update_collection_time(&self) -> AppResult<()>;
    /// Commit any pending writes. No-op in memory mode.
    async fn save(&self) -> AppResult<()>;
    /// Rebuild in-memory caches from the backing store. No-op in memory mode.
    async fn load(&self) -> AppResult<()>;
}

/// In-memory backing: a set of identifiers and one optional last-run
/// timestamp, guarded by a single lock since the contract only promises
/// serial correctness.
#[derive(Default)]
pub struct InMemoryDedupTracker {
    state: RwLock<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    seen: HashSet<String>,
    last_collection_time: Option<DateTime<Utc>>,
}

impl InMemoryDedupTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupTracker for InMemoryDedupTracker {
    async fn has_seen(&self, id: &str) -> AppResult<bool> {
        Ok(self.state.read().unwrap().seen.contains(id))
    }

    async fn mark_seen(&self, id: &str) -> AppResult<()> {
        self.state.write().unwrap().seen.insert(id.to_string());
        Ok(())
    }

    async fn get_last_collection_time(&self) -> AppResult<Option<DateTime<Utc>>> {
        Ok(self.state.read().unwrap().last_collection_time)
    }

    async fn update_collection_time(&self) -> AppResult<()> {
        self.state.write().unwrap().last_collection_time = Some(Utc::now());
        Ok(())
    }

    async fn save(&self) -> AppResult<()> {
        Ok(())
    }

    async fn load(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mark_then_has_seen_is_always_true() {
        let tracker = InMemoryDedupTracker::new();
        assert!(!tracker.has_seen("abc").await.unwrap());
        tracker.mark_seen("abc").await.unwrap();
        assert!(tracker.has_seen("abc").await.unwrap());
    }

    #[tokio::test]
    async fn no_collection_time_until_updated() {
        let tracker = InMemoryDedupTracker::new();
        assert!(tracker.get_last_collection_time().await.unwrap().is_none());
        tracker.update_collection_time().await.unwrap();
        assert!(tracker.get_last_collection_time().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn save_and_load_are_noops_in_memory() {
        let tracker = InMemoryDedupTracker::new();
        tracker.mark_seen("x").await.unwrap();
        tracker.save().await.unwrap();
        tracker.load().await.unwrap();
        assert!(tracker.has_seen("x").await.unwrap());
    }
}
