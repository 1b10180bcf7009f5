//! Persistence for the query registry.
//!
//! The registry re-reads the store before every mutation and writes back
//! either the whole [`RegistryState`] or, for updates of a single query,
//! just that query.

pub mod json;
pub mod migrations;
pub mod sqlite;

pub use json::JsonFileStore;
pub use sqlite::SqliteStore;

use crate::{OwnerId, Query, QueryId, RegistryState, Result, WatchError};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Load the persisted state, or an empty state when nothing was saved yet.
    async fn load(&self) -> Result<RegistryState>;

    /// Persist the full state. An error means the write is not durable.
    async fn save(&self, state: &RegistryState) -> Result<()>;

    /// Persist one existing query, leaving every other query as stored.
    async fn save_query(&self, owner_id: &OwnerId, query_id: QueryId, query: &Query) -> Result<()> {
        let mut state = self.load().await?;
        let Some(stored) = state.get_mut(owner_id, query_id) else {
            return Err(WatchError::Registry(format!(
                "query {} of owner {} no longer exists",
                query_id, owner_id
            )));
        };
        *stored = query.clone();
        self.save(&state).await
    }
}

/// Opens the store matching the file extension: `.json` files use
/// [`JsonFileStore`], anything else is treated as a SQLite database.
pub async fn open_store(path: impl AsRef<Path>) -> Result<Arc<dyn RegistryStore>> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Arc::new(JsonFileStore::new(path))),
        _ => Ok(Arc::new(SqliteStore::new(path).await?)),
    }
}

/// Keeps the state in process memory. Saves can be made to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<RegistryState>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: RegistryState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> RegistryState {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn load(&self) -> Result<RegistryState> {
        self.state
            .lock()
            .map(|state| state.clone())
            .map_err(|e| WatchError::Registry(e.to_string()))
    }

    async fn save(&self, state: &RegistryState) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(WatchError::Registry("memory store refused the write".to_string()));
        }
        let mut stored = self
            .state
            .lock()
            .map_err(|e| WatchError::Registry(e.to_string()))?;
        *stored = state.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
