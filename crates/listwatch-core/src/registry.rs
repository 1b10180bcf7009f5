use crate::store::RegistryStore;
use crate::{OwnerId, Query, QueryId, RegistryState, Result, WatchError};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Label given to queries registered without one.
pub const DEFAULT_LABEL: &str = "Search";

/// The set of monitored queries, grouped by owner.
///
/// Constructed once and shared (`Arc<Registry>`) between the poll cycle and
/// whatever front end registers queries. Every mutation re-reads the store,
/// applies the change to that fresh copy, persists it, and only then makes it
/// visible. Changes written by other processes sharing the store survive, and
/// a failed save leaves the registry exactly as it was.
pub struct Registry {
    state: Mutex<RegistryState>,
    store: Arc<dyn RegistryStore>,
    default_interval: Duration,
}

impl Registry {
    /// Loads the persisted state from `store`.
    pub async fn open(store: Arc<dyn RegistryStore>, default_interval: Duration) -> Result<Self> {
        let state = store.load().await?;
        info!("Registry opened with {} queries", state.query_count());
        Ok(Self {
            state: Mutex::new(state),
            store,
            default_interval,
        })
    }

    pub async fn register(
        &self,
        owner_id: &OwnerId,
        query_spec: &str,
        label: &str,
        interval: Option<Duration>,
    ) -> Result<QueryId> {
        let query_spec = query_spec.trim();
        if query_spec.is_empty() {
            return Err(WatchError::Registry("query spec must not be empty".to_string()));
        }
        let label = match label.trim() {
            "" => DEFAULT_LABEL,
            label => label,
        };

        let query = Query::new(
            owner_id.clone(),
            query_spec,
            label,
            interval.unwrap_or(self.default_interval),
            Utc::now(),
        );
        let id = self.commit(|state| state.insert(query)).await?;
        info!("Registered query {} for owner {}: {}", id, owner_id, label);
        Ok(id)
    }

    /// Removes a query. Returns `false` when the owner has no such query.
    pub async fn unregister(&self, owner_id: &OwnerId, query_id: QueryId) -> Result<bool> {
        let mut state = self.state.lock().await;
        let mut next = self.store.load().await?;
        if next.remove(owner_id, query_id).is_none() {
            debug!("Owner {} has no query {}", owner_id, query_id);
            *state = next;
            return Ok(false);
        }

        self.store.save(&next).await?;
        *state = next;

        info!("Removed query {} for owner {}", query_id, owner_id);
        Ok(true)
    }

    /// The owner's queries. Other owners' queries are never visible here.
    pub async fn list(&self, owner_id: &OwnerId) -> BTreeMap<QueryId, Query> {
        self.state
            .lock()
            .await
            .owners
            .get(owner_id)
            .map(|owner| owner.queries.clone())
            .unwrap_or_default()
    }

    pub async fn get(&self, owner_id: &OwnerId, query_id: QueryId) -> Option<Query> {
        self.state.lock().await.get(owner_id, query_id).cloned()
    }

    /// Every `(owner, query)` pair, owners and ids in ascending order.
    pub async fn keys(&self) -> Vec<(OwnerId, QueryId)> {
        self.state.lock().await.keys()
    }

    pub async fn owners(&self) -> Vec<OwnerId> {
        self.state.lock().await.owners.keys().cloned().collect()
    }

    pub async fn snapshot(&self) -> RegistryState {
        self.state.lock().await.clone()
    }

    /// Replaces the in-memory state with what the store holds now.
    pub async fn reload(&self) -> Result<()> {
        let loaded = self.store.load().await?;
        *self.state.lock().await = loaded;
        Ok(())
    }

    /// Applies `mutate` to one query and persists only that query, all under
    /// the registry lock. Returns `None` when the query no longer exists in
    /// the store.
    pub async fn update<T>(
        &self,
        owner_id: &OwnerId,
        query_id: QueryId,
        mutate: impl FnOnce(&mut Query) -> T,
    ) -> Result<Option<T>> {
        let mut state = self.state.lock().await;
        let mut next = self.store.load().await?;
        let Some(query) = next.get_mut(owner_id, query_id) else {
            debug!("Query {} of owner {} was removed from the store", query_id, owner_id);
            *state = next;
            return Ok(None);
        };

        let out = mutate(query);
        self.store.save_query(owner_id, query_id, query).await?;
        *state = next;
        Ok(Some(out))
    }

    async fn commit<T>(&self, mutate: impl FnOnce(&mut RegistryState) -> T) -> Result<T> {
        let mut state = self.state.lock().await;
        let mut next = self.store.load().await?;
        let out = mutate(&mut next);
        self.store.save(&next).await?;
        *state = next;
        Ok(out)
    }
}
