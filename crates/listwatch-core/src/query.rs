use crate::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Slack allowed when deciding whether a query is due. Cycles run on a timer
/// of the same length as the default poll interval, and the time each cycle
/// actually starts drifts by a few seconds.
pub const DUE_TOLERANCE: Duration = Duration::from_secs(5);

/// Opaque identifier of the recipient that registered a query.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of a query, unique within its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub u64);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One monitored search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub owner_id: OwnerId,
    pub query_spec: String,
    pub label: String,
    #[serde(default)]
    pub last_seen: Vec<Record>,
    #[serde(default)]
    pub last_polled_at: Option<DateTime<Utc>>,
    #[serde(rename = "poll_interval_secs", with = "duration_secs")]
    pub poll_interval: Duration,
    pub created_at: DateTime<Utc>,
}

impl Query {
    pub fn new(
        owner_id: OwnerId,
        query_spec: impl Into<String>,
        label: impl Into<String>,
        poll_interval: Duration,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id,
            query_spec: query_spec.into(),
            label: label.into(),
            last_seen: Vec::new(),
            last_polled_at: None,
            poll_interval,
            created_at,
        }
    }

    /// Whether the poll interval, less [`DUE_TOLERANCE`], has elapsed since
    /// the last recorded poll.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let Some(last) = self.last_polled_at else {
            return true;
        };
        let interval = self.poll_interval.saturating_sub(DUE_TOLERANCE);
        chrono::Duration::from_std(interval)
            .map(|interval| now - last >= interval)
            .unwrap_or(false)
    }
}

/// Queries registered by one owner, plus the counter their ids come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerQueries {
    pub next_id: u64,
    #[serde(default)]
    pub queries: BTreeMap<QueryId, Query>,
}

impl Default for OwnerQueries {
    fn default() -> Self {
        Self {
            next_id: 1,
            queries: BTreeMap::new(),
        }
    }
}

/// Everything the registry persists: `owner_id -> query_id -> Query`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryState {
    #[serde(default)]
    pub owners: BTreeMap<OwnerId, OwnerQueries>,
}

impl RegistryState {
    /// Adds a query under `query.owner_id` and returns its id.
    ///
    /// Ids are taken from a per-owner counter that only moves forward, so a
    /// removed id is never handed out again.
    pub fn insert(&mut self, query: Query) -> QueryId {
        let owner = self.owners.entry(query.owner_id.clone()).or_default();
        let id = QueryId(owner.next_id);
        owner.next_id += 1;
        owner.queries.insert(id, query);
        id
    }

    pub fn remove(&mut self, owner_id: &OwnerId, query_id: QueryId) -> Option<Query> {
        self.owners
            .get_mut(owner_id)
            .and_then(|owner| owner.queries.remove(&query_id))
    }

    pub fn get(&self, owner_id: &OwnerId, query_id: QueryId) -> Option<&Query> {
        self.owners
            .get(owner_id)
            .and_then(|owner| owner.queries.get(&query_id))
    }

    pub fn get_mut(&mut self, owner_id: &OwnerId, query_id: QueryId) -> Option<&mut Query> {
        self.owners
            .get_mut(owner_id)
            .and_then(|owner| owner.queries.get_mut(&query_id))
    }

    /// All `(owner, query)` pairs in stable order.
    pub fn keys(&self) -> Vec<(OwnerId, QueryId)> {
        self.owners
            .iter()
            .flat_map(|(owner_id, owner)| {
                owner.queries.keys().map(move |id| (owner_id.clone(), *id))
            })
            .collect()
    }

    pub fn query_count(&self) -> usize {
        self.owners.values().map(|owner| owner.queries.len()).sum()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
