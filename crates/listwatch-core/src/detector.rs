use crate::config::TimestampPolicy;
use crate::{ExtractionOutcome, ListingSource, OwnerId, QueryId, Record, Registry, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Records of `current` whose id does not appear in `previous`, in the order
/// `current` lists them. An id repeated within `current` is reported once.
pub fn diff_records(previous: &[Record], current: &[Record]) -> Vec<Record> {
    let mut seen: HashSet<&str> = previous.iter().map(|record| record.id.as_str()).collect();
    current
        .iter()
        .filter(|record| seen.insert(record.id.as_str()))
        .cloned()
        .collect()
}

/// Compares what a query's source shows now with what it showed last time.
pub struct ChangeDetector {
    source: Arc<dyn ListingSource>,
    policy: TimestampPolicy,
}

impl ChangeDetector {
    pub fn new(source: Arc<dyn ListingSource>) -> Self {
        Self {
            source,
            policy: TimestampPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: TimestampPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn diff_and_update(
        &self,
        registry: &Registry,
        owner_id: &OwnerId,
        query_id: QueryId,
    ) -> Result<Vec<Record>> {
        self.diff_and_update_at(registry, owner_id, query_id, Utc::now()).await
    }

    /// Fetches the query's listings and returns the ones not seen before.
    ///
    /// A found set replaces `last_seen` wholesale. An inconclusive fetch
    /// leaves `last_seen` as it was, so listings are never reported as gone
    /// and a transient failure never causes a burst of re-notifications.
    pub async fn diff_and_update_at(
        &self,
        registry: &Registry,
        owner_id: &OwnerId,
        query_id: QueryId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Record>> {
        let Some(query) = registry.get(owner_id, query_id).await else {
            debug!("Query {} of owner {} is gone, nothing to diff", query_id, owner_id);
            return Ok(Vec::new());
        };

        // Fetch without holding the registry lock.
        let outcome = self.source.fetch_listings(&query.query_spec).await;

        let current = match outcome {
            ExtractionOutcome::Found(records) => records,
            ExtractionOutcome::Inconclusive(reason) => {
                warn!("Query {} ({}): {}", query_id, query.label, reason);
                if self.policy == TimestampPolicy::Always {
                    registry
                        .update(owner_id, query_id, |query| query.last_polled_at = Some(now))
                        .await?;
                }
                return Ok(Vec::new());
            }
        };

        // Diff against the stored set under the lock, so a concurrent update
        // of the same query cannot interleave between read and write.
        let new_records = registry
            .update(owner_id, query_id, move |query| {
                let new_records = diff_records(&query.last_seen, &current);
                query.last_seen = current;
                query.last_polled_at = Some(now);
                new_records
            })
            .await?
            .unwrap_or_default();

        if !new_records.is_empty() {
            info!("Query {} ({}): {} new listings", query_id, query.label, new_records.len());
        }
        Ok(new_records)
    }
}
