use crate::{ChangeDetector, Notifier, Registry};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Counters from one pass over the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub polled: usize,
    pub skipped: usize,
    pub new_records: usize,
    pub notified: usize,
    pub failed_queries: usize,
    pub failed_notifications: usize,
}

/// One full pass over every registered query, run on the scheduler's timer.
///
/// Queries are processed strictly one after another with a pacing delay
/// between fetches. A failing query or notification is logged and the cycle
/// moves on.
pub struct PollCycle {
    registry: Arc<Registry>,
    detector: ChangeDetector,
    notifier: Arc<dyn Notifier>,
    pacing_delay: Duration,
}

impl PollCycle {
    pub fn new(registry: Arc<Registry>, detector: ChangeDetector, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            registry,
            detector,
            notifier,
            pacing_delay: Duration::from_secs(crate::config::DEFAULT_PACING_DELAY_SECS),
        }
    }

    pub fn with_pacing_delay(mut self, pacing_delay: Duration) -> Self {
        self.pacing_delay = pacing_delay;
        self
    }

    pub async fn run(&self) -> CycleReport {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();
        let keys = self.registry.keys().await;
        info!("Poll cycle started: {} queries", keys.len());

        for (owner_id, query_id) in keys {
            let Some(query) = self.registry.get(&owner_id, query_id).await else {
                continue;
            };
            if !query.is_due(now) {
                debug!("Query {} of {} not due yet", query_id, owner_id);
                report.skipped += 1;
                continue;
            }

            if report.polled > 0 && !self.pacing_delay.is_zero() {
                tokio::time::sleep(self.pacing_delay).await;
            }
            report.polled += 1;

            let new_records = match self
                .detector
                .diff_and_update_at(&self.registry, &owner_id, query_id, now)
                .await
            {
                Ok(records) => records,
                Err(e) => {
                    error!("Query {} of {} failed: {}", query_id, owner_id, e);
                    report.failed_queries += 1;
                    continue;
                }
            };
            report.new_records += new_records.len();

            for record in &new_records {
                match self.notifier.notify(&owner_id, record, &query.label).await {
                    Ok(()) => report.notified += 1,
                    Err(e) => {
                        error!("Notifying {} about listing {} failed: {}", owner_id, record.id, e);
                        report.failed_notifications += 1;
                    }
                }
            }
        }

        info!(
            "Poll cycle finished: {} polled, {} skipped, {} new, {} failed",
            report.polled, report.skipped, report.new_records, report.failed_queries
        );
        report
    }
}
