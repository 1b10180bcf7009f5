use crate::markup::MarkupStrategy;
use crate::payload::{Payload, SourceProfile};
use crate::structured::StructuredStrategy;
use listwatch_core::Record;
use std::collections::HashSet;
use tracing::debug;

/// Upper bound on the records one page yields.
pub const MAX_RECORDS: usize = 20;

/// One way of reading listings out of a response body.
///
/// Strategies never fail: anything they cannot read is skipped, and an
/// unreadable payload yields an empty list.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, payload: &Payload, profile: &SourceProfile) -> Vec<Record>;
}

/// Runs strategies in priority order and keeps the first non-empty result.
pub struct Extractor {
    profile: SourceProfile,
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Extractor {
    /// Structured data first, markup heuristics as the fallback.
    pub fn new(profile: SourceProfile) -> Self {
        Self::with_strategies(
            profile,
            vec![Box::new(StructuredStrategy), Box::new(MarkupStrategy)],
        )
    }

    pub fn with_strategies(profile: SourceProfile, strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { profile, strategies }
    }

    pub fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    pub fn extract(&self, payload: &Payload) -> Vec<Record> {
        for strategy in &self.strategies {
            let mut records = strategy.extract(payload, &self.profile);
            let mut seen = HashSet::new();
            records.retain(|record| seen.insert(record.id.clone()));
            if !records.is_empty() {
                records.truncate(MAX_RECORDS);
                debug!("Strategy {} recovered {} listings", strategy.name(), records.len());
                return records;
            }
            debug!("Strategy {} found nothing", strategy.name());
        }
        Vec::new()
    }
}
