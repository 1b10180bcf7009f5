use crate::Record;
use async_trait::async_trait;
use std::fmt;

/// Why a fetch produced no usable records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InconclusiveReason {
    /// Connection error, timeout or an undecodable body.
    Transport(String),
    /// The source answered with a non-success status.
    HttpStatus(u16),
    /// The page was fetched but no strategy recovered a listing. This covers
    /// both a search with zero matches and a page whose shape changed.
    NoListings,
}

impl fmt::Display for InconclusiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InconclusiveReason::Transport(reason) => write!(f, "transport failure: {}", reason),
            InconclusiveReason::HttpStatus(status) => write!(f, "HTTP {}", status),
            InconclusiveReason::NoListings => write!(f, "no listings currently found"),
        }
    }
}

/// Result of fetching and extracting one search page.
#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    /// At least one record was recovered.
    Found(Vec<Record>),
    Inconclusive(InconclusiveReason),
}

impl ExtractionOutcome {
    /// `Found` for a non-empty list, `Inconclusive(NoListings)` otherwise.
    pub fn from_records(records: Vec<Record>) -> Self {
        if records.is_empty() {
            ExtractionOutcome::Inconclusive(InconclusiveReason::NoListings)
        } else {
            ExtractionOutcome::Found(records)
        }
    }

    pub fn records(&self) -> &[Record] {
        match self {
            ExtractionOutcome::Found(records) => records,
            ExtractionOutcome::Inconclusive(_) => &[],
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            ExtractionOutcome::Found(records) => records,
            ExtractionOutcome::Inconclusive(_) => Vec::new(),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ExtractionOutcome::Found(_))
    }
}

/// Something that can turn a query spec into the listings it currently shows.
///
/// Implementations never fail: transport and parse problems are reported as
/// [`ExtractionOutcome::Inconclusive`].
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch_listings(&self, query_spec: &str) -> ExtractionOutcome;
}
