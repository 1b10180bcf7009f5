use crate::coordinator::Extractor;
use crate::fetch::{normalize_url, Fetcher, HttpFetcher};
use crate::payload::{Payload, SourceProfile};
use async_trait::async_trait;
use listwatch_core::{ExtractionOutcome, InconclusiveReason, ListingSource, Result, WatchConfig};
use tracing::{debug, info, warn};

/// A marketplace search page turned into listings: fetch, then extract.
pub struct MarketplaceScraper<F: Fetcher> {
    fetcher: F,
    extractor: Extractor,
}

impl MarketplaceScraper<HttpFetcher> {
    /// HTTP-backed scraper for the origin and timeout in `config`.
    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        let profile = SourceProfile::from_origin(&config.origin)?;
        let fetcher = HttpFetcher::new(config.fetch_timeout)?;
        Ok(Self::new(fetcher, Extractor::new(profile)))
    }
}

impl<F: Fetcher> MarketplaceScraper<F> {
    pub fn new(fetcher: F, extractor: Extractor) -> Self {
        Self { fetcher, extractor }
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }
}

#[async_trait]
impl<F: Fetcher> ListingSource for MarketplaceScraper<F> {
    async fn fetch_listings(&self, query_spec: &str) -> ExtractionOutcome {
        let url = normalize_url(query_spec);

        let response = match self.fetcher.fetch(&url).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Fetching {} failed: {}", url, e);
                return ExtractionOutcome::Inconclusive(InconclusiveReason::Transport(e.to_string()));
            }
        };

        if !response.is_success() {
            warn!("{} answered HTTP {}", url, response.status);
            return ExtractionOutcome::Inconclusive(InconclusiveReason::HttpStatus(response.status));
        }

        let payload = Payload::detect(response.content_type.as_deref(), response.body);
        debug!("Extracting from {:?} payload of {}", payload.shape, url);

        let outcome = ExtractionOutcome::from_records(self.extractor.extract(&payload));
        match &outcome {
            ExtractionOutcome::Found(records) => info!("{}: {} listings", url, records.len()),
            ExtractionOutcome::Inconclusive(reason) => warn!("{}: {}", url, reason),
        }
        outcome
    }
}
