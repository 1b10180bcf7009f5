pub mod coordinator;
pub mod fetch;
pub mod markup;
pub mod marketplace;
pub mod payload;
pub mod price;
pub mod structured;

pub use coordinator::{ExtractionStrategy, Extractor, MAX_RECORDS};
pub use fetch::{FetchResponse, Fetcher, HttpFetcher};
pub use markup::MarkupStrategy;
pub use marketplace::MarketplaceScraper;
pub use payload::{ContentShape, Payload, SourceProfile};
pub use price::{extract_price, PriceMatch};
pub use structured::StructuredStrategy;
