pub mod config;
mod detector;
mod display;
mod error;
mod notify;
mod poll;
mod query;
mod record;
mod registry;
mod source;
pub mod store;

pub use config::{TimestampPolicy, WatchConfig};
pub use detector::{diff_records, ChangeDetector};
pub use display::{create_query_table, QueryTableRow, RecordDisplay};
pub use error::{Result, WatchError};
pub use notify::{LogNotifier, Notifier, StdoutNotifier, TelegramNotifier, TELEGRAM_API_BASE};
pub use poll::{CycleReport, PollCycle};
pub use query::{OwnerId, OwnerQueries, Query, QueryId, RegistryState, DUE_TOLERANCE};
pub use record::{Price, Record, DEFAULT_CURRENCY, UNKNOWN_PRICE};
pub use registry::{Registry, DEFAULT_LABEL};
pub use source::{ExtractionOutcome, InconclusiveReason, ListingSource};
pub use store::{open_store, JsonFileStore, MemoryStore, RegistryStore, SqliteStore};
