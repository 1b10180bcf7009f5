use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
    #[error("Scraping error: {0}")]
    Scraping(String),
    #[error("Notification error: {0}")]
    Notification(String),
    #[error("Registry error: {0}")]
    Registry(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, WatchError>;
