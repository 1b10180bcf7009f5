use async_trait::async_trait;
use listwatch_core::{OwnerId, Record, Result, WatchError};
use listwatch_scrapers::{FetchResponse, Fetcher};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Serves queued responses per URL. A URL with nothing queued fails like a
/// dropped connection.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, VecDeque<FetchResponse>>>,
}

impl ScriptedFetcher {
    pub fn push(&self, url: &str, status: u16, content_type: &str, body: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(FetchResponse {
                status,
                content_type: Some(content_type.to_string()),
                body: body.into(),
            });
    }

    pub fn push_json(&self, url: &str, body: serde_json::Value) {
        self.push(url, 200, "application/json", body.to_string());
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        self.responses
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|queue| queue.pop_front())
            .ok_or_else(|| WatchError::Scraping(format!("connection reset: {}", url)))
    }
}

#[derive(Default)]
pub struct CollectingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl CollectingNotifier {
    pub fn take(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

#[async_trait]
impl listwatch_core::Notifier for CollectingNotifier {
    async fn notify(&self, recipient: &OwnerId, record: &Record, _query_label: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), record.id.clone()));
        Ok(())
    }
}
