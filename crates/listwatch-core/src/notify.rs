use crate::display::RecordDisplay;
use crate::{OwnerId, Record, Result, WatchError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, warn};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Delivers "new listing" events to the recipient that owns the query.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &OwnerId, record: &Record, query_label: &str) -> Result<()>;
}

/// Writes each event to the tracing log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: &OwnerId, record: &Record, query_label: &str) -> Result<()> {
        info!(
            recipient = %recipient,
            query = query_label,
            id = %record.id,
            price = %record.price,
            url = %record.url,
            "New listing: {}",
            record.title
        );
        Ok(())
    }
}

/// Prints each event to standard output.
#[derive(Debug, Default, Clone)]
pub struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn notify(&self, recipient: &OwnerId, record: &Record, query_label: &str) -> Result<()> {
        println!("[{}] {}", recipient, RecordDisplay::new(record, Some(query_label)).format());
        Ok(())
    }
}

/// Sends each event as a Telegram bot message to the chat whose id is the
/// recipient id. Listings with a photo go out via `sendPhoto`, falling back to
/// a plain `sendMessage` when Telegram refuses the image.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    token: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: TELEGRAM_API_BASE.to_string(),
            token: token.into(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn caption(record: &Record, query_label: &str) -> String {
        format!(
            "🆕 <b>{}</b>\n💰 {} {}\n🔎 {}\n🔗 <a href='{}'>View</a>",
            escape_html(&record.title),
            escape_html(record.price.as_str()),
            escape_html(&record.currency),
            escape_html(query_label),
            escape_html(record.url.as_str()),
        )
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<()> {
        let url = format!("{}/bot{}/{}", self.api_base, self.token, method);
        // Errors are stripped of the URL, which carries the bot token.
        self.client
            .post(url)
            .json(&body)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| WatchError::Notification(format!("{} failed: {}", method, e.without_url())))?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, recipient: &OwnerId, record: &Record, query_label: &str) -> Result<()> {
        let caption = Self::caption(record, query_label);

        if let Some(photo) = &record.photo {
            let sent = self
                .call(
                    "sendPhoto",
                    json!({
                        "chat_id": recipient.as_str(),
                        "photo": photo.as_str(),
                        "caption": caption,
                        "parse_mode": "HTML",
                    }),
                )
                .await;
            match sent {
                Ok(()) => {
                    debug!("Sent photo for listing {} to {}", record.id, recipient);
                    return Ok(());
                }
                Err(e) => warn!("Photo message for listing {} failed, sending text: {}", record.id, e),
            }
        }

        self.call(
            "sendMessage",
            json!({
                "chat_id": recipient.as_str(),
                "text": caption,
                "parse_mode": "HTML",
            }),
        )
        .await
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&#39;")
        .replace('"', "&quot;")
}
