use listwatch_core::{Result, WatchError, DEFAULT_CURRENCY};
use url::Url;

/// How a response body should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentShape {
    Html,
    Json,
}

impl ContentShape {
    /// Shape declared by a `Content-Type` header, falling back to sniffing the
    /// body for a leading `{` or `[`.
    pub fn detect(content_type: Option<&str>, body: &str) -> Self {
        if let Some(content_type) = content_type {
            let content_type = content_type.to_ascii_lowercase();
            if content_type.contains("json") {
                return ContentShape::Json;
            }
            if content_type.contains("html") {
                return ContentShape::Html;
            }
        }

        match body.trim_start().chars().next() {
            Some('{') | Some('[') => ContentShape::Json,
            _ => ContentShape::Html,
        }
    }
}

/// A raw response body plus its shape.
#[derive(Debug, Clone)]
pub struct Payload {
    pub body: String,
    pub shape: ContentShape,
}

impl Payload {
    pub fn new(body: impl Into<String>, shape: ContentShape) -> Self {
        Self {
            body: body.into(),
            shape,
        }
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::new(body, ContentShape::Html)
    }

    pub fn json(body: impl Into<String>) -> Self {
        Self::new(body, ContentShape::Json)
    }

    pub fn detect(content_type: Option<&str>, body: impl Into<String>) -> Self {
        let body = body.into();
        let shape = ContentShape::detect(content_type, &body);
        Self { body, shape }
    }
}

/// What the strategies need to know about the marketplace they read.
#[derive(Debug, Clone)]
pub struct SourceProfile {
    pub origin: Url,
    pub item_path: String,
    pub default_currency: String,
    pub structured_placeholder: String,
    pub markup_placeholder: String,
}

impl SourceProfile {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            item_path: "/items/".to_string(),
            default_currency: DEFAULT_CURRENCY.to_string(),
            structured_placeholder: "Untitled".to_string(),
            markup_placeholder: "Item".to_string(),
        }
    }

    pub fn from_origin(origin: &str) -> Result<Self> {
        let origin = Url::parse(origin)?;
        if origin.cannot_be_a_base() {
            return Err(WatchError::Config(format!("origin {} cannot be a base URL", origin)));
        }
        Ok(Self::new(origin))
    }

    /// Resolves a possibly relative link against the origin.
    pub fn resolve(&self, link: &str) -> Option<Url> {
        let link = link.trim();
        if link.is_empty() {
            return None;
        }
        self.origin.join(link).ok()
    }

    /// Canonical listing URL for an id: `{origin}/items/{id}`.
    pub fn item_url(&self, id: &str) -> Option<Url> {
        self.resolve(&format!("{}{}", self.item_path, id))
    }
}
