use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Currency symbol used when the source does not state one.
pub const DEFAULT_CURRENCY: &str = "€";

/// Sentinel written in place of a price that could not be recovered.
pub const UNKNOWN_PRICE: &str = "unknown";

/// A listing price, kept as the decimal text the source printed.
///
/// Prices are never stored as floats: `"80.00"` and `"80"` stay distinct and
/// no rounding happens between polls. Serialized as a plain string, with
/// [`UNKNOWN_PRICE`] standing for [`Price::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Price {
    Amount(String),
    Unknown,
}

impl Price {
    /// Builds a price from source text. A numeric amount is normalized to a
    /// period decimal mark with grouping separators removed.
    pub fn amount(text: impl AsRef<str>) -> Self {
        let text = text.as_ref().trim();
        if text.is_empty() || text == UNKNOWN_PRICE {
            Price::Unknown
        } else {
            Price::Amount(normalize_amount(text))
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Price::Amount(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Price::Amount(amount) => amount,
            Price::Unknown => UNKNOWN_PRICE,
        }
    }
}

/// A trailing group of one or two digits after `.` or `,` is the decimal
/// part; every other separator groups thousands. A lone `.` is kept as the
/// decimal mark whatever follows it. Non-numeric text is returned unchanged.
fn normalize_amount(text: &str) -> String {
    if !text.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return text.to_string();
    }
    let Some(pos) = text.rfind(['.', ',']) else {
        return text.to_string();
    };

    let digits = |part: &str| part.chars().filter(char::is_ascii_digit).collect::<String>();
    let fraction = &text[pos + 1..];
    if (1..=2).contains(&fraction.len()) {
        format!("{}.{}", digits(&text[..pos]), fraction)
    } else if text.matches(['.', ',']).count() == 1 && text[pos..].starts_with('.') {
        text.to_string()
    } else {
        digits(text)
    }
}

impl From<String> for Price {
    fn from(value: String) -> Self {
        Price::amount(value)
    }
}

impl From<Price> for String {
    fn from(value: Price) -> Self {
        match value {
            Price::Amount(amount) => amount,
            Price::Unknown => UNKNOWN_PRICE.to_string(),
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One listing as surfaced by a marketplace search.
///
/// Identity is carried by `id` alone: two records with the same id are the
/// same listing even when title, price or photo differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub title: String,
    pub price: Price,
    pub currency: String,
    pub url: Url,
    pub photo: Option<Url>,
}

impl Record {
    pub fn new(id: impl Into<String>, title: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            price: Price::Unknown,
            currency: DEFAULT_CURRENCY.to_string(),
            url,
            photo: None,
        }
    }

    pub fn with_price(mut self, price: Price, currency: impl Into<String>) -> Self {
        self.price = price;
        self.currency = currency.into();
        self
    }

    pub fn with_photo(mut self, photo: Option<Url>) -> Self {
        self.photo = photo;
        self
    }

    /// Whether `other` is the same listing, ignoring every field but `id`.
    pub fn same_listing(&self, other: &Record) -> bool {
        self.id == other.id
    }
}
