//! Free-text price recognition.
//!
//! Listing cards print prices in many ways: `€ 12,50`, `12.50 €`,
//! `EUR 1.234,00`, `£8`. Every match in the text is collected, the ones
//! outside a plausible range are dropped and the largest survivor wins, which
//! skips crossed-out discounts and shipping fees printed next to the total.

use once_cell::sync::Lazy;
use regex::Regex;

pub const MIN_PRICE: f64 = 0.01;
pub const MAX_PRICE: f64 = 99_999.0;

const NUMBER: &str = r"(?:\d{1,3}(?:[.,]\d{3})+|\d+)(?:[.,]\d{1,2})?";

static SYMBOL_BEFORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"([€$£])\s*({})", NUMBER)).expect("valid price regex"));
static SYMBOL_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"({})\s*([€$£])", NUMBER)).expect("valid price regex"));
static CODE_BEFORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\b(EUR|USD|GBP)\s*({})", NUMBER)).expect("valid price regex"));
static CODE_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"({})\s*(EUR|USD|GBP)\b", NUMBER)).expect("valid price regex"));
static BARE: Lazy<Regex> = Lazy::new(|| Regex::new(&format!(r"^\s*({})\s*$", NUMBER)).expect("valid price regex"));

/// A recognised price: normalized amount text plus the symbol or code next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceMatch {
    pub amount: String,
    pub currency: String,
}

/// Largest valid price in `text`, or `None` when nothing price-like is found.
pub fn extract_price(text: &str) -> Option<PriceMatch> {
    let mut candidates: Vec<(f64, PriceMatch)> = Vec::new();

    for (regex, currency_first) in [
        (&*SYMBOL_BEFORE, true),
        (&*SYMBOL_AFTER, false),
        (&*CODE_BEFORE, true),
        (&*CODE_AFTER, false),
    ] {
        for captures in regex.captures_iter(text) {
            let (currency, number) = if currency_first {
                (&captures[1], &captures[2])
            } else {
                (&captures[2], &captures[1])
            };
            if let Some((value, amount)) = normalize(number) {
                candidates.push((
                    value,
                    PriceMatch {
                        amount,
                        currency: currency.to_string(),
                    },
                ));
            }
        }
    }

    candidates
        .into_iter()
        .filter(|(value, _)| (MIN_PRICE..=MAX_PRICE).contains(value))
        .fold(None, |best: Option<(f64, PriceMatch)>, candidate| match best {
            Some(best) if best.0 >= candidate.0 => Some(best),
            _ => Some(candidate),
        })
        .map(|(_, price)| price)
}

/// A lone number, as printed inside an element dedicated to the price.
pub fn extract_bare_amount(text: &str) -> Option<String> {
    let captures = BARE.captures(text)?;
    let (value, amount) = normalize(&captures[1])?;
    (MIN_PRICE..=MAX_PRICE).contains(&value).then_some(amount)
}

/// Whether `text` reads like a price rather than a title.
pub fn looks_like_price(text: &str) -> bool {
    extract_price(text).is_some() || BARE.is_match(text)
}

/// Normalizes a matched number to a period decimal separator and drops
/// thousands separators. A trailing group of one or two digits is the
/// decimal part; a trailing group of three is a thousands group.
fn normalize(number: &str) -> Option<(f64, String)> {
    let amount = match number.rfind(['.', ',']) {
        Some(pos) if number.len() - pos - 1 <= 2 => {
            let integer: String = number[..pos].chars().filter(char::is_ascii_digit).collect();
            format!("{}.{}", integer, &number[pos + 1..])
        }
        _ => number.chars().filter(char::is_ascii_digit).collect(),
    };
    let value = amount.parse::<f64>().ok()?;
    Some((value, amount))
}
