//! Heuristic listing recovery from rendered HTML.
//!
//! Used when a page carries no embedded state. Listing links are the anchor:
//! every `<a href="/items/123...">` is a candidate, and the card around it is
//! searched for a title, a price and a photo.

use crate::payload::{ContentShape, Payload, SourceProfile};
use crate::price::{extract_bare_amount, extract_price, looks_like_price};
use crate::{ExtractionStrategy, MAX_RECORDS};
use listwatch_core::{Price, Record};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// Candidate links examined per page.
pub const MAX_CANDIDATES: usize = 30;

/// Markup titles are cut to this many characters.
pub const MAX_TITLE_CHARS: usize = 100;

/// Ancestors climbed while looking for the card around a link.
const MAX_SCOPE_DEPTH: usize = 6;

static ITEM_HREF: Lazy<Regex> = Lazy::new(|| Regex::new(r"/items/(\d+)").expect("valid item link regex"));
static LINKS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid link selector"));
static TEXT_BLOCKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4, p, span, div").expect("valid text selector"));
static PRICE_ELEMENTS: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[data-testid*="price"]"#).expect("valid price selector"));
static IMAGES: Lazy<Selector> = Lazy::new(|| Selector::parse("img").expect("valid image selector"));

#[derive(Debug, Default, Clone, Copy)]
pub struct MarkupStrategy;

impl ExtractionStrategy for MarkupStrategy {
    fn name(&self) -> &'static str {
        "markup"
    }

    fn extract(&self, payload: &Payload, profile: &SourceProfile) -> Vec<Record> {
        match payload.shape {
            ContentShape::Json => Vec::new(),
            ContentShape::Html => extract_from_markup(&payload.body, profile),
        }
    }
}

pub fn extract_from_markup(html: &str, profile: &SourceProfile) -> Vec<Record> {
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let candidates: Vec<(String, ElementRef)> = document
        .select(&LINKS)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            let id = ITEM_HREF.captures(href)?.get(1)?.as_str().to_string();
            Some((id, anchor))
        })
        .filter(|(id, _)| seen.insert(id.clone()))
        .take(MAX_CANDIDATES)
        .collect();

    debug!("Found {} candidate listing links", candidates.len());

    let mut records = Vec::new();
    for (id, anchor) in candidates {
        match read_candidate(&id, anchor, profile) {
            Some(record) => records.push(record),
            None => debug!("Skipped candidate {}", id),
        }
        if records.len() >= MAX_RECORDS {
            break;
        }
    }
    records
}

fn read_candidate(id: &str, anchor: ElementRef, profile: &SourceProfile) -> Option<Record> {
    let url = profile.resolve(anchor.value().attr("href")?)?;
    let scope = card_scope(anchor);

    let title = anchor_title(anchor)
        .or_else(|| scope_title(scope))
        .map(|title| title.chars().take(MAX_TITLE_CHARS).collect::<String>())
        .unwrap_or_else(|| profile.markup_placeholder.clone());

    let (price, currency) = match scope_price(scope) {
        Some((amount, Some(currency))) => (Price::amount(amount), currency),
        Some((amount, None)) => (Price::amount(amount), profile.default_currency.clone()),
        None => (Price::Unknown, profile.default_currency.clone()),
    };

    if title == profile.markup_placeholder && !price.is_known() {
        return None;
    }

    Some(
        Record::new(id, title, url)
            .with_price(price, currency)
            .with_photo(scope_photo(scope, profile)),
    )
}

/// The nearest ancestor that looks like a listing card, else the nearest
/// `div`, else the link itself.
fn card_scope(anchor: ElementRef) -> ElementRef {
    let ancestors: Vec<ElementRef> = anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .take(MAX_SCOPE_DEPTH)
        .collect();

    ancestors
        .iter()
        .find(|element| looks_like_card(element))
        .or_else(|| ancestors.iter().find(|element| element.value().name() == "div"))
        .copied()
        .unwrap_or(anchor)
}

fn looks_like_card(element: &ElementRef) -> bool {
    let element = element.value();
    if matches!(element.name(), "article" | "li") {
        return true;
    }
    ["class", "data-testid"].iter().any(|attr| {
        element.attr(attr).is_some_and(|value| {
            let value = value.to_ascii_lowercase();
            value.contains("item") || value.contains("card") || value.contains("grid")
        })
    })
}

fn collapse(text: impl Iterator<Item = impl AsRef<str>>) -> String {
    let joined: String = text.map(|part| part.as_ref().to_string()).collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn anchor_title(anchor: ElementRef) -> Option<String> {
    let element = anchor.value();
    [element.attr("title"), element.attr("aria-label")]
        .into_iter()
        .flatten()
        .map(|text| collapse(std::iter::once(text)))
        .chain(std::iter::once(collapse(anchor.text())))
        .find(|text| {
            text.chars().count() > 3 && !text.chars().all(|c| c.is_ascii_digit()) && !looks_like_price(text)
        })
}

fn scope_title(scope: ElementRef) -> Option<String> {
    scope
        .select(&TEXT_BLOCKS)
        .map(|element| collapse(element.text()))
        .find(|text| (10..=150).contains(&text.chars().count()) && !looks_like_price(text))
}

/// Price text from the whole card, else from an element labelled as the price.
fn scope_price(scope: ElementRef) -> Option<(String, Option<String>)> {
    if let Some(price) = extract_price(&collapse(scope.text())) {
        return Some((price.amount, Some(price.currency)));
    }

    scope.select(&PRICE_ELEMENTS).find_map(|element| {
        let text = collapse(element.text());
        extract_price(&text)
            .map(|price| (price.amount, Some(price.currency)))
            .or_else(|| extract_bare_amount(&text).map(|amount| (amount, None)))
    })
}

fn scope_photo(scope: ElementRef, profile: &SourceProfile) -> Option<Url> {
    let image = scope.select(&IMAGES).next()?;
    let image = image.value();

    let srcset_first = image
        .attr("srcset")
        .and_then(|srcset| srcset.split(',').next())
        .and_then(|candidate| candidate.split_whitespace().next());

    [
        image.attr("src"),
        image.attr("data-src"),
        image.attr("data-lazy-src"),
        srcset_first,
    ]
    .into_iter()
    .flatten()
    .filter(|link| !is_placeholder_image(link))
    .find_map(|link| profile.resolve(link))
}

fn is_placeholder_image(src: &str) -> bool {
    let src = src.trim().to_ascii_lowercase();
    src.is_empty()
        || src.starts_with("data:")
        || src.contains("placeholder")
        || src.contains("blank")
        || src.contains("spacer")
}
