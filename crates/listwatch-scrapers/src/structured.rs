//! Listing recovery from JSON: API responses and state blobs embedded in
//! `<script>` elements.

use crate::payload::{ContentShape, Payload, SourceProfile};
use crate::{ExtractionStrategy, MAX_RECORDS};
use listwatch_core::{Price, Record};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// How deep the search for an `items` array descends.
pub const MAX_SEARCH_DEPTH: usize = 15;

/// Where front-end frameworks leave their initial state: a global
/// assignment (`window.__NUXT__ = {...}`) or an object property
/// (`data: {...}`). Each entry is the name and the separator before the value.
pub const STATE_MARKERS: &[(&str, char)] = &[
    ("window.__INITIAL_STATE__", '='),
    ("window.__PRELOADED_STATE__", '='),
    ("window.__NUXT__", '='),
    ("window.__data", '='),
    ("window.__APP_STATE__", '='),
    ("data", ':'),
];

static SCRIPT: Lazy<Selector> = Lazy::new(|| Selector::parse("script").expect("valid script selector"));

#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredStrategy;

impl ExtractionStrategy for StructuredStrategy {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn extract(&self, payload: &Payload, profile: &SourceProfile) -> Vec<Record> {
        match payload.shape {
            ContentShape::Json => match serde_json::from_str::<Value>(&payload.body) {
                Ok(value) => records_from_value(&value, profile),
                Err(e) => {
                    debug!("JSON body did not parse: {}", e);
                    Vec::new()
                }
            },
            ContentShape::Html => extract_from_scripts(&payload.body, profile),
        }
    }
}

/// Tries every `<script>` in document order and keeps the first one that
/// yields listings.
pub fn extract_from_scripts(html: &str, profile: &SourceProfile) -> Vec<Record> {
    let document = Html::parse_document(html);

    for script in document.select(&SCRIPT) {
        let text: String = script.text().collect();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        let element = script.value();
        let whole = element.attr("type").is_some_and(|t| t.contains("json"))
            || element.id() == Some("__NEXT_DATA__");

        let records = if whole {
            serde_json::from_str::<Value>(text)
                .map(|value| records_from_value(&value, profile))
                .unwrap_or_default()
        } else {
            STATE_MARKERS
                .iter()
                .flat_map(|&(name, separator)| states_after_marker(text, name, separator))
                .map(|value| records_from_value(&value, profile))
                .find(|records| !records.is_empty())
                .unwrap_or_default()
        };

        if !records.is_empty() {
            debug!("Recovered {} listings from an embedded script", records.len());
            return records;
        }
    }

    Vec::new()
}

/// Every JSON value that follows an occurrence of `name` and `separator`,
/// each parsed on its own so whatever script text follows it is ignored.
/// `name` must not be the tail of a longer identifier.
fn states_after_marker<'a>(text: &'a str, name: &'a str, separator: char) -> impl Iterator<Item = Value> + 'a {
    text.match_indices(name).filter_map(move |(start, _)| {
        let preceding = text[..start].chars().next_back();
        if preceding.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$') {
            return None;
        }
        let rest = text[start + name.len()..].trim_start().strip_prefix(separator)?;
        serde_json::Deserializer::from_str(rest.trim_start())
            .into_iter::<Value>()
            .next()?
            .ok()
    })
}

/// Finds the item array in `value` and maps it to records. A repeated id
/// keeps its first occurrence.
pub fn records_from_value(value: &Value, profile: &SourceProfile) -> Vec<Record> {
    let Some(items) = find_items(value) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(|item| item.as_object())
        .filter_map(|item| map_item(item, profile))
        .filter(|record| seen.insert(record.id.clone()))
        .take(MAX_RECORDS)
        .collect()
}

/// Breadth-first search for an `items` key holding a non-empty array whose
/// first element is an object with an `id`.
pub fn find_items(root: &Value) -> Option<&Vec<Value>> {
    let mut queue = VecDeque::from([(root, 0usize)]);

    while let Some((value, depth)) = queue.pop_front() {
        let children: Box<dyn Iterator<Item = &Value>> = match value {
            Value::Object(map) => {
                if let Some(Value::Array(items)) = map.get("items") {
                    let qualifies = items
                        .first()
                        .and_then(Value::as_object)
                        .is_some_and(|first| first.contains_key("id"));
                    if qualifies {
                        return Some(items);
                    }
                }
                Box::new(map.values())
            }
            Value::Array(elements) => Box::new(elements.iter()),
            _ => continue,
        };

        if depth < MAX_SEARCH_DEPTH {
            queue.extend(children.map(|child| (child, depth + 1)));
        }
    }

    None
}

fn map_item(item: &Map<String, Value>, profile: &SourceProfile) -> Option<Record> {
    let id = match item.get("id")? {
        Value::String(id) => id.trim().to_string(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    if id.is_empty() {
        return None;
    }

    let url = item
        .get("url")
        .and_then(Value::as_str)
        .and_then(|url| profile.resolve(url))
        .or_else(|| profile.item_url(&id))?;

    let title = item
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(&profile.structured_placeholder);

    let (price, price_currency) = ["total_item_price", "price"]
        .iter()
        .filter_map(|key| item.get(*key))
        .find(|value| !value.is_null())
        .map(read_price)
        .unwrap_or((Price::Unknown, None));

    let currency = item
        .get("currency")
        .and_then(Value::as_str)
        .filter(|currency| !currency.is_empty())
        .map(str::to_string)
        .or(price_currency)
        .unwrap_or_else(|| profile.default_currency.clone());

    Some(
        Record::new(id, title, url)
            .with_price(price, currency)
            .with_photo(read_photo(item, profile)),
    )
}

/// A price given as `"12.50"`, `12.5` or `{"amount": "12.5", "currency_code": "EUR"}`.
fn read_price(value: &Value) -> (Price, Option<String>) {
    match value {
        Value::String(amount) => (Price::amount(amount), None),
        Value::Number(amount) => (Price::amount(amount.to_string()), None),
        Value::Object(object) => {
            let price = match object.get("amount") {
                Some(Value::String(amount)) => Price::amount(amount),
                Some(Value::Number(amount)) => Price::amount(amount.to_string()),
                _ => Price::Unknown,
            };
            let currency = object
                .get("currency_code")
                .and_then(Value::as_str)
                .filter(|code| !code.is_empty())
                .map(str::to_string);
            (price, currency)
        }
        _ => (Price::Unknown, None),
    }
}

fn read_photo(item: &Map<String, Value>, profile: &SourceProfile) -> Option<url::Url> {
    let photo = item.get("photo");
    let first_photo = item.get("photos").and_then(Value::as_array).and_then(|photos| photos.first());

    [
        photo.and_then(|p| p.get("url")),
        photo.and_then(|p| p.get("full_size_url")),
        photo,
        first_photo.and_then(|p| p.get("url")),
        first_photo.and_then(|p| p.get("full_size_url")),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .find_map(|link| profile.resolve(link))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile() -> SourceProfile {
        SourceProfile::from_origin("https://www.vinted.it").unwrap()
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_json_api_response() {
        let body = json!({
            "items": [
                {
                    "id": 10,
                    "title": "Nike Air Max",
                    "price": {"amount": "25.0", "currency_code": "EUR"},
                    "total_item_price": {"amount": "27.45", "currency_code": "EUR"},
                    "url": "/items/10-nike-air-max",
                    "photo": {"url": "https://images1.vinted.net/10.jpg"}
                },
                {"id": "11", "price": "12,00"}
            ]
        });
        let records = StructuredStrategy.extract(&Payload::json(body.to_string()), &profile());

        assert_eq!(ids(&records), vec!["10", "11"]);
        assert_eq!(records[0].title, "Nike Air Max");
        assert_eq!(records[0].price, Price::amount("27.45"));
        assert_eq!(records[0].currency, "EUR");
        assert_eq!(records[0].url.as_str(), "https://www.vinted.it/items/10-nike-air-max");
        assert_eq!(records[0].photo.as_ref().unwrap().as_str(), "https://images1.vinted.net/10.jpg");

        assert_eq!(records[1].title, "Untitled");
        assert_eq!(records[1].price.as_str(), "12.00");
        assert_eq!(records[1].currency, "€");
        assert_eq!(records[1].url.as_str(), "https://www.vinted.it/items/11");
        assert!(records[1].photo.is_none());
    }

    #[test]
    fn test_initial_state_script_with_trailing_code() {
        let html = r#"<html><head>
            <script>var tracking = {"items": "nope"};</script>
            <script>
              window.__INITIAL_STATE__ = {"catalog": {"search": {"items": [
                {"id": 1, "title": "Lego 42083", "price": 150, "currency": "EUR",
                 "photos": [{"full_size_url": "/photos/1.jpg"}]}
              ]}}};
              window.__ready = true;
            </script>
        </head><body></body></html>"#;

        let records = StructuredStrategy.extract(&Payload::html(html), &profile());
        assert_eq!(ids(&records), vec!["1"]);
        assert_eq!(records[0].price.as_str(), "150");
        assert_eq!(records[0].currency, "EUR");
        assert_eq!(records[0].photo.as_ref().unwrap().as_str(), "https://www.vinted.it/photos/1.jpg");
    }

    #[test]
    fn test_state_held_in_data_property() {
        let html = r##"<html><body><script>
            var metadata = {"items": [{"id": 1}]};
            new Vue({ el: "#app", data: {"catalog": {"items": [{"id": 77, "title": "Zara coat"}]}} });
        </script></body></html>"##;

        let records = StructuredStrategy.extract(&Payload::html(html), &profile());
        assert_eq!(ids(&records), vec!["77"]);
        assert_eq!(records[0].title, "Zara coat");
    }

    #[test]
    fn test_later_marker_occurrence_is_tried() {
        let html = r#"<script>
            window.__data = "loading";
            window.__data = {"items": [{"id": 5}]};
        </script>"#;

        let records = StructuredStrategy.extract(&Payload::html(html), &profile());
        assert_eq!(ids(&records), vec!["5"]);
    }

    #[test]
    fn test_next_data_script_parsed_whole() {
        let html = r#"<script id="__NEXT_DATA__" type="application/json">
            {"props": {"pageProps": {"items": [{"id": "abc", "title": "Jacket", "photo": "/p.jpg"}]}}}
        </script>"#;
        let records = StructuredStrategy.extract(&Payload::html(html), &profile());
        assert_eq!(ids(&records), vec!["abc"]);
        assert_eq!(records[0].price, Price::Unknown);
        assert_eq!(records[0].photo.as_ref().unwrap().as_str(), "https://www.vinted.it/p.jpg");
    }

    #[test]
    fn test_cap_preserves_source_order() {
        let items: Vec<Value> = (1..=25).map(|id| json!({"id": id})).collect();
        let records = StructuredStrategy.extract(&Payload::json(json!({ "items": items }).to_string()), &profile());
        assert_eq!(records.len(), MAX_RECORDS);
        assert_eq!(records[0].id, "1");
        assert_eq!(records[19].id, "20");
    }

    #[test]
    fn test_items_search_is_breadth_first_and_qualified() {
        let value = json!({
            "filters": {"items": [{"name": "no id here"}]},
            "deep": {"a": {"b": {"items": [{"id": 2}]}}},
            "results": {"items": [{"id": 1}]}
        });
        let items = find_items(&value).unwrap();
        assert_eq!(items[0]["id"], 1);

        assert!(find_items(&json!({"items": []})).is_none());
        assert!(find_items(&json!({"items": [1, 2]})).is_none());
    }

    #[test]
    fn test_depth_limit() {
        let mut value = json!({"items": [{"id": 1}]});
        for _ in 0..=MAX_SEARCH_DEPTH {
            value = json!({ "nested": value });
        }
        assert!(find_items(&value).is_none());
    }

    #[test]
    fn test_elements_without_id_are_skipped() {
        let body = json!({"items": [{"id": 1}, {"title": "orphan"}, "text", {"id": ""}, {"id": 2}]});
        let records = StructuredStrategy.extract(&Payload::json(body.to_string()), &profile());
        assert_eq!(ids(&records), vec!["1", "2"]);
    }

    #[test]
    fn test_invalid_payloads_yield_nothing() {
        assert!(StructuredStrategy.extract(&Payload::json("{not json"), &profile()).is_empty());
        assert!(StructuredStrategy
            .extract(&Payload::html("<script>window.__NUXT__=(function(a){return a})(1)</script>"), &profile())
            .is_empty());
    }
}
