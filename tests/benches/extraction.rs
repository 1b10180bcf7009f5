use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use listwatch_core::{diff_records, store::SqliteStore, OwnerId, Query, RegistryState, RegistryStore, Record};
use listwatch_scrapers::{price::extract_price, Extractor, Payload, SourceProfile};
use std::time::Duration;
use tokio::runtime::Runtime;
use url::Url;

fn profile() -> SourceProfile {
    SourceProfile::from_origin("https://www.vinted.it").unwrap()
}

fn state_page(items: usize) -> String {
    let items: Vec<String> = (0..items)
        .map(|id| {
            format!(
                r#"{{"id": {0}, "title": "Listing {0}", "price": {{"amount": "{0}.50", "currency_code": "EUR"}}, "photo": {{"url": "/p/{0}.jpg"}}}}"#,
                id
            )
        })
        .collect();
    format!(
        r#"<html><head><script>window.__INITIAL_STATE__ = {{"catalog": {{"items": [{}]}}}};</script></head><body></body></html>"#,
        items.join(",")
    )
}

fn card_page(cards: usize) -> String {
    let cards: String = (0..cards)
        .map(|id| {
            format!(
                r#"<div class="feed-grid__item"><a href="/items/{0}-listing" title="Listing number {0}"><img src="/blank.gif" data-src="/p/{0}.jpg"></a><p>Size M</p><span>{0},00 €</span></div>"#,
                id + 1
            )
        })
        .collect();
    format!(r#"<html><body><div class="feed-grid">{}</div></body></html>"#, cards)
}

fn records(ids: std::ops::Range<usize>) -> Vec<Record> {
    ids.map(|id| {
        Record::new(
            id.to_string(),
            "Listing",
            Url::parse(&format!("https://www.vinted.it/items/{}", id)).unwrap(),
        )
    })
    .collect()
}

fn bench_extraction(c: &mut Criterion) {
    let extractor = Extractor::new(profile());

    let mut group = c.benchmark_group("extraction");
    group.sample_size(20);

    for size in [20, 100, 500].iter() {
        let structured = Payload::html(state_page(*size));
        group.bench_with_input(BenchmarkId::new("structured", size), &structured, |b, payload| {
            b.iter(|| black_box(extractor.extract(payload)));
        });

        let markup = Payload::html(card_page(*size));
        group.bench_with_input(BenchmarkId::new("markup", size), &markup, |b, payload| {
            b.iter(|| black_box(extractor.extract(payload)));
        });
    }

    group.bench_function("price", |b| {
        b.iter(|| black_box(extract_price("Was € 80,00, now €120.00 + 3,50 € shipping")));
    });

    group.finish();
}

fn bench_change_detection(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("detection");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    let previous = records(0..20);
    let current = records(5..25);
    group.bench_function("diff", |b| {
        b.iter(|| black_box(diff_records(&previous, &current)));
    });

    for owners in [1, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::new("sqlite_save", owners), owners, |b, &owners| {
            let mut state = RegistryState::default();
            for owner in 0..owners {
                let mut query = Query::new(
                    OwnerId::new(owner.to_string()),
                    "search=nike",
                    "Nike",
                    Duration::from_secs(300),
                    Utc::now(),
                );
                query.last_seen = records(0..20);
                state.insert(query);
            }

            b.to_async(&rt).iter(|| async {
                let store = SqliteStore::in_memory().await.unwrap();
                black_box(store.save(&state).await.unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_extraction, bench_change_detection);

criterion_main!(benches);
