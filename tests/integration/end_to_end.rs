use crate::common::{CollectingNotifier, ScriptedFetcher};
use chrono::{Duration as ChronoDuration, Utc};
use listwatch_core::{open_store, ChangeDetector, OwnerId, PollCycle, Registry};
use listwatch_scrapers::{Extractor, MarketplaceScraper, SourceProfile};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const NIKE: &str = "search=nike";
// The fetcher sees the spec with the scheme the scraper adds.
const NIKE_URL: &str = "https://search=nike";

fn scraper(fetcher: Arc<ScriptedFetcher>) -> Arc<MarketplaceScraper<Arc<ScriptedFetcher>>> {
    let profile = SourceProfile::from_origin("https://www.vinted.it").unwrap();
    Arc::new(MarketplaceScraper::new(fetcher, Extractor::new(profile)))
}

fn items(ids: &[u64]) -> serde_json::Value {
    json!({
        "items": ids
            .iter()
            .map(|id| json!({"id": id, "title": format!("Nike #{}", id), "price": "20.00"}))
            .collect::<Vec<_>>()
    })
}

fn ids(records: &[listwatch_core::Record]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

#[tokio::test]
async fn test_nike_search_reports_only_new_listings() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path().join("registry.json")).await.unwrap();
    let registry = Registry::open(store, Duration::from_secs(300)).await.unwrap();
    let owner = OwnerId::new("U");
    let query_id = registry.register(&owner, NIKE, "Nike", None).await.unwrap();

    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.push_json(NIKE_URL, items(&[10, 11]));
    fetcher.push_json(NIKE_URL, items(&[10, 11, 12]));
    let detector = ChangeDetector::new(scraper(fetcher));

    let first = detector.diff_and_update(&registry, &owner, query_id).await.unwrap();
    assert_eq!(ids(&first), vec!["10", "11"]);
    let stored = registry.get(&owner, query_id).await.unwrap();
    assert_eq!(ids(&stored.last_seen), vec!["10", "11"]);

    let second = detector.diff_and_update(&registry, &owner, query_id).await.unwrap();
    assert_eq!(ids(&second), vec!["12"]);
}

#[tokio::test]
async fn test_poll_cycle_survives_restart_and_outages() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("registry.db");
    let owner = OwnerId::new("U");
    let start = Utc::now();

    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.push_json(NIKE_URL, items(&[10, 11]));
    fetcher.push(NIKE_URL, 503, "text/html", "<html>Service unavailable</html>");
    // Third poll: nothing queued, the connection fails.
    let notifier = Arc::new(CollectingNotifier::default());

    {
        let registry = Arc::new(
            Registry::open(open_store(&path).await.unwrap(), Duration::from_secs(300))
                .await
                .unwrap(),
        );
        registry.register(&owner, NIKE, "Nike", None).await.unwrap();

        let cycle = PollCycle::new(registry, ChangeDetector::new(scraper(fetcher.clone())), notifier.clone())
            .with_pacing_delay(Duration::ZERO);
        let report = cycle.run_at(start).await;
        assert_eq!(report.new_records, 2);
        assert_eq!(notifier.take().len(), 2);
    }

    // Reopen from disk: the seen set survived.
    let registry = Arc::new(
        Registry::open(open_store(&path).await.unwrap(), Duration::from_secs(300))
            .await
            .unwrap(),
    );
    let cycle = PollCycle::new(registry.clone(), ChangeDetector::new(scraper(fetcher.clone())), notifier.clone())
        .with_pacing_delay(Duration::ZERO);

    for minutes in [10, 20] {
        let report = cycle.run_at(start + ChronoDuration::minutes(minutes)).await;
        assert_eq!(report.polled, 1);
        assert_eq!(report.new_records, 0);
    }
    assert!(notifier.take().is_empty());

    let query = registry.list(&owner).await.into_values().next().unwrap();
    assert_eq!(ids(&query.last_seen), vec!["10", "11"]);

    // Back online with one new listing: only that one is reported.
    fetcher.push_json(NIKE_URL, items(&[10, 11, 12]));
    let report = cycle.run_at(start + ChronoDuration::minutes(30)).await;
    assert_eq!(report.new_records, 1);
    assert_eq!(notifier.take(), vec![("U".to_string(), "12".to_string())]);
}

#[tokio::test]
async fn test_html_search_page_end_to_end() {
    let dir = tempdir().unwrap();
    let store = open_store(dir.path().join("registry.json")).await.unwrap();
    let registry = Registry::open(store, Duration::from_secs(300)).await.unwrap();
    let owner = OwnerId::new("U");
    let spec = "www.vinted.it/catalog?search_text=lego";
    let query_id = registry.register(&owner, spec, "Lego", None).await.unwrap();

    let page = r#"<!doctype html><html><body>
        <div class="feed-grid">
          <div class="feed-grid__item"><a href="/items/501-lego-castle" title="Lego Castle 10305"></a><span>€ 180,00</span></div>
          <div class="feed-grid__item"><a href="/items/502-lego-ship" title="Lego Pirate Ship"></a><span>95 €</span></div>
        </div>
    </body></html>"#;
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.push("https://www.vinted.it/catalog?search_text=lego", 200, "text/html; charset=utf-8", page);

    let new_records = ChangeDetector::new(scraper(fetcher))
        .diff_and_update(&registry, &owner, query_id)
        .await
        .unwrap();
    assert_eq!(ids(&new_records), vec!["501", "502"]);
    assert_eq!(new_records[0].price.as_str(), "180.00");
    assert_eq!(new_records[1].url.as_str(), "https://www.vinted.it/items/502-lego-ship");
}

async fn assert_cycle_keeps_concurrent_registrations(path: std::path::PathBuf) {
    let owner = OwnerId::new("U");
    let watcher = Arc::new(
        Registry::open(open_store(&path).await.unwrap(), Duration::from_secs(300))
            .await
            .unwrap(),
    );
    let nike = watcher.register(&owner, NIKE, "Nike", None).await.unwrap();

    // `add` and `remove` run as separate invocations on the same file.
    let front_end = Registry::open(open_store(&path).await.unwrap(), Duration::from_secs(300))
        .await
        .unwrap();
    let lego = front_end.register(&owner, "search=lego", "Lego", None).await.unwrap();

    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.push_json(NIKE_URL, items(&[10, 11]));
    let cycle = PollCycle::new(
        watcher.clone(),
        ChangeDetector::new(scraper(fetcher)),
        Arc::new(CollectingNotifier::default()),
    )
    .with_pacing_delay(Duration::ZERO);
    let report = cycle.run().await;
    assert_eq!(report.new_records, 2);

    let on_disk = open_store(&path).await.unwrap().load().await.unwrap();
    assert_eq!(on_disk.keys(), vec![(owner.clone(), nike), (owner.clone(), lego)]);
    assert_eq!(ids(&on_disk.get(&owner, nike).unwrap().last_seen), vec!["10", "11"]);

    // A removal made elsewhere is not undone by the next poll.
    assert!(front_end.unregister(&owner, nike).await.unwrap());
    assert!(watcher.update(&owner, nike, |_| ()).await.unwrap().is_none());
    let on_disk = open_store(&path).await.unwrap().load().await.unwrap();
    assert_eq!(on_disk.keys(), vec![(owner.clone(), lego)]);
}

#[tokio::test]
async fn test_poll_cycle_keeps_searches_added_by_other_invocations_sqlite() {
    let dir = tempdir().unwrap();
    assert_cycle_keeps_concurrent_registrations(dir.path().join("registry.db")).await;
}

#[tokio::test]
async fn test_poll_cycle_keeps_searches_added_by_other_invocations_json() {
    let dir = tempdir().unwrap();
    assert_cycle_keeps_concurrent_registrations(dir.path().join("registry.json")).await;
}
