use chrono::Utc;
use listwatch_core::store::migrations::{applied_versions, apply_migrations, rollback_migration, MIGRATIONS};
use listwatch_core::{
    open_store, OwnerId, Price, Query, QueryId, Record, Registry, RegistryState, RegistryStore, SqliteStore,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use url::Url;

fn sample_state() -> RegistryState {
    let mut state = RegistryState::default();

    let mut nike = Query::new(
        OwnerId::new("12345"),
        "https://www.vinted.it/catalog?search_text=nike",
        "Nike",
        Duration::from_secs(300),
        Utc::now(),
    );
    nike.last_polled_at = Some(Utc::now());
    nike.last_seen = vec![
        Record::new("10", "Nike Air", Url::parse("https://www.vinted.it/items/10").unwrap())
            .with_price(Price::amount("25.00"), "€")
            .with_photo(Some(Url::parse("https://images1.vinted.net/10.jpg").unwrap())),
        Record::new("11", "Untitled", Url::parse("https://www.vinted.it/items/11").unwrap()),
    ];
    state.insert(nike);

    let lego = Query::new(OwnerId::new("12345"), "search=lego", "Lego", Duration::from_secs(60), Utc::now());
    let removed = state.insert(lego.clone());
    state.remove(&OwnerId::new("12345"), removed);
    state.insert(lego);

    state.insert(Query::new(OwnerId::new("67890"), "search=zara", "Search", Duration::from_secs(300), Utc::now()));
    state
}

async fn assert_round_trip(store: Arc<dyn RegistryStore>) {
    let state = sample_state();
    store.save(&state).await.unwrap();
    let loaded = store.load().await.unwrap();

    assert_eq!(loaded.keys(), state.keys());
    let alice = OwnerId::new("12345");
    assert_eq!(loaded.owners[&alice].next_id, 4);

    let nike = loaded.get(&alice, QueryId(1)).unwrap();
    assert_eq!(nike.label, "Nike");
    assert_eq!(nike.poll_interval, Duration::from_secs(300));
    assert!(nike.last_polled_at.is_some());
    let ids: Vec<&str> = nike.last_seen.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["10", "11"]);
    assert_eq!(nike.last_seen[0].price, Price::amount("25.00"));
    assert_eq!(nike.last_seen[1].price, Price::Unknown);
    assert!(nike.last_seen[1].photo.is_none());

    let lego = loaded.get(&alice, QueryId(3)).unwrap();
    assert_eq!(lego.poll_interval, Duration::from_secs(60));
    assert!(loaded.get(&alice, QueryId(2)).is_none());
}

#[tokio::test]
async fn test_json_store_round_trip() {
    let dir = tempdir().unwrap();
    assert_round_trip(open_store(dir.path().join("registry.json")).await.unwrap()).await;
}

#[tokio::test]
async fn test_sqlite_store_round_trip() {
    let dir = tempdir().unwrap();
    assert_round_trip(open_store(dir.path().join("nested/registry.db")).await.unwrap()).await;
}

#[tokio::test]
async fn test_registry_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("registry.db");
    let owner = OwnerId::new("12345");

    {
        let registry = Registry::open(open_store(&path).await.unwrap(), Duration::from_secs(300))
            .await
            .unwrap();
        registry.register(&owner, "search=a", "A", None).await.unwrap();
        let second = registry.register(&owner, "search=b", "B", None).await.unwrap();
        registry.unregister(&owner, second).await.unwrap();
    }

    let registry = Registry::open(open_store(&path).await.unwrap(), Duration::from_secs(300))
        .await
        .unwrap();
    assert_eq!(registry.list(&owner).await.len(), 1);
    // Ids keep counting from where they were, even across restarts.
    let third = registry.register(&owner, "search=c", "C", None).await.unwrap();
    assert_eq!(third, QueryId(3));
}

#[tokio::test]
async fn test_rollback_and_reapply_migrations() {
    let dir = tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("rollback.db")).await.unwrap();
    let pool = store.pool();

    let applied = applied_versions(pool).await.unwrap();
    assert_eq!(applied.len(), MIGRATIONS.len(), "Expected every migration to be applied");

    for migration in MIGRATIONS.iter().rev().take(MIGRATIONS.len() - 1) {
        rollback_migration(pool, migration.version()).await.unwrap();
    }
    assert_eq!(applied_versions(pool).await.unwrap(), vec![1]);

    apply_migrations(pool).await.unwrap();
    assert_eq!(applied_versions(pool).await.unwrap().len(), MIGRATIONS.len());

    // The schema is usable again after the round trip.
    store.save(&sample_state()).await.unwrap();
    assert_eq!(store.load().await.unwrap().query_count(), 3);
}
