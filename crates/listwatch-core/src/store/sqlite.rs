use super::migrations::apply_migrations;
use super::RegistryStore;
use crate::{OwnerId, OwnerQueries, Price, Query, QueryId, Record, RegistryState, Result, WatchError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

type QueryRow = (String, i64, String, String, i64, Option<DateTime<Utc>>, DateTime<Utc>);
type RecordRow = (String, i64, String, String, String, String, String, Option<String>);

/// Stores the registry in SQLite: one row per owner, per query and per seen
/// record. A full save rewrites all three tables inside a single transaction;
/// saving one query only touches that query's rows.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        apply_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// A private in-memory database, kept on a single connection.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        apply_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn insert_seen_records(
    conn: &mut SqliteConnection,
    owner_id: &OwnerId,
    query_id: QueryId,
    records: &[Record],
) -> Result<()> {
    for (position, record) in records.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO seen_records (
                owner_id, query_id, position, record_id, title,
                price, currency, url, photo
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(owner_id.as_str())
        .bind(query_id.0 as i64)
        .bind(position as i64)
        .bind(&record.id)
        .bind(&record.title)
        .bind(record.price.as_str())
        .bind(&record.currency)
        .bind(record.url.as_str())
        .bind(record.photo.as_ref().map(|photo| photo.as_str()))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn record_from_row(row: RecordRow) -> Result<Record> {
    let (_, _, record_id, title, price, currency, url, photo) = row;
    let photo = match photo {
        Some(photo) => Some(Url::parse(&photo)?),
        None => None,
    };
    Ok(Record {
        id: record_id,
        title,
        price: Price::from(price),
        currency,
        url: Url::parse(&url)?,
        photo,
    })
}

#[async_trait]
impl RegistryStore for SqliteStore {
    async fn load(&self) -> Result<RegistryState> {
        let mut state = RegistryState::default();

        let owners: Vec<(String, i64)> =
            sqlx::query_as("SELECT owner_id, next_id FROM owners ORDER BY owner_id")
                .fetch_all(&self.pool)
                .await?;
        for (owner_id, next_id) in owners {
            state.owners.insert(
                OwnerId::new(owner_id),
                OwnerQueries {
                    next_id: next_id as u64,
                    queries: Default::default(),
                },
            );
        }

        let queries: Vec<QueryRow> = sqlx::query_as(
            r#"
            SELECT owner_id, query_id, query_spec, label, poll_interval_secs,
                   last_polled_at, created_at
            FROM queries
            ORDER BY owner_id, query_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        for (owner_id, query_id, query_spec, label, interval, last_polled_at, created_at) in queries {
            let owner_id = OwnerId::new(owner_id);
            let mut query = Query::new(
                owner_id.clone(),
                query_spec,
                label,
                Duration::from_secs(interval.max(0) as u64),
                created_at,
            );
            query.last_polled_at = last_polled_at;
            state
                .owners
                .entry(owner_id)
                .or_default()
                .queries
                .insert(QueryId(query_id as u64), query);
        }

        let records: Vec<RecordRow> = sqlx::query_as(
            r#"
            SELECT owner_id, query_id, record_id, title, price, currency, url, photo
            FROM seen_records
            ORDER BY owner_id, query_id, position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        for row in records {
            let owner_id = OwnerId::new(row.0.clone());
            let query_id = QueryId(row.1 as u64);
            let record = record_from_row(row)?;
            if let Some(query) = state.get_mut(&owner_id, query_id) {
                query.last_seen.push(record);
            }
        }

        debug!("Loaded {} queries from SQLite", state.query_count());
        Ok(state)
    }

    async fn save(&self, state: &RegistryState) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM seen_records").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM queries").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM owners").execute(&mut *tx).await?;

        for (owner_id, owner) in &state.owners {
            sqlx::query("INSERT INTO owners (owner_id, next_id) VALUES (?, ?)")
                .bind(owner_id.as_str())
                .bind(owner.next_id as i64)
                .execute(&mut *tx)
                .await?;

            for (query_id, query) in &owner.queries {
                sqlx::query(
                    r#"
                    INSERT INTO queries (
                        owner_id, query_id, query_spec, label,
                        poll_interval_secs, last_polled_at, created_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(owner_id.as_str())
                .bind(query_id.0 as i64)
                .bind(&query.query_spec)
                .bind(&query.label)
                .bind(query.poll_interval.as_secs() as i64)
                .bind(query.last_polled_at)
                .bind(query.created_at)
                .execute(&mut *tx)
                .await?;

                insert_seen_records(&mut *tx, owner_id, *query_id, &query.last_seen).await?;
            }
        }

        tx.commit().await?;
        debug!("Saved {} queries to SQLite", state.query_count());
        Ok(())
    }

    async fn save_query(&self, owner_id: &OwnerId, query_id: QueryId, query: &Query) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE queries
            SET query_spec = ?, label = ?, poll_interval_secs = ?, last_polled_at = ?
            WHERE owner_id = ? AND query_id = ?
            "#,
        )
        .bind(&query.query_spec)
        .bind(&query.label)
        .bind(query.poll_interval.as_secs() as i64)
        .bind(query.last_polled_at)
        .bind(owner_id.as_str())
        .bind(query_id.0 as i64)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(WatchError::Registry(format!(
                "query {} of owner {} no longer exists",
                query_id, owner_id
            )));
        }

        sqlx::query("DELETE FROM seen_records WHERE owner_id = ? AND query_id = ?")
            .bind(owner_id.as_str())
            .bind(query_id.0 as i64)
            .execute(&mut *tx)
            .await?;
        insert_seen_records(&mut *tx, owner_id, query_id, &query.last_seen).await?;

        tx.commit().await?;
        debug!("Saved query {} of {} to SQLite", query_id, owner_id);
        Ok(())
    }
}
