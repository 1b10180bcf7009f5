use sqlx::sqlite::SqlitePool;
use std::fmt;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct Migration {
    version: i32,
    up: &'static [&'static str],
    down: &'static [&'static str],
}

impl Migration {
    pub const fn new(version: i32, up: &'static [&'static str], down: &'static [&'static str]) -> Self {
        Self { version, up, down }
    }

    pub fn version(&self) -> i32 {
        self.version
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Migration {}", self.version)
    }
}

pub const MIGRATIONS: &[Migration] = &[
    Migration::new(
        1,
        &[r#"
        CREATE TABLE IF NOT EXISTS owners (
            owner_id TEXT PRIMARY KEY,
            next_id INTEGER NOT NULL
        )
        "#],
        &["DROP TABLE IF EXISTS owners"],
    ),
    Migration::new(
        2,
        &[r#"
        CREATE TABLE IF NOT EXISTS queries (
            owner_id TEXT NOT NULL,
            query_id INTEGER NOT NULL,
            query_spec TEXT NOT NULL,
            label TEXT NOT NULL,
            poll_interval_secs INTEGER NOT NULL,
            last_polled_at DATETIME,
            created_at DATETIME NOT NULL,
            PRIMARY KEY(owner_id, query_id),
            FOREIGN KEY(owner_id) REFERENCES owners(owner_id)
        )
        "#],
        &["DROP TABLE IF EXISTS queries"],
    ),
    Migration::new(
        3,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS seen_records (
                owner_id TEXT NOT NULL,
                query_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                record_id TEXT NOT NULL,
                title TEXT NOT NULL,
                price TEXT NOT NULL,
                currency TEXT NOT NULL,
                url TEXT NOT NULL,
                photo TEXT,
                PRIMARY KEY(owner_id, query_id, position),
                FOREIGN KEY(owner_id, query_id) REFERENCES queries(owner_id, query_id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_seen_records_record_id ON seen_records(owner_id, query_id, record_id)",
        ],
        &[
            "DROP INDEX IF EXISTS idx_seen_records_record_id",
            "DROP TABLE IF EXISTS seen_records",
        ],
    ),
];

pub async fn apply_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Create migrations table if it doesn't exist
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            applied_at DATETIME NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let applied_versions = applied_versions(pool).await?;

    for migration in MIGRATIONS {
        if applied_versions.contains(&migration.version) {
            continue;
        }

        debug!("Applying {}", migration);
        let mut tx = pool.begin().await?;
        for statement in migration.up {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO migrations (version, applied_at) VALUES (?, ?)")
            .bind(migration.version)
            .bind(chrono::Utc::now())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

pub async fn rollback_migration(pool: &SqlitePool, version: i32) -> Result<(), sqlx::Error> {
    let migration = MIGRATIONS
        .iter()
        .find(|m| m.version == version)
        .ok_or_else(|| sqlx::Error::Protocol(format!("Migration {} not found", version)))?;

    let mut tx = pool.begin().await?;
    for statement in migration.down {
        sqlx::query(*statement).execute(&mut *tx).await?;
    }
    sqlx::query("DELETE FROM migrations WHERE version = ?")
        .bind(version)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}

pub async fn applied_versions(pool: &SqlitePool) -> Result<Vec<i32>, sqlx::Error> {
    sqlx::query_scalar("SELECT version FROM migrations ORDER BY version")
        .fetch_all(pool)
        .await
}
