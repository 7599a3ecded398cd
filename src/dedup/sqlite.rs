//! Embedded SQLite dedup store: `seen_ads(id, first_seen)` and
//! `collection_runs(run_at)`. Table creation is idempotent
//! (`CREATE TABLE IF NOT EXISTS`), without a separate migration-file asset
//! pipeline, since two tables don't warrant one.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{migrate::MigrateDatabase, Pool, Row, Sqlite, SqlitePool};
use tokio::sync::Mutex;

use crate::errors::AppResult;

use super::DedupTracker;

pub struct SqliteDedupStore {
    pool: Pool<Sqlite>,
    write_lock: Arc<Mutex<()>>,
    cache: Mutex<HashSet<String>>,
}

impl SqliteDedupStore {
    pub async fn connect(path: impl AsRef<Path>) -> AppResult<Self> {
        let url = format!("sqlite://{}", path.as_ref().display());
        if !Sqlite::database_exists(&url).await.unwrap_or(false) {
            Sqlite::create_database(&url).await?;
        }
        let pool = SqlitePool::connect(&url).await?;
        let store = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
            cache: Mutex::new(HashSet::new()),
        };
        store.run_migrations().await?;
        store.load().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_ads (
                id TEXT PRIMARY KEY,
                first_seen TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS collection_runs (
                run_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl DedupTracker for SqliteDedupStore {
    async fn has_seen(&self, id: &str) -> AppResult<bool> {
        if self.cache.lock().await.contains(id) {
            return Ok(true);
        }
        let row = sqlx::query("SELECT 1 FROM seen_ads WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn mark_seen(&self, id: &str) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("INSERT OR IGNORE INTO seen_ads (id, first_seen) VALUES (?, ?)")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        self.cache.lock().await.insert(id.to_string());
        Ok(())
    }

    async fn get_last_collection_time(&self) -> AppResult<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT MAX(run_at) as max_run FROM collection_runs")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<Option<DateTime<Utc>>, _>("max_run").unwrap_or(None))
    }

    async fn update_collection_time(&self) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("INSERT INTO collection_runs (run_at) VALUES (?)")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save(&self) -> AppResult<()> {
        // Every mutating call above commits immediately via the pool; there
        // is no separate write-behind buffer to flush.
        Ok(())
    }

    async fn load(&self) -> AppResult<()> {
        let rows = sqlx::query("SELECT id FROM seen_ads").fetch_all(&self.pool).await?;
        let mut cache = self.cache.lock().await;
        cache.clear();
        for row in rows {
            let id: String = row.try_get("id")?;
            cache.insert(id);
        }
        Ok(())
    }
}
