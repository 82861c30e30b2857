// SQLite-backed moderation store.
//
// Tables:
// - kv: plain values and counters, with an optional expiry (unix ms)
// - sets: one row per (key, member)
// - lists: rows ordered by autoincrement id; the lowest id is the head
//
// Every trait operation that must be atomic is a single statement
// (upsert with RETURNING, DELETE ... RETURNING).

use crate::core::moderation::{ModerationStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::time::Duration;

pub struct SqliteModerationStore {
    pool: Pool<Sqlite>,
}

impl SqliteModerationStore {
    /// Open (creating if needed) the database at `database_path` and migrate it.
    pub async fn new(database_path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite://{}?mode=rwc", database_path))
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sets (
                key TEXT NOT NULL,
                member TEXT NOT NULL,
                PRIMARY KEY (key, member)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL,
                value TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_lists_key_id ON lists(key, id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete expired values, then blocklist members whose `block:` entry is
    /// gone. Returns how many rows were removed.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let values = sqlx::query("DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?")
            .bind(now_ms())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        // blocklist:{dim} member v is backed by block:{dim}:{v}
        let members = sqlx::query(
            r#"
            DELETE FROM sets
            WHERE key LIKE 'blocklist:%'
              AND NOT EXISTS (
                SELECT 1 FROM kv
                WHERE kv.key = 'block:' || substr(sets.key, 11) || ':' || sets.member
              )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(values.rows_affected() + members.rows_affected())
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|ttl| now_ms() + ttl.as_millis() as i64)
}

#[async_trait]
impl ModerationStore for SqliteModerationStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            "SELECT value FROM kv WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|row| row.get("value")))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expiry(ttl))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("DELETE FROM kv WHERE key = ? RETURNING expires_at")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        // An already-expired row did not count as present.
        Ok(row
            .map(|row| {
                row.get::<Option<i64>, _>("expires_at")
                    .map_or(true, |at| at > now_ms())
            })
            .unwrap_or(false))
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO kv (key, value, expires_at)
            VALUES (?1, '1', ?2)
            ON CONFLICT(key) DO UPDATE SET
                value = CASE
                    WHEN kv.expires_at IS NOT NULL AND kv.expires_at <= ?3 THEN '1'
                    ELSE CAST(CAST(kv.value AS INTEGER) + 1 AS TEXT)
                END,
                expires_at = CASE
                    WHEN kv.expires_at IS NOT NULL AND kv.expires_at <= ?3 THEN ?2
                    ELSE kv.expires_at
                END
            RETURNING value
            "#,
        )
        .bind(key)
        .bind(expiry(ttl))
        .bind(now_ms())
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        let raw: String = row.get("value");
        raw.parse().map_err(|e| StoreError::corrupt(key, e))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("INSERT OR IGNORE INTO sets (key, member) VALUES (?, ?)")
            .bind(key)
            .bind(member)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sets WHERE key = ? AND member = ?")
            .bind(key)
            .bind(member)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM sets WHERE key = ? AND member = ?")
            .bind(key)
            .bind(member)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.is_some())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT member FROM sets WHERE key = ? ORDER BY member")
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        Ok(rows.iter().map(|row| row.get("member")).collect())
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query("INSERT INTO lists (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        let len: i64 = sqlx::query("SELECT COUNT(*) AS len FROM lists WHERE key = ?")
            .bind(key)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?
            .get("len");

        tx.commit().await.map_err(backend)?;
        Ok(len as usize)
    }

    async fn list_pop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            r#"
            DELETE FROM lists
            WHERE id = (SELECT MIN(id) FROM lists WHERE key = ?)
            RETURNING value
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|row| row.get("value")))
    }

    async fn list_range(
        &self,
        key: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT value FROM lists WHERE key = ? ORDER BY id LIMIT ? OFFSET ?")
            .bind(key)
            .bind(count as i64)
            .bind(start as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        Ok(rows.iter().map(|row| row.get("value")).collect())
    }

    async fn list_remove(
        &self,
        key: &str,
        value: &str,
        count: usize,
    ) -> Result<usize, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM lists
            WHERE id IN (
                SELECT id FROM lists WHERE key = ? AND value = ? ORDER BY id LIMIT ?
            )
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(count as i64)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() as usize)
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        let len: i64 = sqlx::query("SELECT COUNT(*) AS len FROM lists WHERE key = ?")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?
            .get("len");
        Ok(len as usize)
    }

    async fn list_trim(&self, key: &str, keep: usize) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            DELETE FROM lists
            WHERE key = ?1 AND id NOT IN (
                SELECT id FROM lists WHERE key = ?1 ORDER BY id DESC LIMIT ?2
            )
            "#,
        )
        .bind(key)
        .bind(keep as i64)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}
