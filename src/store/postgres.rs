//! PostgreSQL store backend.
//!
//! Same three-table layout as the SQLite backend. `list_pop_front` uses
//! `FOR UPDATE SKIP LOCKED` so concurrent workers sharing the database
//! never pop the same row. Covered by the ignored integration tests in
//! `tests/postgres_store_test.rs` (requires DATABASE_URL).

use async_trait::async_trait;
use sqlx::postgres::PgPool;

use crate::error::Result;

use super::Store;

/// PostgreSQL-backed store for production deployments.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to a database URL
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self { pool })
    }

    /// Create the schema if it does not exist yet
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key         TEXT PRIMARY KEY,
                value       TEXT NOT NULL,
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_list (
                id     BIGSERIAL PRIMARY KEY,
                key    TEXT NOT NULL,
                value  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_kv_list_key ON kv_list (key, id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_set (
                key     TEXT NOT NULL,
                member  TEXT NOT NULL,
                PRIMARY KEY (key, member)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_cas(&self, key: &str, expected: &str, value: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE kv SET value = $1, updated_at = NOW() WHERE key = $2 AND value = $3",
        )
        .bind(value)
        .bind(key)
        .bind(expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64> {
        let next: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES ($1, $2::TEXT, NOW())
            ON CONFLICT (key) DO UPDATE SET
                value = ((kv.value)::BIGINT + $3)::TEXT,
                updated_at = NOW()
            RETURNING (value)::BIGINT
            "#,
        )
        .bind(key)
        .bind(by)
        .bind(by)
        .fetch_one(&self.pool)
        .await?;
        Ok(next)
    }

    async fn list_push_back(&self, key: &str, value: &str) -> Result<u64> {
        sqlx::query("INSERT INTO kv_list (key, value) VALUES ($1, $2)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        self.list_len(key).await
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            r#"
            DELETE FROM kv_list
            WHERE id = (
                SELECT id FROM kv_list
                WHERE key = $1
                ORDER BY id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING value
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn list_len(&self, key: &str) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM kv_list WHERE key = $1")
            .bind(key)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    async fn list_all(&self, key: &str) -> Result<Vec<String>> {
        let values: Vec<String> =
            sqlx::query_scalar("SELECT value FROM kv_list WHERE key = $1 ORDER BY id ASC")
                .bind(key)
                .fetch_all(&self.pool)
                .await?;
        Ok(values)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO kv_set (key, member)
            VALUES ($1, $2)
            ON CONFLICT (key, member) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(member)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv_set WHERE key = $1 AND member = $2")
            .bind(key)
            .bind(member)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM kv_set WHERE key = $1 AND member = $2")
                .bind(key)
                .bind(member)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0 > 0)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let members: Vec<String> =
            sqlx::query_scalar("SELECT member FROM kv_set WHERE key = $1 ORDER BY member")
                .bind(key)
                .fetch_all(&self.pool)
                .await?;
        Ok(members)
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<u64> {
        let pattern = format!("{prefix}%");
        let mut removed = 0u64;

        for table in ["kv", "kv_list", "kv_set"] {
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE key LIKE $1"))
                .bind(&pattern)
                .execute(&self.pool)
                .await?;
            removed += result.rows_affected();
        }

        Ok(removed)
    }
}
