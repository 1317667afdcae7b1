use async_trait::async_trait;
use nimbus_core::Result;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{persistence, Change, Collection, KvStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_entries (
    collection TEXT NOT NULL,
    key TEXT NOT NULL,
    value JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (collection, key)
)
"#;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(persistence("connect to postgres"))?;
        Self::from_pool(pool).await
    }

    /// Creates the backing table when missing.
    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(persistence("create kv_entries"))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl KvStore for PgStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>> {
        sqlx::query_scalar::<_, Value>(
            r#"
            SELECT value
            FROM kv_entries
            WHERE collection = $1 AND key = $2
            "#,
        )
        .bind(collection.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence("select kv entry"))
    }

    async fn put(&self, collection: Collection, key: &str, value: Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_entries (collection, key, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, key)
            DO UPDATE SET value = EXCLUDED.value, updated_at = now()
            "#,
        )
        .bind(collection.as_str())
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(persistence("upsert kv entry"))?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM kv_entries
            WHERE collection = $1 AND key = $2
            "#,
        )
        .bind(collection.as_str())
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(persistence("delete kv entry"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn scan(&self, collection: Collection) -> Result<Vec<(String, Value)>> {
        sqlx::query_as::<_, (String, Value)>(
            r#"
            SELECT key, value
            FROM kv_entries
            WHERE collection = $1
            ORDER BY key
            "#,
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(persistence("scan kv entries"))
    }

    /// Holds the row lock from read to write so concurrent writers queue
    /// behind this one.
    async fn update(&self, collection: Collection, key: &str, change: Change) -> Result<Option<Value>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(persistence("begin kv update"))?;

        let current = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT value
            FROM kv_entries
            WHERE collection = $1 AND key = $2
            FOR UPDATE
            "#,
        )
        .bind(collection.as_str())
        .bind(key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(persistence("select kv entry for update"))?;

        let Some(current) = current else {
            return Ok(None);
        };
        let next = change(current)?;

        sqlx::query(
            r#"
            UPDATE kv_entries
            SET value = $3, updated_at = now()
            WHERE collection = $1 AND key = $2
            "#,
        )
        .bind(collection.as_str())
        .bind(key)
        .bind(next.clone())
        .execute(&mut *tx)
        .await
        .map_err(persistence("update kv entry"))?;

        tx.commit().await.map_err(persistence("commit kv update"))?;
        Ok(Some(next))
    }

    async fn delete_many(&self, collection: Collection, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            r#"
            DELETE FROM kv_entries
            WHERE collection = $1 AND key = ANY($2)
            "#,
        )
        .bind(collection.as_str())
        .bind(keys)
        .execute(&self.pool)
        .await
        .map_err(persistence("delete kv entries"))?;
        Ok(result.rows_affected() as usize)
    }
}
