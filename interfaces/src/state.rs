use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::defs::DenyStore;

/// Durable deny store backed by a local sqlite file.
///
/// Entries keep their insertion order via the `seq` column; eviction removes
/// the oldest surviving rows once `max_entries` is exceeded.
pub struct SqliteDenyStore {
    pool: SqlitePool,
    max_entries: usize,
}

impl SqliteDenyStore {
    pub async fn connect(database_url: &str, max_entries: usize) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            "
            CREATE TABLE IF NOT EXISTS deny_entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL UNIQUE,
                inserted_at TEXT NOT NULL
            )
            ",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool, max_entries })
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    async fn evict_overflow(&self) -> Result<()> {
        sqlx::query(
            "
            DELETE FROM deny_entries
            WHERE seq NOT IN (
                SELECT seq FROM deny_entries ORDER BY seq DESC LIMIT ?1
            )
            ",
        )
        .bind(self.max_entries as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DenyStore for SqliteDenyStore {
    async fn load_all(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT code FROM deny_entries ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;

        let mut codes = Vec::with_capacity(rows.len());
        for row in rows {
            codes.push(row.try_get("code")?);
        }
        Ok(codes)
    }

    async fn put_many(&self, codes: &[String]) -> Result<()> {
        if codes.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        for code in codes {
            sqlx::query(
                "
                INSERT INTO deny_entries (code, inserted_at)
                VALUES (?1, ?2)
                ON CONFLICT (code) DO NOTHING
                ",
            )
            .bind(code)
            .bind(&now)
            .execute(&self.pool)
            .await?;
        }

        self.evict_overflow().await
    }
}
