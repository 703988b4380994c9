//! Postgres / TimescaleDB client
//!
//! Statements go through the simple query protocol (`raw_sql`), so several
//! statements may share one text and nothing is prepared.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolCopyExt, PgPoolOptions};
use sqlx::Row;
use tracing::debug;

use super::{EngineClient, EngineResult};
use crate::model::Engine;

const MAX_CONNECTIONS: u32 = 4;

pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    pub async fn connect(url: &str) -> EngineResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Send one in-memory CSV payload through `COPY ... FROM STDIN`; returns rows copied.
    pub async fn copy_from_bytes(&self, statement: &str, data: Vec<u8>) -> EngineResult<u64> {
        let bytes = data.len();
        let mut copy = self.pool.copy_in_raw(statement).await?;
        if let Err(e) = copy.send(data).await {
            let _ = copy.abort(e.to_string()).await;
            return Err(e.into());
        }
        let rows = copy.finish().await?;
        debug!(bytes, rows, "COPY FROM STDIN finished");
        Ok(rows)
    }

    /// Execute and return rows affected, summed over all statements in `text`.
    pub async fn execute_counted(&self, text: &str) -> EngineResult<u64> {
        Ok(sqlx::raw_sql(text).execute(&self.pool).await?.rows_affected())
    }

    /// First column of the first row as an integer, e.g. for `SELECT count(*)`
    pub async fn scalar_i64(&self, text: &str) -> EngineResult<i64> {
        let row = sqlx::raw_sql(text).fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl EngineClient for PostgresClient {
    fn engine(&self) -> Engine {
        Engine::Relational
    }

    async fn query(&self, text: &str) -> EngineResult<usize> {
        Ok(sqlx::raw_sql(text).fetch_all(&self.pool).await?.len())
    }

    async fn query_column(&self, text: &str) -> EngineResult<Vec<String>> {
        let rows = sqlx::raw_sql(text).fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(row.try_get::<String, _>(0)?);
        }
        Ok(out)
    }

    async fn execute(&self, text: &str) -> EngineResult<()> {
        sqlx::raw_sql(text).execute(&self.pool).await?;
        Ok(())
    }

    async fn ping(&self) -> EngineResult<()> {
        sqlx::raw_sql("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
