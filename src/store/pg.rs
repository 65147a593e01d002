use crate::error::AppError;
use crate::sql::QueryBuf;
use crate::store::{row_to_json, Execution, Store, StoreTx};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use sqlx::{PgPool, Transaction};
use std::future::Future;
use std::time::Duration;

/// `Store` over a PostgreSQL pool. With a timeout set, every pool acquisition and
/// statement is bounded and expiry is reported as `Transient`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    timeout: Option<Duration>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool, timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn bounded<T, F>(timeout: Option<Duration>, what: &'static str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(res) => res.map_err(AppError::from),
            Err(_) => Err(AppError::Transient(format!("{} timed out after {:?}", what, limit))),
        },
        None => fut.await.map_err(AppError::from),
    }
}

fn bind_all(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    query
}

#[async_trait]
impl Store for PgStore {
    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let rows = bounded(self.timeout, "query", bind_all(q).fetch_all(&self.pool)).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn fetch_optional(&self, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let row = bounded(self.timeout, "query", bind_all(q).fetch_optional(&self.pool)).await?;
        Ok(row.map(|r| row_to_json(&r)))
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let tx = bounded(self.timeout, "begin", self.pool.begin()).await?;
        Ok(Box::new(PgTx {
            tx,
            timeout: self.timeout,
        }))
    }

    async fn ping(&self) -> Result<(), AppError> {
        bounded(self.timeout, "ping", sqlx::query("SELECT 1").execute(&self.pool)).await?;
        Ok(())
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
    timeout: Option<Duration>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn execute(&mut self, q: &QueryBuf) -> Result<Execution, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query (tx)");
        if q.returning {
            let row = bounded(self.timeout, "statement", bind_all(q).fetch_optional(&mut *self.tx)).await?;
            let returned = row.map(|r| row_to_json(&r));
            return Ok(Execution {
                rows_affected: u64::from(returned.is_some()),
                returned,
            });
        }
        let done = bounded(self.timeout, "statement", bind_all(q).execute(&mut *self.tx)).await?;
        Ok(Execution {
            rows_affected: done.rows_affected(),
            returned: None,
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let timeout = self.timeout;
        bounded(timeout, "commit", self.tx.commit()).await
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        let timeout = self.timeout;
        bounded(timeout, "rollback", self.tx.rollback()).await
    }
}
