//! Statement execution seam: pooled reads and request-scoped transactions.

mod pg;
mod row;

pub use pg::PgStore;
pub use row::row_to_json;

use crate::error::AppError;
use crate::sql::QueryBuf;
use async_trait::async_trait;
use serde_json::Value;

/// Outcome of one statement inside a transaction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Execution {
    pub rows_affected: u64,
    /// Row produced by a RETURNING statement.
    pub returned: Option<Value>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Run a read outside any transaction.
    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Value>, AppError>;

    async fn fetch_optional(&self, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        Ok(self.fetch_all(q).await?.into_iter().next())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}

/// One open transaction. Dropping it without commit rolls back.
#[async_trait]
pub trait StoreTx: Send {
    async fn execute(&mut self, q: &QueryBuf) -> Result<Execution, AppError>;
    async fn commit(self: Box<Self>) -> Result<(), AppError>;
    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}
