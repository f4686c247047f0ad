pub mod error;
pub mod models;
pub mod operations;


use crate::Result;
use bon::bon;
use error::DatabaseError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub use models::*;
pub use operations::{DbOp, DbOpResult, execute_op};

/// Database connection pool
pub struct DB {
    pool: SqlitePool,
}

#[bon]
impl DB {
    #[builder]
    /// Create a new database connection pool
    pub async fn new(
        db_path: &Path,
        #[builder(default = Duration::from_secs(1))] busy_timeout: Duration,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(busy_timeout)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            DatabaseError::connection_failed(
                db_path.to_path_buf(),
                "Failed to create database pool",
                e,
            )
        })?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::MigrationFailed {
                reason: "Failed to run migrations".to_string(),
                source: e,
            })?;

        debug!(path = %db_path.display(), "Database ready");
        Ok(Self { pool })
    }

    pub fn transaction(&self) -> TransactionBuilder<'_> {
        TransactionBuilder { db: self }
    }

    /// Execute a single database operation
    pub async fn execute(&self, op: &DbOp<'_>) -> Result<DbOpResult> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            DatabaseError::transaction_failed("single operation", "Failed to begin transaction", e)
        })?;

        let result = execute_op(&mut tx, op).await?;

        tx.commit().await.map_err(|e| {
            DatabaseError::transaction_failed("single operation", "Failed to commit transaction", e)
        })?;

        Ok(result)
    }

    /// Close the database pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}

pub struct TransactionBuilder<'db> {
    db: &'db DB,
}

/// An open transaction holding the results of the operations run so far.
///
/// Dropping it without calling [`ExecutedTransaction::commit`] rolls back.
pub struct ExecutedTransaction<R> {
    tx: Transaction<'static, Sqlite>,
    result: R,
}

pub struct CommittedTransaction<R> {
    result: R,
}

impl<'db> TransactionBuilder<'db> {
    pub async fn execute_ops(
        self,
        ops: &[DbOp<'_>],
    ) -> Result<ExecutedTransaction<Vec<DbOpResult>>> {
        let mut tx =
            self.db.pool.begin().await.map_err(|e| {
                DatabaseError::transaction_failed("batch", "Failed to begin transaction", e)
            })?;

        let mut results = Vec::with_capacity(ops.len());

        for op in ops {
            let result = execute_op(&mut tx, op).await?;
            results.push(result);
        }

        Ok(ExecutedTransaction {
            tx,
            result: results,
        })
    }
}

impl ExecutedTransaction<Vec<DbOpResult>> {
    /// Run further operations inside the same transaction.
    pub async fn execute_ops(mut self, ops: &[DbOp<'_>]) -> Result<Self> {
        for op in ops {
            let result = execute_op(&mut self.tx, op).await?;
            self.result.push(result);
        }
        Ok(self)
    }
}

impl<R> ExecutedTransaction<R> {
    pub async fn commit(self) -> Result<CommittedTransaction<R>> {
        self.tx.commit().await.map_err(|e| {
            DatabaseError::transaction_failed("batch", "Failed to commit transaction", e)
        })?;
        Ok(CommittedTransaction {
            result: self.result,
        })
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(|e| {
            DatabaseError::transaction_failed("batch", "Failed to roll back transaction", e)
        })?;
        Ok(())
    }

    pub fn result(&self) -> &R {
        &self.result
    }
}

impl<R> CommittedTransaction<R> {
    pub fn into_result(self) -> R {
        self.result
    }

    pub fn result(&self) -> &R {
        &self.result
    }
}
