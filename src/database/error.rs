use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    // Connection errors
    #[error("Failed to connect to database at {path}: {reason}")]
    ConnectionFailed {
        path: PathBuf,
        reason: String,
        #[source]
        source: sqlx::Error,
    },

    // Transaction errors
    #[error("Transaction on {scope} failed: {reason}")]
    TransactionFailed {
        scope: String,
        reason: String,
        #[source]
        source: sqlx::Error,
    },

    // Query errors
    #[error("Query failed: {query_type} - {reason}")]
    QueryFailed {
        query_type: String,
        reason: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Duplicate entry for {table}.{column}: {value}")]
    DuplicateEntry {
        table: String,
        column: String,
        value: String,
    },

    // Schema errors
    #[error("Schema migration failed: {reason}")]
    MigrationFailed {
        reason: String,
        #[source]
        source: sqlx::migrate::MigrateError,
    },

    // Serialization errors
    #[error("Failed to deserialize {data_type} from storage: {reason}")]
    DeserializationFailed {
        data_type: String,
        reason: String,
        column: String,
        row_id: Option<i64>,
    },
}

impl DatabaseError {
    // Helper constructors
    pub fn connection_failed(
        path: PathBuf,
        reason: impl Into<String>,
        source: sqlx::Error,
    ) -> Self {
        Self::ConnectionFailed {
            path,
            reason: reason.into(),
            source,
        }
    }

    pub fn transaction_failed(
        scope: impl Into<String>,
        reason: impl Into<String>,
        source: sqlx::Error,
    ) -> Self {
        Self::TransactionFailed {
            scope: scope.into(),
            reason: reason.into(),
            source,
        }
    }

    pub fn query_failed(
        query_type: impl Into<String>,
        reason: impl Into<String>,
        source: sqlx::Error,
    ) -> Self {
        Self::QueryFailed {
            query_type: query_type.into(),
            reason: reason.into(),
            source,
        }
    }

    pub fn duplicate_entry(
        table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::DuplicateEntry {
            table: table.into(),
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn deserialization_failed(
        data_type: impl Into<String>,
        reason: impl Into<String>,
        column: impl Into<String>,
        row_id: Option<i64>,
    ) -> Self {
        Self::DeserializationFailed {
            data_type: data_type.into(),
            reason: reason.into(),
            column: column.into(),
            row_id,
        }
    }
}
