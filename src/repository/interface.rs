use std::fmt::Debug;

use async_trait::async_trait;

use crate::data_types::{ColumnInfo, ForeignKeyInfo, PrimaryKeyInfo, TableRef};
use crate::query::sql::{InsertQuery, SelectQuery};
use crate::record::Record;

/// Wrapper for conversion of database-specific error codes into actual errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unique constraint violation: {0}")]
    UniqueConstraintViolation(sqlx::Error),

    #[error("Foreign key constraint violation: {0}")]
    FKConstraintViolation(sqlx::Error),

    #[error("Not-null constraint violation: {0}")]
    NotNullViolation(sqlx::Error),

    #[error("Relation {0} does not exist")]
    UndefinedTable(String),

    // All other errors
    #[error("Internal SQL error: {0}")]
    SqlxError(sqlx::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Storage backend: catalog introspection plus generic row access.
///
/// Implementations receive validated queries only; every identifier in a
/// `SelectQuery`/`InsertQuery` has been checked against `get_columns` beforehand.
#[async_trait]
pub trait Repository: Send + Sync + Debug {
    /// Columns ordered by ordinal position. Empty if the table doesn't exist.
    async fn get_columns(
        &self,
        table: &TableRef,
        complete_attribute: bool,
    ) -> Result<Vec<ColumnInfo>, Error>;

    /// Primary key columns in key order. Fails with `UndefinedTable` for an
    /// unknown relation.
    async fn get_primary_key(&self, table: &TableRef) -> Result<Vec<PrimaryKeyInfo>, Error>;

    /// One entry per referencing column
    async fn get_foreign_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyInfo>, Error>;

    async fn select(&self, query: &SelectQuery) -> Result<Vec<Record>, Error>;

    /// Insert one row in its own transaction and return it as stored
    async fn insert(&self, query: &InsertQuery) -> Result<Record, Error>;
}
