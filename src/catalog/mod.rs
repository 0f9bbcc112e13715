use crate::data_types::TableRef;
use crate::repository::interface::Error as RepositoryError;

pub mod expand;
pub mod metadata;
pub mod records;

pub use expand::ForeignKeyExpander;
pub use metadata::MetadataInspector;
pub use records::{CreatedRecord, RecordAccessor, RecordKey};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Malformed input from the caller
    #[error("{reason}")]
    Validation { reason: String },

    #[error("Table {name:?} doesn't exist")]
    TableDoesNotExist { name: String },

    #[error("Record with {key} not found in table {table:?}")]
    RecordNotFound { table: String, key: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CatalogError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Convert a repository error raised while accessing `table`, naming the table
    /// if it turned out not to exist
    pub fn in_table(table: &TableRef) -> impl FnOnce(RepositoryError) -> Self + '_ {
        move |err| match err {
            RepositoryError::UndefinedTable(_) => CatalogError::TableDoesNotExist {
                name: table.to_string(),
            },
            err => CatalogError::Repository(err),
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
