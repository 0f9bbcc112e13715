use std::sync::Arc;

use crate::data_types::{ColumnInfo, ForeignKeyInfo, PrimaryKeyInfo, TableRef};
use crate::repository::interface::Repository;

use super::{CatalogError, CatalogResult};

/// Read-only view of a table's structure, fetched fresh on every call
#[derive(Debug, Clone)]
pub struct MetadataInspector {
    repository: Arc<dyn Repository>,
}

impl MetadataInspector {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Columns in ordinal order. A table without columns in the catalog doesn't exist.
    pub async fn get_columns(
        &self,
        table: &TableRef,
        complete_attribute: bool,
    ) -> CatalogResult<Vec<ColumnInfo>> {
        let columns = self
            .repository
            .get_columns(table, complete_attribute)
            .await
            .map_err(CatalogError::in_table(table))?;

        if columns.is_empty() {
            return Err(CatalogError::TableDoesNotExist {
                name: table.to_string(),
            });
        }
        Ok(columns)
    }

    pub async fn get_primary_key(&self, table: &TableRef) -> CatalogResult<Vec<PrimaryKeyInfo>> {
        self.repository
            .get_primary_key(table)
            .await
            .map_err(CatalogError::in_table(table))
    }

    pub async fn get_primary_key_names(&self, table: &TableRef) -> CatalogResult<Vec<String>> {
        Ok(self
            .get_primary_key(table)
            .await?
            .into_iter()
            .map(|key| key.column_name)
            .collect())
    }

    pub async fn get_foreign_keys(&self, table: &TableRef) -> CatalogResult<Vec<ForeignKeyInfo>> {
        self.repository
            .get_foreign_keys(table)
            .await
            .map_err(CatalogError::in_table(table))
    }
}
