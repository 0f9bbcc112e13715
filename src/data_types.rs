use std::fmt;

use serde::Serialize;

use crate::catalog::{CatalogError, CatalogResult};
use crate::query::sql::quote_identifier;
use crate::record::Record;

pub const DEFAULT_SCHEMA: &str = "public";

/// A schema-qualified relation name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Normalize a table identifier coming from a request.
    ///
    /// A dotted identifier (`schema.table`) is split when no schema was supplied
    /// separately; otherwise the supplied schema (or the default one) is used and the
    /// identifier is taken verbatim as the table name.
    pub fn resolve(
        identifier: &str,
        schema: Option<&str>,
        default_schema: &str,
    ) -> CatalogResult<Self> {
        let schema = schema.map(str::trim).filter(|s| !s.is_empty());
        let identifier = identifier.trim();

        let (schema, table) = match (schema, identifier.split_once('.')) {
            (Some(schema), _) => (schema, identifier),
            (None, Some((schema, table))) => {
                if table.contains('.') {
                    return Err(CatalogError::Validation {
                        reason: format!("Invalid table identifier {identifier:?}"),
                    });
                }
                (schema, table)
            }
            (None, None) => (default_schema, identifier),
        };

        if schema.is_empty() || table.is_empty() {
            return Err(CatalogError::Validation {
                reason: format!("Invalid table identifier {identifier:?}"),
            });
        }

        Ok(Self::new(schema, table))
    }

    /// `"schema"."table"`, safe to splice into SQL text
    pub fn quoted(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.table)
        )
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub ordinal_position: i32,
    pub column_name: String,
    pub is_nullable: bool,
    pub data_type: String,
    // Underlying type, used to cast bound parameters
    #[serde(skip)]
    pub udt_schema: String,
    #[serde(skip)]
    pub udt_name: String,
    /// Remaining catalog attributes, only fetched on request
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Record>,
}

impl ColumnInfo {
    pub fn cast_type(&self) -> Option<String> {
        if self.udt_name.is_empty() {
            return None;
        }

        Some(if self.udt_schema.is_empty() {
            quote_identifier(&self.udt_name)
        } else {
            format!(
                "{}.{}",
                quote_identifier(&self.udt_schema),
                quote_identifier(&self.udt_name)
            )
        })
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeyInfo {
    pub column_name: String,
    /// Output of `format_type`
    pub data_type: String,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
    pub table_schema: String,
    pub constraint_name: String,
    pub table_name: String,
    pub column_name: String,
    pub foreign_table_schema: String,
    pub foreign_table_name: String,
    pub foreign_column_name: String,
}

impl ForeignKeyInfo {
    pub fn target(&self) -> TableRef {
        TableRef::new(&self.foreign_table_schema, &self.foreign_table_name)
    }
}

/// 1-based page number and page size. Either being zero disables pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn limit_offset(&self) -> Option<(u64, u64)> {
        if self.page == 0 || self.page_size == 0 {
            return None;
        }

        let limit = self.page_size as u64;
        Some((limit, (self.page as u64 - 1) * limit))
    }
}
