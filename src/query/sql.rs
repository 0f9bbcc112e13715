//! SQL text helpers and the statements the repositories execute.
//!
//! Identifiers are always double-quoted in executable SQL, values are always bound
//! parameters. The inline (`Display`) renderings exist for logging only.

use std::borrow::Cow;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::data_types::{Pagination, TableRef};
use crate::query::predicate::{ParamWriter, Predicate};

lazy_static! {
    static ref PLAIN_IDENTIFIER: Regex = Regex::new("^[a-z_][a-z0-9_]*$").unwrap();
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Identifier as it would be written by hand: bare when it is a plain lowercase
/// name, quoted otherwise
pub fn display_identifier(name: &str) -> Cow<'_, str> {
    if PLAIN_IDENTIFIER.is_match(name) {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(quote_identifier(name))
    }
}

/// SQL text with `$n` placeholders and the text value bound to each of them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub table: TableRef,
    /// Joined with AND
    pub filters: Vec<Predicate>,
    pub pagination: Pagination,
}

impl SelectQuery {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            filters: vec![],
            pagination: Pagination::disabled(),
        }
    }

    pub fn with_filters(mut self, filters: Vec<Predicate>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn to_statement(&self) -> Statement {
        let mut sql = format!("SELECT * FROM {}", self.table.quoted());
        let mut params = vec![];

        for (i, filter) in self.filters.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            filter.write_sql(&mut sql, &mut ParamWriter::new(&mut params));
        }

        if let Some((limit, offset)) = self.pagination.limit_offset() {
            sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
        }

        Statement { sql, params }
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SELECT * FROM {}.{}",
            display_identifier(&self.table.schema),
            display_identifier(&self.table.table)
        )?;
        for (i, filter) in self.filters.iter().enumerate() {
            write!(f, "{}{filter}", if i == 0 { " WHERE " } else { " AND " })?;
        }
        if let Some((limit, offset)) = self.pagination.limit_offset() {
            write!(f, " LIMIT {limit} OFFSET {offset}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertValue {
    pub column: String,
    /// Quoted type the bound text is cast to
    pub cast: Option<String>,
    pub value: JsonValue,
}

impl InsertValue {
    /// Postgres names array types after their element type with a leading `_`
    fn is_array_column(&self) -> bool {
        self.cast
            .as_deref()
            .and_then(|cast| cast.rsplit('.').next())
            .map_or(false, |name| name.starts_with("\"_"))
    }

    fn param(&self) -> Option<String> {
        match &self.value {
            JsonValue::Null => None,
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Array(values) if self.is_array_column() => Some(array_literal(values)),
            other => Some(other.to_string()),
        }
    }
}

/// Text form of an array value, e.g. `{"1","a \"b\"",NULL}`; nested JSON arrays
/// become nested dimensions
fn array_literal(values: &[JsonValue]) -> String {
    let elements = values
        .iter()
        .map(|value| match value {
            JsonValue::Null => "NULL".to_string(),
            JsonValue::Array(inner) => array_literal(inner),
            JsonValue::String(s) => quote_array_element(s),
            other => quote_array_element(&other.to_string()),
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{elements}}}")
}

fn quote_array_element(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    pub table: TableRef,
    pub values: Vec<InsertValue>,
}

impl InsertQuery {
    pub fn to_statement(&self) -> Statement {
        if self.values.is_empty() {
            return Statement {
                sql: format!(
                    "INSERT INTO {} DEFAULT VALUES RETURNING *",
                    self.table.quoted()
                ),
                params: vec![],
            };
        }

        let columns = self
            .values
            .iter()
            .map(|v| quote_identifier(&v.column))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = self
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| match &v.cast {
                Some(cast) => format!("${}::{cast}", i + 1),
                None => format!("${}", i + 1),
            })
            .collect::<Vec<_>>()
            .join(", ");

        Statement {
            sql: format!(
                "INSERT INTO {} ({columns}) VALUES ({placeholders}) RETURNING *",
                self.table.quoted()
            ),
            params: self.values.iter().map(InsertValue::param).collect(),
        }
    }
}
