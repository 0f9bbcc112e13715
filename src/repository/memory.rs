//! A `Repository` kept entirely in memory.
//!
//! Predicates are evaluated row by row with Postgres-like comparison rules (bound
//! text coerced to the column's type, NULL never matches). Inserts enforce NOT NULL,
//! primary key uniqueness and foreign keys, and fill a missing single integer
//! primary key from a sequence.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use regex::RegexBuilder;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::data_types::{ColumnInfo, ForeignKeyInfo, PrimaryKeyInfo, TableRef};
use crate::query::condition::{Operator, ScalarValue};
use crate::query::predicate::{Operand, Predicate};
use crate::query::sql::{InsertQuery, SelectQuery};
use crate::record::{Record, Value};

use super::interface::{Error, Repository, Result};

/// Underlying type name for the `data_type` spellings used by table definitions
fn udt_name(data_type: &str) -> &str {
    match data_type {
        "smallint" => "int2",
        "integer" => "int4",
        "bigint" => "int8",
        "real" => "float4",
        "double precision" => "float8",
        "boolean" => "bool",
        "character varying" => "varchar",
        other => other,
    }
}

fn is_integer_type(udt_name: &str) -> bool {
    matches!(udt_name, "int2" | "int4" | "int8")
}

#[derive(Debug, Clone)]
struct Reference {
    column: String,
    target: TableRef,
    target_column: String,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    columns: Vec<ColumnInfo>,
    primary_key: Vec<String>,
    references: Vec<Reference>,
    rows: Vec<Record>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, name: &str, data_type: &str, is_nullable: bool) -> Self {
        self.columns.push(ColumnInfo {
            ordinal_position: self.columns.len() as i32 + 1,
            column_name: name.to_string(),
            is_nullable,
            data_type: data_type.to_string(),
            udt_schema: "pg_catalog".to_string(),
            udt_name: udt_name(data_type).to_string(),
            attributes: None,
        });
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn references(mut self, column: &str, target: TableRef, target_column: &str) -> Self {
        self.references.push(Reference {
            column: column.to_string(),
            target,
            target_column: target_column.to_string(),
        });
        self
    }

    pub fn rows(mut self, rows: Vec<Record>) -> Self {
        self.rows.extend(rows);
        self
    }

    fn column_info(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.column_name == name)
    }

    /// Reorder a row to the table's column order, missing columns set to NULL
    fn normalize(&self, mut row: Record) -> Record {
        self.columns
            .iter()
            .map(|c| {
                let value = row.remove(&c.column_name).unwrap_or(Value::Null);
                (c.column_name.clone(), value)
            })
            .collect()
    }

    /// Sequence default for a single integer primary key column
    fn serial_column(&self) -> Option<&ColumnInfo> {
        match self.primary_key.as_slice() {
            [only] => self
                .column_info(only)
                .filter(|c| is_integer_type(&c.udt_name)),
            _ => None,
        }
    }

    fn next_serial(&self, column: &str) -> i64 {
        self.rows
            .iter()
            .filter_map(|row| match row.get(column) {
                Some(Value::Integer(i)) => Some(*i),
                _ => None,
            })
            .max()
            .unwrap_or(0)
            + 1
    }

    fn complete_attributes(&self, table: &TableRef, column: &ColumnInfo) -> Record {
        let default = match self.serial_column() {
            Some(serial) if serial.column_name == column.column_name => Value::Text(format!(
                "nextval('{}_{}_seq'::regclass)",
                table.table, column.column_name
            )),
            _ => Value::Null,
        };

        [
            ("table_catalog", Value::Text("memory".to_string())),
            ("table_schema", Value::Text(table.schema.clone())),
            ("table_name", Value::Text(table.table.clone())),
            ("column_default", default),
            ("udt_schema", Value::Text(column.udt_schema.clone())),
            ("udt_name", Value::Text(column.udt_name.clone())),
        ]
        .into_iter()
        .collect()
    }
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: RwLock<HashMap<TableRef, MemoryTable>>,
    executed: RwLock<Vec<String>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, table: TableRef, mut definition: MemoryTable) {
        let rows = std::mem::take(&mut definition.rows);
        definition.rows = rows.into_iter().map(|r| definition.normalize(r)).collect();
        self.tables.write().insert(table, definition);
    }

    /// Inline rendering of every statement run so far
    pub fn executed_statements(&self) -> Vec<String> {
        self.executed.read().clone()
    }

    fn undefined_table(table: &TableRef) -> Error {
        Error::UndefinedTable(format!("relation \"{table}\" does not exist"))
    }
}

fn protocol_error(message: String) -> sqlx::Error {
    sqlx::Error::Protocol(message)
}

fn scalar_as_f64(value: &ScalarValue) -> Option<f64> {
    match value {
        ScalarValue::Integer(i) => Some(*i as f64),
        ScalarValue::Float(f) => Some(*f),
        ScalarValue::Text(s) => s.trim().parse().ok(),
        ScalarValue::Bool(_) | ScalarValue::Uuid(_) => None,
    }
}

/// Compare a stored value with a bound operand, the operand taking the value's type
fn compare(value: &Value, operand: &ScalarValue) -> Option<Ordering> {
    match value {
        Value::Null | Value::Json(_) | Value::Record(_) => None,
        Value::Integer(i) => match operand {
            ScalarValue::Integer(j) => Some(i.cmp(j)),
            other => (*i as f64).partial_cmp(&scalar_as_f64(other)?),
        },
        Value::Float(f) => f.partial_cmp(&scalar_as_f64(operand)?),
        Value::Bool(b) => match operand {
            ScalarValue::Bool(o) => Some(b.cmp(o)),
            ScalarValue::Text(s) => Some(b.cmp(&s.trim().parse::<bool>().ok()?)),
            _ => None,
        },
        Value::Text(s) => Some(s.as_str().cmp(operand.to_text().as_str())),
        Value::Uuid(u) => Some(u.to_string().cmp(&operand.to_text().to_lowercase())),
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Record(_) => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Text(s) => Some(s.clone()),
        Value::Uuid(u) => Some(u.to_string()),
        Value::Json(j) => Some(j.to_string()),
    }
}

fn like(value: &Value, pattern: &ScalarValue, case_insensitive: bool) -> Option<bool> {
    let text = value_text(value)?;

    let mut expression = String::from("^");
    for c in pattern.to_text().chars() {
        match c {
            '%' => expression.push_str(".*"),
            '_' => expression.push('.'),
            c => expression.push_str(&regex::escape(&c.to_string())),
        }
    }
    expression.push('$');

    let regex = RegexBuilder::new(&expression)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .ok()?;
    Some(regex.is_match(&text))
}

fn evaluate(predicate: &Predicate, row: &Record) -> bool {
    match predicate {
        Predicate::Group { all, any } => {
            all.iter().all(|p| evaluate(p, row))
                && (any.is_empty() || any.iter().any(|p| evaluate(p, row)))
        }
        Predicate::Condition {
            column,
            operator,
            operand,
        } => {
            let value = row.get(&column.name).unwrap_or(&Value::Null);
            let scalars = match operand {
                Operand::Scalar(scalar) => std::slice::from_ref(scalar),
                Operand::List(values) => values.as_slice(),
            };
            let Some(first) = scalars.first() else {
                return false;
            };

            let matched = match operator {
                Operator::Eq => compare(value, first).map(Ordering::is_eq),
                Operator::NotEq => compare(value, first).map(Ordering::is_ne),
                Operator::Lt => compare(value, first).map(Ordering::is_lt),
                Operator::LtEq => compare(value, first).map(Ordering::is_le),
                Operator::Gt => compare(value, first).map(Ordering::is_gt),
                Operator::GtEq => compare(value, first).map(Ordering::is_ge),
                Operator::Like => like(value, first, false),
                Operator::NotLike => like(value, first, false).map(|m| !m),
                Operator::ILike => like(value, first, true),
                Operator::NotILike => like(value, first, true).map(|m| !m),
                Operator::In => Some(
                    scalars
                        .iter()
                        .any(|s| compare(value, s) == Some(Ordering::Equal)),
                ),
                Operator::NotIn => (!value.is_null()).then(|| {
                    scalars
                        .iter()
                        .all(|s| matches!(compare(value, s), Some(o) if o.is_ne()))
                }),
            };
            matched.unwrap_or(false)
        }
    }
}

/// Convert an inserted JSON value to the column's type
fn coerce(value: &JsonValue, column: &ColumnInfo) -> std::result::Result<Value, sqlx::Error> {
    let invalid = || {
        protocol_error(format!(
            "invalid input syntax for type {}: {value}",
            column.data_type
        ))
    };

    if value.is_null() {
        return Ok(Value::Null);
    }

    Ok(match column.udt_name.as_str() {
        "int2" | "int4" | "int8" => match value {
            JsonValue::Number(n) => Value::Integer(n.as_i64().ok_or_else(invalid)?),
            JsonValue::String(s) => Value::Integer(s.trim().parse().map_err(|_| invalid())?),
            _ => return Err(invalid()),
        },
        "float4" | "float8" | "numeric" => match value {
            JsonValue::Number(n) => Value::Float(n.as_f64().ok_or_else(invalid)?),
            JsonValue::String(s) => Value::Float(s.trim().parse().map_err(|_| invalid())?),
            _ => return Err(invalid()),
        },
        "bool" => match value {
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::String(s) => Value::Bool(s.trim().parse().map_err(|_| invalid())?),
            _ => return Err(invalid()),
        },
        "uuid" => match value {
            JsonValue::String(s) => Value::Uuid(Uuid::parse_str(s).map_err(|_| invalid())?),
            _ => return Err(invalid()),
        },
        "json" | "jsonb" => Value::Json(value.clone()),
        _ => match value {
            JsonValue::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        },
    })
}

fn same_key(a: &Value, b: &Value) -> bool {
    match (a.lookup_key(), b.lookup_key()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_columns(
        &self,
        table: &TableRef,
        complete_attribute: bool,
    ) -> Result<Vec<ColumnInfo>, Error> {
        let tables = self.tables.read();
        let Some(definition) = tables.get(table) else {
            return Ok(vec![]);
        };

        Ok(definition
            .columns
            .iter()
            .map(|c| {
                let mut column = c.clone();
                if complete_attribute {
                    column.attributes = Some(definition.complete_attributes(table, c));
                }
                column
            })
            .collect())
    }

    async fn get_primary_key(&self, table: &TableRef) -> Result<Vec<PrimaryKeyInfo>, Error> {
        let tables = self.tables.read();
        let definition = tables
            .get(table)
            .ok_or_else(|| Self::undefined_table(table))?;

        Ok(definition
            .primary_key
            .iter()
            .filter_map(|name| definition.column_info(name))
            .map(|c| PrimaryKeyInfo {
                column_name: c.column_name.clone(),
                data_type: c.data_type.clone(),
            })
            .collect())
    }

    async fn get_foreign_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyInfo>, Error> {
        let tables = self.tables.read();
        let Some(definition) = tables.get(table) else {
            return Ok(vec![]);
        };

        let mut foreign_keys: Vec<ForeignKeyInfo> = definition
            .references
            .iter()
            .map(|r| ForeignKeyInfo {
                table_schema: table.schema.clone(),
                constraint_name: format!("{}_{}_fkey", table.table, r.column),
                table_name: table.table.clone(),
                column_name: r.column.clone(),
                foreign_table_schema: r.target.schema.clone(),
                foreign_table_name: r.target.table.clone(),
                foreign_column_name: r.target_column.clone(),
            })
            .collect();
        foreign_keys.sort_by(|a, b| a.constraint_name.cmp(&b.constraint_name));

        Ok(foreign_keys)
    }

    async fn select(&self, query: &SelectQuery) -> Result<Vec<Record>, Error> {
        self.executed.write().push(query.to_string());

        let tables = self.tables.read();
        let definition = tables
            .get(&query.table)
            .ok_or_else(|| Self::undefined_table(&query.table))?;

        let matching = definition
            .rows
            .iter()
            .filter(|row| query.filters.iter().all(|p| evaluate(p, row)));

        Ok(match query.pagination.limit_offset() {
            Some((limit, offset)) => matching
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect(),
            None => matching.cloned().collect(),
        })
    }

    async fn insert(&self, query: &InsertQuery) -> Result<Record, Error> {
        self.executed.write().push(query.to_statement().sql);

        let mut tables = self.tables.write();
        let definition = tables
            .get(&query.table)
            .ok_or_else(|| Self::undefined_table(&query.table))?;

        let mut row = Record::new();
        for value in &query.values {
            let column = definition.column_info(&value.column).ok_or_else(|| {
                Error::SqlxError(protocol_error(format!(
                    "column \"{}\" of relation \"{}\" does not exist",
                    value.column, query.table
                )))
            })?;
            row.insert(
                &column.column_name,
                coerce(&value.value, column).map_err(Error::SqlxError)?,
            );
        }

        if let Some(serial) = definition.serial_column() {
            if !row.contains_key(&serial.column_name) {
                let next = definition.next_serial(&serial.column_name);
                row.insert(&serial.column_name, Value::Integer(next));
            }
        }
        let row = definition.normalize(row);

        for column in &definition.columns {
            if !column.is_nullable && row.get(&column.column_name).map_or(true, Value::is_null)
            {
                return Err(Error::NotNullViolation(protocol_error(format!(
                    "null value in column \"{}\" violates not-null constraint",
                    column.column_name
                ))));
            }
        }

        if !definition.primary_key.is_empty() {
            let duplicate = definition.rows.iter().any(|existing| {
                definition.primary_key.iter().all(|key| {
                    match (existing.get(key), row.get(key)) {
                        (Some(a), Some(b)) => same_key(a, b),
                        _ => false,
                    }
                })
            });
            if duplicate {
                return Err(Error::UniqueConstraintViolation(protocol_error(format!(
                    "duplicate key value violates unique constraint \"{}_pkey\"",
                    query.table.table
                ))));
            }
        }

        for reference in &definition.references {
            let Some(value) = row.get(&reference.column).filter(|v| !v.is_null()) else {
                continue;
            };
            let exists = tables.get(&reference.target).map_or(false, |target| {
                target.rows.iter().any(|candidate| {
                    candidate
                        .get(&reference.target_column)
                        .map_or(false, |c| same_key(c, value))
                })
            });
            if !exists {
                return Err(Error::FKConstraintViolation(protocol_error(format!(
                    "insert or update on table \"{}\" violates foreign key constraint \"{}_{}_fkey\"",
                    query.table.table, query.table.table, reference.column
                ))));
            }
        }

        if let Some(definition) = tables.get_mut(&query.table) {
            definition.rows.push(row.clone());
        }
        Ok(row)
    }
}

pub mod testutils {
    use serde_json::{json, Value as JsonValue};

    use super::{MemoryRepository, MemoryTable};
    use crate::data_types::TableRef;
    use crate::record::Record;

    pub fn record(value: JsonValue) -> Record {
        match value {
            JsonValue::Object(map) => Record::from(map),
            _ => Record::new(),
        }
    }

    /// The company fixture: departments, employees referencing a department and a
    /// manager, and project assignments with a composite key
    pub fn add_company_fixture(repository: &MemoryRepository, schema: &str) {
        let department = TableRef::new(schema, "department");
        let employee = TableRef::new(schema, "employee");

        repository.create_table(
            department.clone(),
            MemoryTable::new()
                .column("id", "integer", false)
                .column("name", "text", false)
                .primary_key(&["id"])
                .rows(vec![
                    record(json!({"id": 1, "name": "Engineering"})),
                    record(json!({"id": 2, "name": "Sales"})),
                ]),
        );

        repository.create_table(
            employee.clone(),
            MemoryTable::new()
                .column("id", "integer", false)
                .column("name", "text", false)
                .column("department_id", "integer", true)
                .column("manager_id", "integer", true)
                .primary_key(&["id"])
                .references("department_id", department, "id")
                .references("manager_id", employee.clone(), "id")
                .rows(vec![
                    record(json!({"id": 1, "name": "Ada", "department_id": 1, "manager_id": null})),
                    record(json!({"id": 2, "name": "Grace", "department_id": 1, "manager_id": 1})),
                    record(json!({"id": 3, "name": "Linus", "department_id": 2, "manager_id": 1})),
                ]),
        );

        repository.create_table(
            TableRef::new(schema, "assignment"),
            MemoryTable::new()
                .column("employee_id", "integer", false)
                .column("project", "text", false)
                .primary_key(&["employee_id", "project"])
                .references("employee_id", employee, "id")
                .rows(vec![
                    record(json!({"employee_id": 1, "project": "compiler"})),
                    record(json!({"employee_id": 2, "project": "compiler"})),
                    record(json!({"employee_id": 3, "project": "kernel"})),
                ]),
        );
    }

    pub fn make_repository(schema: &str) -> MemoryRepository {
        let repository = MemoryRepository::new();
        add_company_fixture(&repository, schema);
        repository
    }
}
