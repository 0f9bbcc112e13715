use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use futures::TryStreamExt;
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use sqlx::{
    postgres::{
        types::PgInterval, PgArguments, PgPoolOptions, PgRow, PgTypeInfo, PgTypeKind,
    },
    query::Query,
    Column, Decode, Executor, PgPool, Postgres, Row, Type, TypeInfo,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::schema::Database;
use crate::data_types::{ColumnInfo, ForeignKeyInfo, PrimaryKeyInfo, TableRef};
use crate::query::sql::{InsertQuery, SelectQuery, Statement};
use crate::record::{Record, Value};

use super::interface::{Error, Repository, Result};

type SqlxResult<T> = std::result::Result<T, sqlx::Error>;

/// Keys of `information_schema.columns` already carried by `ColumnInfo` itself
const CORE_COLUMN_KEYS: [&str; 4] =
    ["ordinal_position", "column_name", "is_nullable", "data_type"];

const COLUMNS_QUERY: &str = r#"
SELECT
    c.ordinal_position::INT4 AS ordinal_position,
    c.column_name::TEXT AS column_name,
    c.is_nullable::TEXT AS is_nullable,
    c.data_type::TEXT AS data_type,
    c.udt_schema::TEXT AS udt_schema,
    c.udt_name::TEXT AS udt_name,
    CASE WHEN $3 THEN row_to_json(c) END AS attributes
FROM information_schema.columns c
WHERE c.table_schema = $1 AND c.table_name = $2
ORDER BY c.ordinal_position"#;

const PRIMARY_KEY_QUERY: &str = r#"
SELECT
    a.attname::TEXT AS column_name,
    format_type(a.atttypid, a.atttypmod) AS data_type
FROM pg_index i
JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
WHERE i.indrelid = $1::TEXT::regclass AND i.indisprimary
ORDER BY array_position(i.indkey::INT2[], a.attnum)"#;

// One row per (constraint, column) pair; multi-column keys stay aligned
const FOREIGN_KEYS_QUERY: &str = r#"
SELECT
    ns.nspname::TEXT AS table_schema,
    con.conname::TEXT AS constraint_name,
    cl.relname::TEXT AS table_name,
    att.attname::TEXT AS column_name,
    fns.nspname::TEXT AS foreign_table_schema,
    fcl.relname::TEXT AS foreign_table_name,
    fatt.attname::TEXT AS foreign_column_name
FROM pg_constraint con
JOIN pg_class cl ON cl.oid = con.conrelid
JOIN pg_namespace ns ON ns.oid = cl.relnamespace
JOIN pg_class fcl ON fcl.oid = con.confrelid
JOIN pg_namespace fns ON fns.oid = fcl.relnamespace
CROSS JOIN LATERAL unnest(con.conkey, con.confkey)
    WITH ORDINALITY AS k(attnum, foreign_attnum, position)
JOIN pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = k.attnum
JOIN pg_attribute fatt ON fatt.attrelid = con.confrelid AND fatt.attnum = k.foreign_attnum
WHERE con.contype = 'f' AND ns.nspname = $1 AND cl.relname = $2
ORDER BY con.conname, k.position"#;

#[derive(sqlx::FromRow)]
struct ColumnRow {
    ordinal_position: i32,
    column_name: String,
    is_nullable: String,
    data_type: String,
    udt_schema: String,
    udt_name: String,
    attributes: Option<JsonValue>,
}

impl From<ColumnRow> for ColumnInfo {
    fn from(row: ColumnRow) -> Self {
        let attributes = row.attributes.map(|attributes| match attributes {
            JsonValue::Object(mut map) => {
                for key in CORE_COLUMN_KEYS {
                    map.remove(key);
                }
                Record::from(map)
            }
            _ => Record::new(),
        });

        Self {
            ordinal_position: row.ordinal_position,
            column_name: row.column_name,
            is_nullable: row.is_nullable == "YES",
            data_type: row.data_type,
            udt_schema: row.udt_schema,
            udt_name: row.udt_name,
            attributes,
        }
    }
}

#[derive(Debug)]
pub struct PostgresRepository {
    pub executor: PgPool,
}

impl PostgresRepository {
    pub async fn connect(config: &Database) -> std::result::Result<Self, sqlx::Error> {
        let statement_timeout = config.statement_timeout_ms;

        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .idle_timeout(Duration::from_millis(config.idle_timeout_ms))
            .test_before_acquire(true)
            .after_connect(move |c, _m| {
                Box::pin(async move {
                    if let Some(timeout) = statement_timeout {
                        let query = format!("SET statement_timeout = {timeout};");
                        c.execute(sqlx::query(&query)).await?;
                    }
                    Ok(())
                })
            })
            .connect(&config.dsn)
            .await?;

        Ok(Self { executor: pool })
    }

    pub fn interpret_error(error: sqlx::Error) -> Error {
        if let sqlx::Error::Database(ref d) = error {
            // Reference: https://www.postgresql.org/docs/current/errcodes-appendix.html
            if let Some(code) = d.code() {
                match code.as_ref() {
                    "23505" => return Error::UniqueConstraintViolation(error),
                    "23503" => return Error::FKConstraintViolation(error),
                    "23502" => return Error::NotNullViolation(error),
                    "42P01" => return Error::UndefinedTable(d.message().to_string()),
                    _ => {}
                }
            }
        }
        Error::SqlxError(error)
    }

    fn bind(statement: &Statement) -> Query<'_, Postgres, PgArguments> {
        statement
            .params
            .iter()
            .fold(sqlx::query(&statement.sql), |query, param| {
                query.bind(param.as_deref())
            })
    }
}

/// `try_get`, or `try_get_unchecked` for values whose reported type is a wrapper
/// (enum, domain) around the Rust type's own
fn get<'r, T>(row: &'r PgRow, index: usize, unchecked: bool) -> SqlxResult<Option<T>>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    if unchecked {
        row.try_get_unchecked::<Option<T>, _>(index)
    } else {
        row.try_get::<Option<T>, _>(index)
    }
}

fn json_array<T: Into<JsonValue>>(values: Option<Vec<Option<T>>>) -> Value {
    values.map_or(Value::Null, |values| Value::Json(JsonValue::from(values)))
}

/// Decode a value of a base type. `None` if the type isn't supported.
fn decode_scalar(
    row: &PgRow,
    index: usize,
    type_name: &str,
    unchecked: bool,
) -> SqlxResult<Option<Value>> {
    let value = match type_name {
        "BOOL" => get::<bool>(row, index, unchecked)?.map(Value::Bool),
        "INT2" => get::<i16>(row, index, unchecked)?.map(|i| Value::Integer(i.into())),
        "INT4" => get::<i32>(row, index, unchecked)?.map(|i| Value::Integer(i.into())),
        "INT8" => get::<i64>(row, index, unchecked)?.map(Value::Integer),
        "FLOAT4" => get::<f32>(row, index, unchecked)?.map(|f| Value::Float(f.into())),
        "FLOAT8" => get::<f64>(row, index, unchecked)?.map(Value::Float),
        "NUMERIC" => get::<Decimal>(row, index, unchecked)?.map(|d| Value::Text(d.to_string())),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            get::<String>(row, index, unchecked)?.map(Value::Text)
        }
        "UUID" => get::<Uuid>(row, index, unchecked)?.map(Value::Uuid),
        "JSON" | "JSONB" => get::<JsonValue>(row, index, unchecked)?.map(Value::Json),
        "TIMESTAMPTZ" => get::<chrono::DateTime<chrono::Utc>>(row, index, unchecked)?
            .map(|t| Value::Text(t.to_rfc3339())),
        "TIMESTAMP" => get::<chrono::NaiveDateTime>(row, index, unchecked)?
            .map(|t| Value::Text(t.to_string())),
        "DATE" => get::<chrono::NaiveDate>(row, index, unchecked)?
            .map(|d| Value::Text(d.to_string())),
        "TIME" => get::<chrono::NaiveTime>(row, index, unchecked)?
            .map(|t| Value::Text(t.to_string())),
        "INTERVAL" => get::<PgInterval>(row, index, unchecked)?.map(|i| {
            Value::Json(json!({
                "months": i.months,
                "days": i.days,
                "microseconds": i.microseconds,
            }))
        }),
        _ => return Ok(None),
    };

    Ok(Some(value.unwrap_or(Value::Null)))
}

/// Decode a one-dimensional array of a supported element type into a JSON array
fn decode_array(row: &PgRow, index: usize, element_name: &str) -> SqlxResult<Option<Value>> {
    let value = match element_name {
        "BOOL" => json_array(get::<Vec<Option<bool>>>(row, index, false)?),
        "INT2" => json_array(get::<Vec<Option<i16>>>(row, index, false)?),
        "INT4" => json_array(get::<Vec<Option<i32>>>(row, index, false)?),
        "INT8" => json_array(get::<Vec<Option<i64>>>(row, index, false)?),
        "FLOAT4" => json_array(get::<Vec<Option<f32>>>(row, index, false)?),
        "FLOAT8" => json_array(get::<Vec<Option<f64>>>(row, index, false)?),
        "NUMERIC" => json_array(
            get::<Vec<Option<Decimal>>>(row, index, false)?
                .map(|v| v.into_iter().map(|d| d.map(|d| d.to_string())).collect()),
        ),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            json_array(get::<Vec<Option<String>>>(row, index, false)?)
        }
        "UUID" => json_array(
            get::<Vec<Option<Uuid>>>(row, index, false)?
                .map(|v| v.into_iter().map(|u| u.map(|u| u.to_string())).collect()),
        ),
        "JSONB" => json_array(get::<Vec<Option<JsonValue>>>(row, index, false)?),
        _ => return Ok(None),
    };

    Ok(Some(value))
}

fn decode_column(row: &PgRow, index: usize, type_info: &PgTypeInfo) -> SqlxResult<Value> {
    let decoded = match type_info.kind() {
        PgTypeKind::Array(element) => decode_array(row, index, element.name())?,
        PgTypeKind::Enum(_) => Some(
            get::<String>(row, index, true)?.map_or(Value::Null, Value::Text),
        ),
        PgTypeKind::Domain(base) => decode_scalar(row, index, base.name(), true)?,
        _ => decode_scalar(row, index, type_info.name(), false)?,
    };

    Ok(decoded.unwrap_or_else(|| {
        warn!(
            "Column {:?} has unsupported type {}, returning null",
            row.columns()[index].name(),
            type_info.name()
        );
        Value::Null
    }))
}

pub fn row_to_record(row: &PgRow) -> SqlxResult<Record> {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, index, column.type_info())?;
        record.insert(column.name(), value);
    }
    Ok(record)
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_columns(
        &self,
        table: &TableRef,
        complete_attribute: bool,
    ) -> Result<Vec<ColumnInfo>, Error> {
        let columns: Vec<ColumnInfo> = sqlx::query_as::<_, ColumnRow>(COLUMNS_QUERY)
            .bind(&table.schema)
            .bind(&table.table)
            .bind(complete_attribute)
            .fetch(&self.executor)
            .map_ok(ColumnInfo::from)
            .try_collect()
            .await
            .map_err(Self::interpret_error)?;

        Ok(columns)
    }

    async fn get_primary_key(&self, table: &TableRef) -> Result<Vec<PrimaryKeyInfo>, Error> {
        sqlx::query_as(PRIMARY_KEY_QUERY)
            .bind(table.quoted())
            .fetch_all(&self.executor)
            .await
            .map_err(Self::interpret_error)
    }

    async fn get_foreign_keys(&self, table: &TableRef) -> Result<Vec<ForeignKeyInfo>, Error> {
        sqlx::query_as(FOREIGN_KEYS_QUERY)
            .bind(&table.schema)
            .bind(&table.table)
            .fetch_all(&self.executor)
            .await
            .map_err(Self::interpret_error)
    }

    async fn select(&self, query: &SelectQuery) -> Result<Vec<Record>, Error> {
        let statement = query.to_statement();
        debug!("Executing {query}");

        let rows = Self::bind(&statement)
            .fetch_all(&self.executor)
            .await
            .map_err(Self::interpret_error)?;

        rows.iter()
            .map(row_to_record)
            .collect::<std::result::Result<_, _>>()
            .map_err(Error::SqlxError)
    }

    async fn insert(&self, query: &InsertQuery) -> Result<Record, Error> {
        let statement = query.to_statement();
        debug!("Executing {}", statement.sql);

        let mut tx = self.executor.begin().await.map_err(Self::interpret_error)?;

        let row = Self::bind(&statement)
            .fetch_one(&mut *tx)
            .await
            .map_err(Self::interpret_error)?;

        tx.commit().await.map_err(Self::interpret_error)?;

        row_to_record(&row).map_err(Error::SqlxError)
    }
}

#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    use rand::Rng;
    use sqlx::Executor;

    use super::PostgresRepository;
    use crate::config::schema::Database;

    pub fn get_random_schema() -> String {
        let mut rng = rand::thread_rng();
        (&mut rng)
            .sample_iter(rand::distributions::Alphanumeric)
            .filter(|c| c.is_ascii_lowercase())
            .take(20)
            .map(char::from)
            .collect::<String>()
    }

    /// The company fixture: departments, employees referencing a department and a
    /// manager, and project assignments with a composite key
    pub fn fixture_ddl(schema: &str) -> String {
        format!(
            r#"
CREATE SCHEMA {schema};
CREATE TABLE {schema}.department (
    id SERIAL PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE {schema}.employee (
    id SERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    department_id INTEGER REFERENCES {schema}.department (id),
    manager_id INTEGER REFERENCES {schema}.employee (id)
);
CREATE TABLE {schema}.assignment (
    employee_id INTEGER NOT NULL REFERENCES {schema}.employee (id),
    project TEXT NOT NULL,
    PRIMARY KEY (employee_id, project)
);
INSERT INTO {schema}.department (name) VALUES ('Engineering'), ('Sales');
INSERT INTO {schema}.employee (name, department_id, manager_id)
    VALUES ('Ada', 1, NULL), ('Grace', 1, 1), ('Linus', 2, 1);
INSERT INTO {schema}.assignment (employee_id, project)
    VALUES (1, 'compiler'), (2, 'compiler'), (3, 'kernel');
"#
        )
    }

    /// Connect and create the fixture in a fresh schema, returning that schema's name
    pub async fn make_repository(dsn: &str) -> (PostgresRepository, String) {
        let schema = get_random_schema();
        let config = Database {
            dsn: dsn.to_string(),
            ..Default::default()
        };

        let repository = PostgresRepository::connect(&config)
            .await
            .expect("Error connecting to the database");
        repository
            .executor
            .execute(fixture_ddl(&schema).as_str())
            .await
            .expect("Error setting up the fixture");

        (repository, schema)
    }
}
