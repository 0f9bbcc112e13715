use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::data_types::{Pagination, TableRef};
use crate::query::compiler::PredicateCompiler;
use crate::query::condition::{Filter, ScalarValue};
use crate::query::predicate::Predicate;
use crate::query::sql::{InsertQuery, InsertValue, SelectQuery};
use crate::record::{Record, Value};
use crate::repository::interface::Repository;

use super::{CatalogError, CatalogResult, MetadataInspector};

/// Primary key value(s) identifying a single record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordKey {
    Single(ScalarValue),
    /// Paired positionally with the primary key columns
    Composite(Vec<ScalarValue>),
}

impl RecordKey {
    pub fn from_request(
        id: Option<ScalarValue>,
        ids: Vec<ScalarValue>,
        composite: bool,
    ) -> CatalogResult<Self> {
        if composite {
            if ids.is_empty() {
                return Err(CatalogError::validation("IDs value is required"));
            }
            Ok(RecordKey::Composite(ids))
        } else {
            id.map(RecordKey::Single)
                .ok_or_else(|| CatalogError::validation("ID value is required"))
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Single(value) => write!(f, "key {}", value.to_literal()),
            RecordKey::Composite(values) => write!(
                f,
                "key ({})",
                values
                    .iter()
                    .map(ScalarValue::to_literal)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

/// What `create_record` hands back
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum CreatedRecord {
    Id(Value),
    Record(Record),
}

/// Generic row access. Every column named by a caller is checked against the live
/// column list before it reaches SQL.
#[derive(Debug, Clone)]
pub struct RecordAccessor {
    repository: Arc<dyn Repository>,
    metadata: MetadataInspector,
}

impl RecordAccessor {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self {
            metadata: MetadataInspector::new(repository.clone()),
            repository,
        }
    }

    async fn select(&self, query: SelectQuery) -> CatalogResult<Vec<Record>> {
        debug!("Selecting: {query}");
        self.repository
            .select(&query)
            .await
            .map_err(CatalogError::in_table(&query.table))
    }

    pub async fn list_records(
        &self,
        table: &TableRef,
        mut filters: Vec<Filter>,
        pagination: Pagination,
    ) -> CatalogResult<Vec<Record>> {
        // Without filters there's nothing to validate
        let predicates = if filters.is_empty() {
            vec![]
        } else {
            let columns = self.metadata.get_columns(table, false).await?;
            PredicateCompiler::new(&columns).compile(&mut filters)?
        };

        self.select(
            SelectQuery::new(table.clone())
                .with_filters(predicates)
                .with_pagination(pagination),
        )
        .await
    }

    pub async fn get_record_by_id(
        &self,
        table: &TableRef,
        key: &RecordKey,
        primary_key_names: &[String],
        custom_column: Option<&str>,
    ) -> CatalogResult<Record> {
        let columns = self.metadata.get_columns(table, false).await?;
        let compiler = PredicateCompiler::new(&columns);

        let predicates = match key {
            RecordKey::Single(value) => {
                let column = custom_column
                    .or_else(|| primary_key_names.first().map(String::as_str))
                    .ok_or_else(|| CatalogError::validation("Primary key is required"))?;
                vec![Predicate::equals(
                    compiler.require_column(column)?,
                    value.clone(),
                )]
            }
            RecordKey::Composite(values) => {
                if values.len() != primary_key_names.len() {
                    return Err(CatalogError::validation(format!(
                        "Expected {} key values ({}), got {}",
                        primary_key_names.len(),
                        primary_key_names.join(", "),
                        values.len()
                    )));
                }
                primary_key_names
                    .iter()
                    .zip(values)
                    .map(|(name, value)| {
                        Ok(Predicate::equals(
                            compiler.require_column(name)?,
                            value.clone(),
                        ))
                    })
                    .collect::<CatalogResult<_>>()?
            }
        };

        self.select(
            SelectQuery::new(table.clone())
                .with_filters(predicates)
                .with_pagination(Pagination::new(1, 1)),
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| CatalogError::RecordNotFound {
            table: table.to_string(),
            key: key.to_string(),
        })
    }

    /// Records whose primary key (or `custom_column`) is one of `ids`
    pub async fn get_records_by_ids(
        &self,
        table: &TableRef,
        ids: &[ScalarValue],
        custom_column: Option<&str>,
    ) -> CatalogResult<Vec<Record>> {
        if ids.is_empty() {
            return Err(CatalogError::validation("IDs value is required"));
        }

        let column = match custom_column {
            Some(column) => column.to_string(),
            None => self
                .metadata
                .get_primary_key_names(table)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| CatalogError::validation("Primary key is required"))?,
        };

        let columns = self.metadata.get_columns(table, false).await?;
        let column = PredicateCompiler::new(&columns).require_column(&column)?;

        self.select(
            SelectQuery::new(table.clone()).with_filters(vec![Predicate::one_of(column, ids.to_vec())]),
        )
        .await
    }

    /// Insert one row built from the known columns of `data`. Unknown keys are dropped.
    pub async fn create_record(
        &self,
        table: &TableRef,
        data: Map<String, JsonValue>,
        return_id: bool,
        primary_key_column: Option<&str>,
    ) -> CatalogResult<CreatedRecord> {
        let columns = self.metadata.get_columns(table, false).await?;
        let compiler = PredicateCompiler::new(&columns);

        let return_column = if return_id {
            Some(match primary_key_column {
                Some(column) => compiler.require_column(column)?.name,
                None => self
                    .metadata
                    .get_primary_key_names(table)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| CatalogError::validation("Primary key is required"))?,
            })
        } else {
            None
        };

        let mut values = Vec::with_capacity(data.len());
        for (key, value) in data {
            match compiler.column(&key) {
                Some(column) => values.push(InsertValue {
                    column: column.name,
                    cast: column.cast,
                    value,
                }),
                None => debug!("Dropping unknown column {key:?} for {table}"),
            }
        }

        let inserted = self
            .repository
            .insert(&InsertQuery {
                table: table.clone(),
                values,
            })
            .await
            .map_err(CatalogError::in_table(table))?;

        Ok(match return_column {
            Some(column) => CreatedRecord::Id(inserted.get(&column).cloned().unwrap_or(Value::Null)),
            None => CreatedRecord::Record(inserted),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::data_types::DEFAULT_SCHEMA;
    use crate::query::condition::{Condition, ConditionGroup, ConditionValue};
    use crate::repository::memory::testutils::make_repository;
    use crate::repository::memory::{MemoryRepository, MemoryTable};

    fn setup() -> (Arc<MemoryRepository>, RecordAccessor) {
        let repository = Arc::new(make_repository(DEFAULT_SCHEMA));
        (repository.clone(), RecordAccessor::new(repository))
    }

    fn table(name: &str) -> TableRef {
        TableRef::new(DEFAULT_SCHEMA, name)
    }

    fn names(records: &[Record]) -> Vec<String> {
        records
            .iter()
            .map(|r| match r.get("name") {
                Some(Value::Text(name)) => name.clone(),
                other => panic!("unexpected name {other:?}"),
            })
            .collect()
    }

    fn text(s: &str) -> ScalarValue {
        ScalarValue::Text(s.to_string())
    }

    #[tokio::test]
    async fn test_list_records_pagination() {
        let (repository, accessor) = setup();

        for _ in 0..2 {
            accessor
                .list_records(&table("employee"), vec![], Pagination::new(2, 10))
                .await
                .unwrap();
        }

        assert_eq!(
            repository.executed_statements(),
            vec![
                "SELECT * FROM public.employee LIMIT 10 OFFSET 10",
                "SELECT * FROM public.employee LIMIT 10 OFFSET 10"
            ]
        );
    }

    #[tokio::test]
    async fn test_list_records_with_filters() {
        let (repository, accessor) = setup();
        let filters: Vec<Filter> = vec![
            ConditionGroup::any(vec![
                Condition::new("name", "like", ConditionValue::Scalar(text("G%"))).into(),
                Condition::new("name", "=", ConditionValue::Scalar(text("Linus"))).into(),
            ])
            .into(),
            Condition::new("nickname", "=", ConditionValue::Scalar(text("x"))).into(),
            ConditionGroup::default().into(),
        ];

        let records = accessor
            .list_records(&table("employee"), filters, Pagination::new(1, 10))
            .await
            .unwrap();

        assert_eq!(names(&records), vec!["Grace", "Linus"]);
        assert_eq!(
            repository.executed_statements(),
            vec!["SELECT * FROM public.employee WHERE (name LIKE 'G%' OR name = 'Linus') LIMIT 10 OFFSET 0"]
        );
    }

    #[tokio::test]
    async fn test_list_records_missing_table() {
        let (_, accessor) = setup();

        let err = accessor
            .list_records(&table("nope"), vec![], Pagination::disabled())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::TableDoesNotExist { .. }));
    }

    #[tokio::test]
    async fn test_get_record_by_id() {
        let (repository, accessor) = setup();
        let pk = vec!["id".to_string()];

        let record = accessor
            .get_record_by_id(
                &table("employee"),
                &RecordKey::Single(ScalarValue::Integer(2)),
                &pk,
                None,
            )
            .await
            .unwrap();
        assert_eq!(record.get("name"), Some(&Value::Text("Grace".to_string())));
        assert_eq!(
            repository.executed_statements(),
            vec!["SELECT * FROM public.employee WHERE id = 2 LIMIT 1 OFFSET 0"]
        );

        let record = accessor
            .get_record_by_id(
                &table("employee"),
                &RecordKey::Single(text("Linus")),
                &pk,
                Some("name"),
            )
            .await
            .unwrap();
        assert_eq!(record.get("id"), Some(&Value::Integer(3)));
    }

    #[tokio::test]
    async fn test_get_record_by_composite_id() {
        let (_, accessor) = setup();
        let pk = vec!["employee_id".to_string(), "project".to_string()];

        let record = accessor
            .get_record_by_id(
                &table("assignment"),
                &RecordKey::Composite(vec![ScalarValue::Integer(3), text("kernel")]),
                &pk,
                None,
            )
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"employee_id": 3, "project": "kernel"})
        );

        let err = accessor
            .get_record_by_id(
                &table("assignment"),
                &RecordKey::Composite(vec![ScalarValue::Integer(3)]),
                &pk,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_get_record_by_id_not_found() {
        let (_, accessor) = setup();

        let err = accessor
            .get_record_by_id(
                &table("employee"),
                &RecordKey::Single(ScalarValue::Integer(42)),
                &["id".to_string()],
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Record with key 42 not found in table \"public.employee\""
        );
    }

    #[test]
    fn test_record_key_from_request() {
        assert_eq!(
            RecordKey::from_request(None, vec![], false)
                .unwrap_err()
                .to_string(),
            "ID value is required"
        );
        assert_eq!(
            RecordKey::from_request(Some(ScalarValue::Integer(1)), vec![], true)
                .unwrap_err()
                .to_string(),
            "IDs value is required"
        );
        assert_eq!(
            RecordKey::from_request(Some(ScalarValue::Integer(1)), vec![], false).unwrap(),
            RecordKey::Single(ScalarValue::Integer(1))
        );
    }

    #[tokio::test]
    async fn test_get_records_by_ids() {
        let (_, accessor) = setup();

        let records = accessor
            .get_records_by_ids(
                &table("employee"),
                &[ScalarValue::Integer(1), ScalarValue::Integer(3)],
                None,
            )
            .await
            .unwrap();
        assert_eq!(names(&records), vec!["Ada", "Linus"]);

        let records = accessor
            .get_records_by_ids(&table("department"), &[text("Sales")], Some("name"))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_get_records_by_ids_validation() {
        let (repository, accessor) = setup();
        repository.create_table(
            table("audit_log"),
            MemoryTable::new().column("message", "text", true),
        );

        let err = accessor
            .get_records_by_ids(&table("employee"), &[], None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "IDs value is required");

        let err = accessor
            .get_records_by_ids(&table("audit_log"), &[text("x")], None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Primary key is required");

        let err = accessor
            .get_records_by_ids(
                &table("employee"),
                &[ScalarValue::Integer(1)],
                Some("id) OR (1=1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation { .. }));
        assert!(repository.executed_statements().is_empty());
    }

    #[tokio::test]
    async fn test_create_record_drops_unknown_keys() {
        let (repository, accessor) = setup();
        let data = json!({"name": "Research", "budget": 1000})
            .as_object()
            .cloned()
            .unwrap();

        let created = accessor
            .create_record(&table("department"), data, true, None)
            .await
            .unwrap();

        assert_eq!(created, CreatedRecord::Id(Value::Integer(3)));
        assert_eq!(
            repository.executed_statements(),
            vec![r#"INSERT INTO "public"."department" ("name") VALUES ($1::"pg_catalog"."text") RETURNING *"#]
        );
    }

    #[tokio::test]
    async fn test_create_record_returning_record() {
        let (_, accessor) = setup();
        let data = json!({"name": "Barbara", "manager_id": 1})
            .as_object()
            .cloned()
            .unwrap();

        let created = accessor
            .create_record(&table("employee"), data, false, None)
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_value(&created).unwrap(),
            json!({"id": 4, "name": "Barbara", "department_id": null, "manager_id": 1})
        );

        let data = json!({"name": "Edsger"}).as_object().cloned().unwrap();
        let created = accessor
            .create_record(&table("employee"), data, true, Some("name"))
            .await
            .unwrap();
        assert_eq!(serde_json::to_value(&created).unwrap(), json!("Edsger"));
    }
}
