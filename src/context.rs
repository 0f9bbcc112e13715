use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::catalog::{
    CatalogError, CatalogResult, CreatedRecord, ForeignKeyExpander, MetadataInspector,
    RecordAccessor, RecordKey,
};
use crate::data_types::{ColumnInfo, ForeignKeyInfo, Pagination, PrimaryKeyInfo, TableRef};
use crate::query::condition::{Filter, ScalarValue};
use crate::record::Record;
use crate::repository::interface::Repository;

/// Everything `get_table_attributes` reports about one table
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TableAttributes {
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<PrimaryKeyInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Record>>,
}

/// The operations exposed by the frontends, on top of one repository
#[derive(Debug, Clone)]
pub struct TablegateContext {
    pub repository: Arc<dyn Repository>,
    pub default_schema: String,
    pub default_page_size: u32,
    pub metadata: MetadataInspector,
    pub records: RecordAccessor,
    pub expander: ForeignKeyExpander,
}

impl TablegateContext {
    pub fn new(
        repository: Arc<dyn Repository>,
        default_schema: impl Into<String>,
        default_page_size: u32,
    ) -> Self {
        let records = RecordAccessor::new(repository.clone());

        Self {
            metadata: MetadataInspector::new(repository.clone()),
            expander: ForeignKeyExpander::new(records.clone()),
            records,
            repository,
            default_schema: default_schema.into(),
            default_page_size,
        }
    }

    pub fn resolve_table(&self, identifier: &str, schema: Option<&str>) -> CatalogResult<TableRef> {
        TableRef::resolve(identifier, schema, &self.default_schema)
    }

    pub async fn get_primary_key(&self, table: &TableRef) -> CatalogResult<Vec<PrimaryKeyInfo>> {
        self.metadata.get_primary_key(table).await
    }

    pub async fn get_columns(
        &self,
        table: &TableRef,
        complete_attribute: bool,
    ) -> CatalogResult<Vec<ColumnInfo>> {
        self.metadata.get_columns(table, complete_attribute).await
    }

    pub async fn get_foreign_keys(&self, table: &TableRef) -> CatalogResult<Vec<ForeignKeyInfo>> {
        self.metadata.get_foreign_keys(table).await
    }

    /// Structure of a table, plus one unexpanded page of its rows if `with_data`
    pub async fn get_table_attributes(
        &self,
        table: &TableRef,
        complete_attribute: bool,
        with_data: bool,
        pagination: Pagination,
        keyword: Option<&str>,
    ) -> CatalogResult<TableAttributes> {
        let columns = self.metadata.get_columns(table, complete_attribute).await?;
        let primary_key = self.metadata.get_primary_key(table).await?;
        let foreign_keys = self.metadata.get_foreign_keys(table).await?;

        let data = if with_data {
            if let Some(keyword) = keyword {
                debug!("Ignoring keyword {keyword:?} for {table}");
            }
            Some(
                self.records
                    .list_records(table, vec![], pagination)
                    .await?,
            )
        } else {
            None
        };

        Ok(TableAttributes {
            table_name: table.to_string(),
            columns,
            primary_key,
            foreign_keys,
            data,
        })
    }

    /// Filtered page of rows with every foreign key expanded
    pub async fn get_table_data(
        &self,
        table: &TableRef,
        filters: Vec<Filter>,
        pagination: Pagination,
        keyword: Option<&str>,
    ) -> CatalogResult<Vec<Record>> {
        if let Some(keyword) = keyword {
            debug!("Ignoring keyword {keyword:?} for {table}");
        }

        let rows = self.records.list_records(table, filters, pagination).await?;
        let foreign_keys = self.metadata.get_foreign_keys(table).await?;

        self.expander.expand(rows, &foreign_keys).await
    }

    /// One record by primary key. Tables with a multi-column key take `ids`, in key
    /// order; others take `id`, matched against `custom_column` if given.
    pub async fn get_table_data_by_id(
        &self,
        table: &TableRef,
        id: Option<ScalarValue>,
        ids: Vec<ScalarValue>,
        custom_column: Option<&str>,
    ) -> CatalogResult<Record> {
        let primary_key = self.metadata.get_primary_key_names(table).await?;
        let key = RecordKey::from_request(id, ids, primary_key.len() > 1)?;

        self.records
            .get_record_by_id(table, &key, &primary_key, custom_column)
            .await
    }

    /// Insert a record after checking the table has a primary key and `data` covers
    /// every NOT NULL column outside of it
    pub async fn create_table_record(
        &self,
        table: &TableRef,
        data: Map<String, JsonValue>,
        return_id: bool,
        primary_key_column: Option<&str>,
    ) -> CatalogResult<CreatedRecord> {
        let primary_key = self.metadata.get_primary_key_names(table).await?;
        if primary_key.is_empty() {
            return Err(CatalogError::validation("Primary key is required"));
        }

        let columns = self.metadata.get_columns(table, false).await?;
        if let Some(missing) = columns.iter().find(|c| {
            !c.is_nullable
                && !data.contains_key(&c.column_name)
                && !primary_key.contains(&c.column_name)
        }) {
            return Err(CatalogError::validation(format!(
                "{} is mandatory",
                missing.column_name
            )));
        }

        self.records
            .create_record(table, data, return_id, primary_key_column)
            .await
    }
}

#[cfg(any(test, feature = "testutils"))]
pub mod test_utils {
    use super::*;
    use crate::data_types::DEFAULT_SCHEMA;
    use crate::repository::memory::testutils::make_repository;

    /// A context over the in-memory company fixture in the default schema
    pub fn in_memory_context() -> TablegateContext {
        TablegateContext::new(
            Arc::new(make_repository(DEFAULT_SCHEMA)),
            DEFAULT_SCHEMA,
            10,
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::test_utils::in_memory_context;
    use super::*;
    use crate::query::condition::{Condition, ConditionValue};
    use crate::record::Value;
    use crate::repository::memory::{MemoryRepository, MemoryTable};

    fn object(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[tokio::test]
    async fn test_resolve_table() {
        let context = in_memory_context();

        assert_eq!(
            context.resolve_table("sales.orders", None).unwrap(),
            TableRef::new("sales", "orders")
        );
        assert_eq!(
            context.resolve_table("employee", None).unwrap(),
            TableRef::new("public", "employee")
        );
    }

    #[tokio::test]
    async fn test_get_table_attributes() {
        let context = in_memory_context();
        let table = context.resolve_table("department", None).unwrap();

        let attributes = context
            .get_table_attributes(&table, false, false, Pagination::new(1, 10), None)
            .await
            .unwrap();
        assert_eq!(attributes.table_name, "public.department");
        assert_eq!(attributes.columns.len(), 2);
        assert_eq!(attributes.primary_key[0].column_name, "id");
        assert!(attributes.foreign_keys.is_empty());
        assert!(!serde_json::to_value(&attributes)
            .unwrap()
            .as_object()
            .unwrap()
            .contains_key("data"));

        let attributes = context
            .get_table_attributes(&table, false, true, Pagination::new(2, 1), Some("sal"))
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(attributes.data).unwrap(),
            json!([{"id": 2, "name": "Sales"}])
        );
    }

    #[tokio::test]
    async fn test_get_table_data_expands_foreign_keys() {
        let context = in_memory_context();
        let table = context.resolve_table("public.employee", None).unwrap();
        let filters = vec![Condition::new(
            "name",
            "=",
            ConditionValue::Scalar(ScalarValue::Text("Linus".to_string())),
        )
        .into()];

        let rows = context
            .get_table_data(&table, filters, Pagination::new(1, 10), None)
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_value(&rows).unwrap(),
            json!([{
                "id": 3,
                "name": "Linus",
                "department_id": 2,
                "manager_id": 1,
                "department": {"id": 2, "name": "Sales"},
                "employee": {"id": 1, "name": "Ada", "department_id": 1, "manager_id": null},
            }])
        );
    }

    #[tokio::test]
    async fn test_get_table_data_by_id() {
        let context = in_memory_context();

        let record = context
            .get_table_data_by_id(
                &TableRef::new("public", "employee"),
                Some(ScalarValue::Integer(1)),
                vec![],
                None,
            )
            .await
            .unwrap();
        assert_eq!(record.get("name"), Some(&Value::Text("Ada".to_string())));

        // Composite key: ids required, id ignored
        let assignment = TableRef::new("public", "assignment");
        let err = context
            .get_table_data_by_id(&assignment, Some(ScalarValue::Integer(1)), vec![], None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "IDs value is required");

        let record = context
            .get_table_data_by_id(
                &assignment,
                None,
                vec![
                    ScalarValue::Integer(2),
                    ScalarValue::Text("compiler".to_string()),
                ],
                None,
            )
            .await
            .unwrap();
        assert_eq!(record.get("employee_id"), Some(&Value::Integer(2)));

        let err = context
            .get_table_data_by_id(&TableRef::new("public", "employee"), None, vec![], None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "ID value is required");
    }

    #[tokio::test]
    async fn test_create_table_record() {
        let context = in_memory_context();
        let table = TableRef::new("public", "employee");

        let created = context
            .create_table_record(
                &table,
                object(json!({"name": "Barbara", "department_id": 2, "shoe_size": 41})),
                true,
                None,
            )
            .await
            .unwrap();
        assert_eq!(created, CreatedRecord::Id(Value::Integer(4)));

        let err = context
            .create_table_record(&table, object(json!({"department_id": 2})), true, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "name is mandatory");
    }

    #[tokio::test]
    async fn test_create_table_record_requires_primary_key() {
        let repository = Arc::new(MemoryRepository::new());
        repository.create_table(
            TableRef::new("public", "audit_log"),
            MemoryTable::new().column("message", "text", false),
        );
        let context = TablegateContext::new(repository.clone(), "public", 10);

        let err = context
            .create_table_record(
                &TableRef::new("public", "audit_log"),
                object(json!({"message": "hello"})),
                false,
                None,
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Primary key is required");
        assert!(repository.executed_statements().is_empty());
    }

    #[tokio::test]
    async fn test_missing_mandatory_column_skips_insert() {
        let repository = Arc::new(crate::repository::memory::testutils::make_repository(
            "public",
        ));
        let context = TablegateContext::new(repository.clone(), "public", 10);

        let err = context
            .create_table_record(
                &TableRef::new("public", "assignment"),
                object(json!({"employee_id": 1})),
                true,
                None,
            )
            .await;

        // Primary key columns are exempt, so this passes validation and hits the
        // repository's own not-null check instead
        assert!(matches!(err, Err(CatalogError::Repository(_))));

        let err = context
            .create_table_record(
                &TableRef::new("public", "department"),
                object(json!({})),
                true,
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "name is mandatory");
        assert_eq!(repository.executed_statements().len(), 1);
    }
}
