use std::collections::{HashMap, HashSet};

use futures::future::try_join_all;
use tracing::debug;

use crate::data_types::ForeignKeyInfo;
use crate::query::condition::ScalarValue;
use crate::record::{LookupKey, Record, Value};

use super::{CatalogResult, RecordAccessor};

/// Resolves foreign keys of a result set into nested records.
///
/// For every foreign key, the referenced row is stored under the key of the
/// referenced table's name (an empty record when there is none). Expansion is one
/// level deep, so self-referencing keys need no cycle detection.
#[derive(Debug, Clone)]
pub struct ForeignKeyExpander {
    records: RecordAccessor,
}

impl ForeignKeyExpander {
    pub fn new(records: RecordAccessor) -> Self {
        Self { records }
    }

    /// Distinct non-empty values of `column`, in first-seen order
    fn collect_keys(rows: &[Record], column: &str) -> Vec<LookupKey> {
        let mut seen = HashSet::new();
        rows.iter()
            .filter_map(|row| row.get(column).and_then(Value::lookup_key))
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }

    async fn fetch_targets(
        &self,
        foreign_key: &ForeignKeyInfo,
        keys: Vec<LookupKey>,
    ) -> CatalogResult<HashMap<LookupKey, Record>> {
        if keys.is_empty() {
            debug!(
                "No values in {}.{}, skipping lookup",
                foreign_key.table_name, foreign_key.column_name
            );
            return Ok(HashMap::new());
        }

        let ids: Vec<ScalarValue> = keys.into_iter().map(ScalarValue::from).collect();
        let targets = self
            .records
            .get_records_by_ids(
                &foreign_key.target(),
                &ids,
                Some(&foreign_key.foreign_column_name),
            )
            .await?;

        Ok(targets
            .into_iter()
            .filter_map(|target| {
                let key = target
                    .get(&foreign_key.foreign_column_name)
                    .and_then(Value::lookup_key)?;
                Some((key, target))
            })
            .collect())
    }

    pub async fn expand(
        &self,
        mut rows: Vec<Record>,
        foreign_keys: &[ForeignKeyInfo],
    ) -> CatalogResult<Vec<Record>> {
        let lookups = try_join_all(foreign_keys.iter().map(|foreign_key| {
            let keys = Self::collect_keys(&rows, &foreign_key.column_name);
            self.fetch_targets(foreign_key, keys)
        }))
        .await?;

        for (foreign_key, lookup) in foreign_keys.iter().zip(lookups) {
            for row in rows.iter_mut() {
                let target = row
                    .get(&foreign_key.column_name)
                    .and_then(Value::lookup_key)
                    .and_then(|key| lookup.get(&key))
                    .cloned()
                    .unwrap_or_default();
                row.insert(&foreign_key.foreign_table_name, Value::Record(target));
            }
        }

        Ok(rows)
    }
}
