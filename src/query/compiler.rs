use std::collections::HashMap;

use crate::catalog::{CatalogError, CatalogResult};
use crate::data_types::ColumnInfo;
use crate::query::condition::{Condition, ConditionGroup, ConditionValue, Filter, Operator};
use crate::query::predicate::{ColumnRef, Operand, Predicate};

/// Compiles filter trees against the live column list of one table.
///
/// Conditions on columns the table doesn't have are dropped, not rejected. Groups
/// left without any surviving member disappear as well, so the result never has a
/// dangling connective.
pub struct PredicateCompiler<'a> {
    columns: HashMap<&'a str, &'a ColumnInfo>,
}

impl<'a> PredicateCompiler<'a> {
    pub fn new(columns: &'a [ColumnInfo]) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|c| (c.column_name.as_str(), c))
                .collect(),
        }
    }

    pub fn column(&self, name: &str) -> Option<ColumnRef> {
        self.columns.get(name).map(|c| ColumnRef::from(*c))
    }

    /// Like `column`, but a missing column is a validation error
    pub fn require_column(&self, name: &str) -> CatalogResult<ColumnRef> {
        self.column(name).ok_or_else(|| CatalogError::Validation {
            reason: format!("Column {name:?} does not exist"),
        })
    }

    /// Validation pass: flag every condition, at any depth, that names an unknown column
    pub fn mark_unknown_columns(&self, filters: &mut [Filter]) {
        for filter in filters {
            match filter {
                Filter::Condition(condition) => {
                    if !self.columns.contains_key(condition.column_name.as_str()) {
                        condition.will_be_processed = false;
                    }
                }
                Filter::Group(group) => {
                    self.mark_unknown_columns(&mut group.and);
                    self.mark_unknown_columns(&mut group.or);
                }
            }
        }
    }

    /// Run both passes. The returned top-level predicates are meant to be joined with AND.
    pub fn compile(&self, filters: &mut [Filter]) -> CatalogResult<Vec<Predicate>> {
        self.mark_unknown_columns(filters);

        let mut predicates = vec![];
        for filter in filters.iter() {
            if let Some(predicate) = self.compile_filter(filter)? {
                predicates.push(predicate);
            }
        }
        Ok(predicates)
    }

    pub fn compile_filter(&self, filter: &Filter) -> CatalogResult<Option<Predicate>> {
        match filter {
            Filter::Condition(condition) => self.compile_condition(condition),
            Filter::Group(group) => self.compile_group(group),
        }
    }

    pub fn compile_group(&self, group: &ConditionGroup) -> CatalogResult<Option<Predicate>> {
        let all = self.compile_members(&group.and)?;
        let any = self.compile_members(&group.or)?;

        if all.is_empty() && any.is_empty() {
            return Ok(None);
        }
        Ok(Some(Predicate::Group { all, any }))
    }

    fn compile_members(&self, members: &[Filter]) -> CatalogResult<Vec<Predicate>> {
        let mut predicates = Vec::with_capacity(members.len());
        for member in members {
            if let Some(predicate) = self.compile_filter(member)? {
                predicates.push(predicate);
            }
        }
        Ok(predicates)
    }

    pub fn compile_condition(&self, condition: &Condition) -> CatalogResult<Option<Predicate>> {
        if !condition.will_be_processed {
            return Ok(None);
        }
        // Never let an unvalidated identifier through, even if the flag is stale
        let column = match self.column(&condition.column_name) {
            Some(column) => column,
            None => return Ok(None),
        };

        let operator =
            Operator::parse(&condition.operator).ok_or_else(|| CatalogError::Validation {
                reason: format!("Unsupported operator {:?}", condition.operator),
            })?;

        let operand = match (&condition.value, operator.is_membership()) {
            (ConditionValue::List(values), true) if values.is_empty() => {
                return Err(CatalogError::Validation {
                    reason: format!(
                        "Operator {operator} on {:?} needs at least one value",
                        condition.column_name
                    ),
                })
            }
            (ConditionValue::List(values), true) => Operand::List(values.clone()),
            (ConditionValue::Scalar(value), true) => Operand::List(vec![value.clone()]),
            (ConditionValue::Scalar(value), false) => Operand::Scalar(value.clone()),
            (ConditionValue::List(_), false) => {
                return Err(CatalogError::Validation {
                    reason: format!(
                        "Operator {operator} on {:?} expects a single value",
                        condition.column_name
                    ),
                })
            }
        };

        Ok(Some(Predicate::Condition {
            column,
            operator,
            operand,
        }))
    }
}
