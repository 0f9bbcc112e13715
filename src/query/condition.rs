//! The filter tree clients send: conditions nested in AND/OR groups.

use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use crate::query::sql::quote_literal;
use crate::record::LookupKey;

/// A scalar filter or key value
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Uuid(Uuid),
    Text(String),
}

impl ScalarValue {
    pub fn is_number_or_bool(&self) -> bool {
        matches!(
            self,
            ScalarValue::Bool(_) | ScalarValue::Integer(_) | ScalarValue::Float(_)
        )
    }

    /// Text form sent as a bound parameter
    pub fn to_text(&self) -> String {
        match self {
            ScalarValue::Bool(b) => b.to_string(),
            ScalarValue::Integer(i) => i.to_string(),
            ScalarValue::Float(f) => f.to_string(),
            ScalarValue::Uuid(u) => u.to_string(),
            ScalarValue::Text(s) => s.clone(),
        }
    }

    /// SQL literal: numbers and booleans bare, everything else quoted
    pub fn to_literal(&self) -> String {
        if self.is_number_or_bool() {
            self.to_text()
        } else {
            quote_literal(&self.to_text())
        }
    }
}

impl From<LookupKey> for ScalarValue {
    fn from(key: LookupKey) -> Self {
        match key {
            LookupKey::Bool(b) => ScalarValue::Bool(b),
            LookupKey::Integer(i) => ScalarValue::Integer(i),
            LookupKey::Text(s) => ScalarValue::Text(s),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ConditionValue {
    List(Vec<ScalarValue>),
    Scalar(ScalarValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum Operator {
    #[strum(serialize = "=")]
    Eq,
    #[strum(to_string = "!=", serialize = "<>")]
    NotEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    LtEq,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    GtEq,
    #[strum(serialize = "LIKE")]
    Like,
    #[strum(serialize = "NOT LIKE")]
    NotLike,
    #[strum(serialize = "ILIKE")]
    ILike,
    #[strum(serialize = "NOT ILIKE")]
    NotILike,
    #[strum(serialize = "IN")]
    In,
    #[strum(serialize = "NOT IN")]
    NotIn,
}

impl Operator {
    /// Parse an operator as written by a client, ignoring case and extra whitespace
    pub fn parse(operator: &str) -> Option<Self> {
        Self::from_str(&operator.split_whitespace().join(" ")).ok()
    }

    pub fn is_membership(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    /// Pattern operators compare text, their operand is never cast to the column type
    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            Operator::Like | Operator::NotLike | Operator::ILike | Operator::NotILike
        )
    }
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Condition {
    pub column_name: String,
    pub operator: String,
    pub value: ConditionValue,
    /// Cleared when `column_name` is not a column of the target table
    #[serde(default = "default_true")]
    pub will_be_processed: bool,
}

impl Condition {
    pub fn new(
        column_name: impl Into<String>,
        operator: impl Into<String>,
        value: ConditionValue,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            operator: operator.into(),
            value,
            will_be_processed: true,
        }
    }
}

/// `(AND of and_) AND (OR of or_)`; an empty side is left out
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ConditionGroup {
    #[serde(default, rename = "and_", alias = "and")]
    pub and: Vec<Filter>,
    #[serde(default, rename = "or_", alias = "or")]
    pub or: Vec<Filter>,
}

impl ConditionGroup {
    pub fn new(and: Vec<Filter>, or: Vec<Filter>) -> Self {
        Self { and, or }
    }

    pub fn all(and: Vec<Filter>) -> Self {
        Self::new(and, vec![])
    }

    pub fn any(or: Vec<Filter>) -> Self {
        Self::new(vec![], or)
    }
}

/// A node of the filter tree
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Filter {
    Condition(Condition),
    Group(ConditionGroup),
}

impl From<Condition> for Filter {
    fn from(condition: Condition) -> Self {
        Filter::Condition(condition)
    }
}

impl From<ConditionGroup> for Filter {
    fn from(group: ConditionGroup) -> Self {
        Filter::Group(group)
    }
}
