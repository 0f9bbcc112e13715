//! Compiled predicates: the validated form of a filter tree.
//!
//! A `Predicate` only ever references known columns and allow-listed operators. It
//! renders either inline (`Display`, values as literals) or as executable SQL with
//! bound parameters (`write_sql`).

use std::fmt;

use crate::data_types::ColumnInfo;
use crate::query::condition::{Operator, ScalarValue};
use crate::query::sql::{display_identifier, quote_identifier};

/// A column that exists on the target table, with the type bound values are cast to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub name: String,
    pub cast: Option<String>,
}

impl ColumnRef {
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cast: None,
        }
    }
}

impl From<&ColumnInfo> for ColumnRef {
    fn from(column: &ColumnInfo) -> Self {
        Self {
            name: column.column_name.clone(),
            cast: column.cast_type(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(ScalarValue),
    /// Never empty
    List(Vec<ScalarValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Condition {
        column: ColumnRef,
        operator: Operator,
        operand: Operand,
    },
    /// At least one side is non-empty
    Group {
        all: Vec<Predicate>,
        any: Vec<Predicate>,
    },
}

impl Predicate {
    pub fn equals(column: ColumnRef, value: ScalarValue) -> Self {
        Predicate::Condition {
            column,
            operator: Operator::Eq,
            operand: Operand::Scalar(value),
        }
    }

    pub fn one_of(column: ColumnRef, values: Vec<ScalarValue>) -> Self {
        Predicate::Condition {
            column,
            operator: Operator::In,
            operand: Operand::List(values),
        }
    }

    pub fn write_sql(&self, out: &mut String, params: &mut ParamWriter<'_>) {
        self.write(out, params)
    }

    fn write(&self, out: &mut String, writer: &mut dyn ValueWriter) {
        match self {
            Predicate::Condition {
                column,
                operator,
                operand,
            } => {
                writer.identifier(out, &column.name);
                out.push(' ');
                out.push_str(&operator.to_string());
                out.push(' ');

                // LIKE patterns stay text
                let cast = if operator.is_pattern() {
                    None
                } else {
                    column.cast.as_deref()
                };

                match operand {
                    Operand::Scalar(value) => writer.value(out, value, cast),
                    Operand::List(values) => {
                        out.push('(');
                        for (i, value) in values.iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            writer.value(out, value, cast);
                        }
                        out.push(')');
                    }
                }
            }
            Predicate::Group { all, any } => {
                let both = !all.is_empty() && !any.is_empty();

                if !all.is_empty() {
                    write_joined(out, all, " AND ", writer);
                }
                if both {
                    out.push_str(" AND ");
                }
                if !any.is_empty() {
                    write_joined(out, any, " OR ", writer);
                }
            }
        }
    }
}

fn write_joined(
    out: &mut String,
    parts: &[Predicate],
    separator: &str,
    writer: &mut dyn ValueWriter,
) {
    out.push('(');
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        part.write(out, writer);
    }
    out.push(')');
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write(&mut out, &mut InlineWriter);
        f.write_str(&out)
    }
}

trait ValueWriter {
    fn identifier(&self, out: &mut String, name: &str);
    fn value(&mut self, out: &mut String, value: &ScalarValue, cast: Option<&str>);
}

struct InlineWriter;

impl ValueWriter for InlineWriter {
    fn identifier(&self, out: &mut String, name: &str) {
        out.push_str(&display_identifier(name));
    }

    fn value(&mut self, out: &mut String, value: &ScalarValue, _cast: Option<&str>) {
        out.push_str(&value.to_literal());
    }
}

/// Collects bound parameters, numbering placeholders after those already collected
pub struct ParamWriter<'a> {
    params: &'a mut Vec<Option<String>>,
}

impl<'a> ParamWriter<'a> {
    pub fn new(params: &'a mut Vec<Option<String>>) -> Self {
        Self { params }
    }
}

impl ValueWriter for ParamWriter<'_> {
    fn identifier(&self, out: &mut String, name: &str) {
        out.push_str(&quote_identifier(name));
    }

    fn value(&mut self, out: &mut String, value: &ScalarValue, cast: Option<&str>) {
        self.params.push(Some(value.to_text()));
        out.push_str(&format!("${}", self.params.len()));
        if let Some(cast) = cast {
            out.push_str("::");
            out.push_str(cast);
        }
    }
}
