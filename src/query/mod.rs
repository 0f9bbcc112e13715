pub mod compiler;
pub mod condition;
pub mod predicate;
pub mod sql;

pub use compiler::PredicateCompiler;
pub use condition::{Condition, ConditionGroup, ConditionValue, Filter, Operator, ScalarValue};
pub use predicate::{ColumnRef, Operand, Predicate};
pub use sql::{InsertQuery, InsertValue, SelectQuery, Statement};
