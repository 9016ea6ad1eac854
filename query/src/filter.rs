//! The filter tree (spec §4.7): typed columns compose into predicates,
//! predicates compose into a boolean tree via AND/OR/NOT. A [`Filter`]
//! never carries raw user-supplied SQL — only [`Column`]s declared as
//! `pub const`s by the read model that owns them, so the tree can be
//! assembled straight into parameterized SQL with no injection surface.
//!
//! Grounded on `iam-postgres::event_store`'s `select_events`/`QueryBuilder`
//! assembly style, generalized from one fixed filter shape (an event
//! query's `instance_id`/`aggregate_type`/...) to an arbitrary predicate
//! tree over any table's columns.

use chrono::{DateTime, Utc};
use std::marker::PhantomData;

/// A scalar value a predicate compares a column against.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Text(String),
    Int(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

/// One comparison against a single column.
#[derive(Clone, Debug)]
pub enum Op {
    Eq(Value),
    Contains(String),
    StartsWith(String),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Between(Value, Value),
    In(Vec<Value>),
    IsNull,
    IsNotNull,
}

/// A boolean tree of predicates. Built through [`Column`] methods and
/// composed with [`Filter::and`]/[`Filter::or`]/[`Filter::not`].
#[derive(Clone, Debug)]
pub enum Filter {
    Predicate { column: &'static str, op: Op },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    #[must_use]
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::And(filters.into_iter().collect())
    }

    #[must_use]
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Or(filters.into_iter().collect())
    }

    #[must_use]
    pub fn not(filter: Filter) -> Self {
        Self::Not(Box::new(filter))
    }
}

/// A `table.column` reference typed by the Rust type its values compare
/// against. Read models declare these as `pub const`s; callers never write
/// a bare string column name into a [`Filter`] themselves.
pub struct Column<T> {
    qualified: &'static str,
    marker: PhantomData<fn() -> T>,
}

impl<T> Column<T> {
    /// `qualified` must be a trusted, statically-known `table.column` —
    /// never build one from request input.
    #[must_use]
    pub const fn new(qualified: &'static str) -> Self {
        Self {
            qualified,
            marker: PhantomData,
        }
    }

    #[must_use]
    pub const fn qualified(&self) -> &'static str {
        self.qualified
    }

    fn predicate(&self, op: Op) -> Filter {
        Filter::Predicate {
            column: self.qualified,
            op,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> Filter {
        self.predicate(Op::IsNull)
    }

    #[must_use]
    pub fn is_not_null(&self) -> Filter {
        self.predicate(Op::IsNotNull)
    }
}

impl Column<String> {
    #[must_use]
    pub fn eq(&self, value: impl Into<String>) -> Filter {
        self.predicate(Op::Eq(Value::Text(value.into())))
    }

    #[must_use]
    pub fn contains(&self, value: impl Into<String>) -> Filter {
        self.predicate(Op::Contains(value.into()))
    }

    #[must_use]
    pub fn starts_with(&self, value: impl Into<String>) -> Filter {
        self.predicate(Op::StartsWith(value.into()))
    }

    #[must_use]
    pub fn in_list(&self, values: impl IntoIterator<Item = impl Into<String>>) -> Filter {
        self.predicate(Op::In(values.into_iter().map(|v| Value::Text(v.into())).collect()))
    }
}

impl Column<i64> {
    #[must_use]
    pub fn eq(&self, value: i64) -> Filter {
        self.predicate(Op::Eq(Value::Int(value)))
    }

    #[must_use]
    pub fn gt(&self, value: i64) -> Filter {
        self.predicate(Op::Gt(Value::Int(value)))
    }

    #[must_use]
    pub fn gte(&self, value: i64) -> Filter {
        self.predicate(Op::Gte(Value::Int(value)))
    }

    #[must_use]
    pub fn lt(&self, value: i64) -> Filter {
        self.predicate(Op::Lt(Value::Int(value)))
    }

    #[must_use]
    pub fn lte(&self, value: i64) -> Filter {
        self.predicate(Op::Lte(Value::Int(value)))
    }

    #[must_use]
    pub fn in_list(&self, values: impl IntoIterator<Item = i64>) -> Filter {
        self.predicate(Op::In(values.into_iter().map(Value::Int).collect()))
    }
}

impl Column<bool> {
    #[must_use]
    pub fn eq(&self, value: bool) -> Filter {
        self.predicate(Op::Eq(Value::Bool(value)))
    }
}

impl Column<DateTime<Utc>> {
    #[must_use]
    pub fn gte(&self, value: DateTime<Utc>) -> Filter {
        self.predicate(Op::Gte(Value::Timestamp(value)))
    }

    #[must_use]
    pub fn lte(&self, value: DateTime<Utc>) -> Filter {
        self.predicate(Op::Lte(Value::Timestamp(value)))
    }

    #[must_use]
    pub fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Filter {
        self.predicate(Op::Between(Value::Timestamp(from), Value::Timestamp(to)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: Column<String> = Column::new("organizations.name");
    const CREATED_AT: Column<DateTime<Utc>> = Column::new("organizations.created_at");

    #[test]
    fn composes_a_boolean_tree() {
        let filter = Filter::and([
            NAME.starts_with("Acme"),
            Filter::not(CREATED_AT.is_null()),
        ]);
        let Filter::And(parts) = filter else {
            unreachable!("Filter::and always builds Filter::And")
        };
        assert_eq!(parts.len(), 2);
    }
}
