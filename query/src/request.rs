//! `SearchRequest` (spec §4.7): offset/limit/sort over a filtered table,
//! assembled into parameterized SQL through `sqlx::QueryBuilder`, the same
//! tool `iam-postgres::event_store::select_events` uses for the eventstore's
//! own dynamic `WHERE` clause.

use crate::filter::{Filter, Op, Value};
use sqlx::{Postgres, QueryBuilder};

/// Applied when a [`SearchRequest`] doesn't set a limit.
pub const DEFAULT_LIMIT: u32 = 50;

/// No [`SearchRequest`], however constructed, can ask for more rows than
/// this in one page — a single unbounded `list` call must never be able to
/// pull an entire table.
pub const MAX_LIMIT: u32 = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug)]
pub struct Sort {
    pub column: &'static str,
    pub direction: SortDirection,
}

/// A filtered, sorted, paginated read against one table. Construct with
/// [`SearchRequest::new`] and the builder methods; hand the result to
/// [`build_query`] to get a ready-to-`fetch` `QueryBuilder`.
#[derive(Clone, Debug, Default)]
pub struct SearchRequest {
    filter: Option<Filter>,
    sort: Option<Sort>,
    offset: u32,
    limit: Option<u32>,
}

impl SearchRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_sort(mut self, column: &'static str, direction: SortDirection) -> Self {
        self.sort = Some(Sort { column, direction });
        self
    }

    #[must_use]
    pub const fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Requests over [`MAX_LIMIT`] are silently clamped, not rejected — a
    /// caller asking for everything gets the largest page the system is
    /// willing to hand back in one round trip, not an error.
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
    }
}

/// Assemble `request` into a `SELECT <columns> FROM <table> WHERE ...
/// ORDER BY ... LIMIT ... OFFSET ...` query. `table` and `columns` are
/// trusted, statically-known SQL fragments supplied by the read model —
/// never build them from request input.
#[must_use]
pub fn build_query<'a>(
    table: &'static str,
    columns: &'static str,
    request: &'a SearchRequest,
) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {columns} FROM {table}"));

    if let Some(filter) = &request.filter {
        qb.push(" WHERE ");
        push_filter(&mut qb, filter);
    }

    if let Some(sort) = &request.sort {
        qb.push(" ORDER BY ");
        qb.push(sort.column);
        qb.push(match sort.direction {
            SortDirection::Asc => " ASC",
            SortDirection::Desc => " DESC",
        });
    }

    qb.push(" LIMIT ");
    qb.push_bind(i64::from(request.effective_limit()));
    qb.push(" OFFSET ");
    qb.push_bind(i64::from(request.offset));

    qb
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::Predicate { column, op } => push_predicate(qb, column, op),
        Filter::And(parts) => push_joined(qb, parts, " AND "),
        Filter::Or(parts) => push_joined(qb, parts, " OR "),
        Filter::Not(inner) => {
            qb.push("NOT (");
            push_filter(qb, inner);
            qb.push(")");
        }
    }
}

fn push_joined(qb: &mut QueryBuilder<'_, Postgres>, parts: &[Filter], joiner: &str) {
    if parts.is_empty() {
        qb.push("TRUE");
        return;
    }
    qb.push("(");
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            qb.push(joiner);
        }
        push_filter(qb, part);
    }
    qb.push(")");
}

fn push_predicate(qb: &mut QueryBuilder<'_, Postgres>, column: &str, op: &Op) {
    match op {
        Op::Eq(value) => {
            qb.push(column);
            qb.push(" = ");
            push_value(qb, value);
        }
        Op::Contains(text) => {
            qb.push(column);
            qb.push(" ILIKE ");
            qb.push_bind(format!("%{}%", escape_like(text)));
        }
        Op::StartsWith(text) => {
            qb.push(column);
            qb.push(" ILIKE ");
            qb.push_bind(format!("{}%", escape_like(text)));
        }
        Op::Gt(value) => {
            qb.push(column);
            qb.push(" > ");
            push_value(qb, value);
        }
        Op::Gte(value) => {
            qb.push(column);
            qb.push(" >= ");
            push_value(qb, value);
        }
        Op::Lt(value) => {
            qb.push(column);
            qb.push(" < ");
            push_value(qb, value);
        }
        Op::Lte(value) => {
            qb.push(column);
            qb.push(" <= ");
            push_value(qb, value);
        }
        Op::Between(from, to) => {
            qb.push(column);
            qb.push(" BETWEEN ");
            push_value(qb, from);
            qb.push(" AND ");
            push_value(qb, to);
        }
        Op::In(values) => {
            if values.is_empty() {
                qb.push("FALSE");
                return;
            }
            qb.push(column);
            qb.push(" IN (");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(qb, value);
            }
            qb.push(")");
        }
        Op::IsNull => {
            qb.push(column);
            qb.push(" IS NULL");
        }
        Op::IsNotNull => {
            qb.push(column);
            qb.push(" IS NOT NULL");
        }
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &Value) {
    match value {
        Value::Text(text) => {
            qb.push_bind(text.clone());
        }
        Value::Int(n) => {
            qb.push_bind(*n);
        }
        Value::Bool(b) => {
            qb.push_bind(*b);
        }
        Value::Timestamp(ts) => {
            qb.push_bind(*ts);
        }
    }
}

/// Escape `%`/`_`/`\` so `contains`/`starts_with` treat the caller's text
/// literally instead of as a `LIKE` pattern.
fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}
