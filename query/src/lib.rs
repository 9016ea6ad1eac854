//! # `iam-query`
//!
//! The query layer (spec §4.7, component C7): typed filter trees over
//! read-model columns, a `SearchRequest` (filter + sort + pagination)
//! assembled into parameterized SQL, single-shot policy inheritance
//! resolution (org → instance default → built-in), and a bounded
//! sub-aggregation helper for composite reads.
//!
//! There is no teacher module for this layer — the teacher's auth crate
//! only ever reads its own state by primary key, never by arbitrary
//! filter. The SQL assembly style is grounded on
//! `iam-postgres::event_store`'s own `QueryBuilder` usage (itself grounded
//! on the disintegrate crate's dynamic criteria assembly, see
//! `DESIGN.md`), generalized from one fixed filter shape to an arbitrary
//! predicate tree over any table.

pub mod aggregate;
pub mod filter;
pub mod label_policy;
pub mod policy;
pub mod request;

pub use aggregate::load_children;
pub use filter::{Column, Filter, Op, Value};
pub use label_policy::LabelPolicyReader;
pub use policy::resolve_policy;
pub use request::{build_query, SearchRequest, Sort, SortDirection, DEFAULT_LIMIT, MAX_LIMIT};
