//! `PostgreSQL`-backed storage for the event-sourced identity/access
//! backend: the production [`EventStore`](iam_core::event_store::EventStore)
//! implementation and the checkpoint store projections use to track their
//! progress (spec §4.2, §4.5, §6).
//!
//! Grounded on the disintegrate Postgres event store pattern (a
//! `SERIALIZABLE` transaction plus an existence check before insert,
//! Postgres error code `40001` mapped to a concurrency error) and on the
//! teacher's `runtime` crate for retry/circuit-breaking ambient concerns.
//! See `DESIGN.md` for the full grounding ledger.
//!
//! Run `migrations/` with `sqlx::migrate!` (or the `sqlx-cli`) before
//! constructing [`PostgresEventStore`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod checkpoint;
mod event_store;
mod label_policy_projection;
mod transaction;

pub use checkpoint::PostgresProjectionCheckpointStore;
pub use event_store::PostgresEventStore;
pub use label_policy_projection::LabelPolicyProjection;
pub use transaction::PgProjectionTransaction;
