//! The concrete [`ProjectionTransaction`] every `iam-postgres` projection
//! and the checkpoint store share for one batch (spec §4.5 step 4).

use iam_core::projection::ProjectionTransaction;
use sqlx::{Postgres, Transaction};
use std::any::Any;

/// Wraps a live `sqlx` transaction. `Projection::apply` implementations in
/// this crate downcast to this type to run their upsert against the same
/// transaction the worker later commits via
/// [`crate::PostgresProjectionCheckpointStore::advance`].
pub struct PgProjectionTransaction(pub Transaction<'static, Postgres>);

impl ProjectionTransaction for PgProjectionTransaction {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}
