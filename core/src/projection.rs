//! Projection trait contracts (spec §4.5/§4.6, components C5/C6).
//!
//! This module defines only the *contract* a projection and its
//! checkpoint store must satisfy; the worker loop that drives them
//! (lease, fetch, apply, advance) lives in `iam-projections`, and the
//! Postgres-backed checkpoint store lives in `iam-postgres`. Keeping the
//! trait here (rather than in `iam-projections`) lets `iam-domain`
//! define projections without depending on the worker crate, mirroring
//! how the teacher split `core::projection`'s trait contracts from its
//! concrete Postgres backend in `projections/src/postgres.rs`.

use crate::error::Error;
use crate::event::Event;
use crate::position::Position;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Type-erased handle to an in-flight storage transaction, shared between
/// one batch's [`Projection::apply`] calls and the terminal
/// [`ProjectionCheckpointStore::advance`] call so a projection's writes
/// and its checkpoint advance commit atomically (spec §4.5 step 4, "same
/// transaction as step 3").
///
/// Obtained from [`ProjectionCheckpointStore::begin_transaction`] and
/// consumed by `advance`. Kept storage-agnostic rather than exposing
/// `sqlx::Transaction` directly here, so an in-memory
/// `ProjectionCheckpointStore` test double never needs a real Postgres
/// connection — concrete backends downcast to their own transaction type
/// via [`Any`].
pub trait ProjectionTransaction: Send {
    /// Borrowed downcast, used by [`Projection::apply`] while the
    /// transaction is still shared with the worker's loop.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Owned downcast, used by [`ProjectionCheckpointStore::advance`] to
    /// recover the concrete transaction and commit it.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// Lifecycle states a projection worker moves through (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionStatus {
    /// Registered but not yet started.
    Stopped,
    /// Acquiring its first lease / running its table initializer.
    Starting,
    /// Actively polling and applying events.
    Running,
    /// Finishing its current batch before stopping.
    Draining,
    /// The initializer failed, or the retry budget for a poison event
    /// was exhausted. Requires manual intervention.
    Failed,
}

/// A projection's checkpoint row: how far it has applied the log, who
/// currently holds its worker lease, and its failure state (spec §4.5).
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// Unique projection name; the checkpoint row's key.
    pub name: String,
    /// Highest position this projection has applied.
    pub position: Position,
    /// Current lifecycle state.
    pub status: ProjectionStatus,
    /// Opaque worker instance id holding the lease, if any.
    pub lease_owner: Option<String>,
    /// When the current lease expires. A compare-and-set lease
    /// acquisition only succeeds if this is in the past or absent.
    pub lease_expires_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Consecutive failures applying the event at `position + 1`.
    pub retry_count: u32,
    /// The error message from the most recent failure, if any.
    pub last_error: Option<String>,
}

/// Backend for reading and advancing [`Checkpoint`] rows (spec §4.5 step
/// 1 and step 4). Implemented by `iam-postgres`.
///
/// # Dyn compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so `ProjectionRegistry`
/// can hold `Arc<dyn ProjectionCheckpointStore>`, following the
/// teacher's `core/src/projection.rs::ProjectionCheckpoint` pattern.
pub trait ProjectionCheckpointStore: Send + Sync {
    /// Read a projection's checkpoint, creating a `Stopped` row at
    /// [`Position::BEFORE_FIRST`] if this is the first time `name` has
    /// been seen.
    fn load(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Checkpoint, Error>> + Send + '_>>;

    /// Compare-and-set lease acquisition: succeeds only if the lease is
    /// expired or unowned. `lease_duration` is typically
    /// `5 × polling_interval` (spec §4.5 step 1).
    fn acquire_lease(
        &self,
        name: &str,
        worker_id: &str,
        lease_duration: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<bool, Error>> + Send + '_>>;

    /// Open a transaction for one batch's `apply` calls and the terminal
    /// `advance` call to share (spec §4.5 step 4).
    fn begin_transaction(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn ProjectionTransaction>, Error>> + Send + '_>>;

    /// Advance `position` and renew the lease, committing `tx` as the
    /// final act — atomic with whatever the caller applied through it
    /// (spec §4.5 step 4). Resets `retry_count` and `last_error`.
    fn advance(
        &self,
        tx: Box<dyn ProjectionTransaction>,
        name: &str,
        worker_id: &str,
        position: Position,
        lease_duration: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>>;

    /// Record a reducer failure at the checkpoint's current position,
    /// incrementing `retry_count`. Callers transition to
    /// [`ProjectionStatus::Failed`] once the retry budget is exhausted
    /// (spec §4.5, "Failure semantics").
    fn record_failure(
        &self,
        name: &str,
        error: &str,
    ) -> Pin<Box<dyn Future<Output = Result<u32, Error>> + Send + '_>>;

    /// Force a checkpoint's status, used to mark `Failed` or to resume a
    /// worker an operator has manually nudged past a poison event.
    fn set_status(
        &self,
        name: &str,
        status: ProjectionStatus,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>>;
}

/// A named, idempotent consumer of the event log (spec §4.5).
///
/// A projection is defined by its name, the event/aggregate types it
/// cares about, and a reducer (`apply`) that performs idempotent SQL
/// against its own tables. Event types the reducer does not recognize
/// MUST be treated as a no-op (forward compatibility, spec §4.5).
pub trait Projection: Send + Sync {
    /// Unique name; also the checkpoint row's key.
    fn name(&self) -> &str;

    /// Event types this projection cares about. An empty slice means
    /// "all event types" and is only appropriate for audit-log-style
    /// projections.
    fn event_types(&self) -> &[String];

    /// Aggregate types this projection cares about. An empty slice means
    /// "all aggregate types".
    fn aggregate_types(&self) -> &[String];

    /// How often the worker polls when no subscription notification
    /// arrives.
    fn polling_interval(&self) -> Duration;

    /// Maximum number of events fetched per `events_after_position` call.
    fn batch_size(&self) -> u32;

    /// Apply one event to this projection's tables. MUST use
    /// upsert/idempotent SQL (e.g. `INSERT … ON CONFLICT DO UPDATE`) so
    /// replaying the same event is a no-op (spec §4.5 step 3). Shares
    /// `tx` with the worker's other calls in this batch and the terminal
    /// `ProjectionCheckpointStore::advance` — implementations must write
    /// through `tx`, not a transaction of their own.
    fn apply<'a>(
        &'a self,
        tx: &'a mut dyn ProjectionTransaction,
        event: &'a Event,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

    /// Create this projection's owned tables if they do not exist.
    /// Failure here moves the checkpoint straight to `Failed` (spec
    /// §4.5, "Lifecycle states").
    fn initialize(&self) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_status_variants_are_distinguishable() {
        assert_ne!(ProjectionStatus::Stopped, ProjectionStatus::Running);
        assert_eq!(ProjectionStatus::Failed, ProjectionStatus::Failed);
    }
}
