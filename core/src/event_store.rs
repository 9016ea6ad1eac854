//! The eventstore contract (spec §4.2, component C2): the single source
//! of truth every write-model, command, and projection worker reads and
//! writes through.
//!
//! # Design
//!
//! No shared mutable in-memory state is authoritative — all truth lives
//! in the log (spec §5). The trait is deliberately narrow: append,
//! filtered query, and a best-effort subscription that is never the
//! sole delivery mechanism (consumers must also poll, spec §4.2).
//!
//! # Dyn compatibility
//!
//! Like the teacher's original `EventStore` trait, this uses explicit
//! `Pin<Box<dyn Future>>` returns instead of `async fn` so it can be used
//! as `Arc<dyn EventStore>` — required because command handlers and
//! projection workers hold the store behind a trait object, not a
//! generic parameter.
//!
//! # Implementations
//!
//! - `iam-postgres::PostgresEventStore` (production)
//! - `iam-testing::InMemoryEventStore` (tests)

use crate::error::Error;
use crate::event::{Command, Event};
use crate::position::Position;
use std::future::Future;
use std::pin::Pin;

/// Filter for [`EventStore::query`], [`EventStore::latest_event`], and
/// [`EventStore::subscribe`] (spec §4.2).
#[derive(Clone, Debug, Default)]
pub struct Filter {
    /// Required tenant scope.
    pub instance_id: String,
    /// Restrict to these aggregate types, if non-empty.
    pub aggregate_type: Vec<String>,
    /// Restrict to these aggregate ids, if non-empty.
    pub aggregate_id: Vec<String>,
    /// Restrict to these event types, if non-empty.
    pub event_type: Vec<String>,
    /// Restrict to this owner, if set.
    pub owner: Option<String>,
    /// Exclusive lower bound on position.
    pub from: Option<Position>,
    /// Inclusive upper bound on position.
    pub to: Option<Position>,
}

impl Filter {
    /// Start a filter scoped to the given instance; all other fields
    /// default to unrestricted.
    #[must_use]
    pub fn for_instance(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            ..Self::default()
        }
    }

    /// Restrict to the given aggregate types.
    #[must_use]
    pub fn with_aggregate_types(mut self, types: impl IntoIterator<Item = String>) -> Self {
        self.aggregate_type = types.into_iter().collect();
        self
    }

    /// Restrict to the given aggregate ids.
    #[must_use]
    pub fn with_aggregate_ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.aggregate_id = ids.into_iter().collect();
        self
    }

    /// Restrict to the given event types.
    #[must_use]
    pub fn with_event_types(mut self, types: impl IntoIterator<Item = String>) -> Self {
        self.event_type = types.into_iter().collect();
        self
    }

    /// Restrict to the given owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Restrict to events after (exclusive) the given position. Used by
    /// [`EventStore::events_after_position`] and projection drain loops.
    #[must_use]
    pub const fn after(mut self, position: Position) -> Self {
        self.from = Some(position);
        self
    }
}

/// A single notification delivered by [`EventStore::subscribe`]. Best
/// effort only: a lagging subscriber may miss notifications (spec §4.2,
/// "the subscription is an optimization, not a guarantee") and must
/// recover by polling.
#[derive(Clone, Debug)]
pub struct Notification {
    /// The position of the event that was appended.
    pub position: Position,
}

/// Eventstore health snapshot returned by [`EventStore::health`].
#[derive(Clone, Debug)]
pub struct Health {
    /// Whether the store can currently accept `push`/`query` calls.
    pub available: bool,
    /// Human-readable detail, e.g. the last error observed.
    pub detail: Option<String>,
}

/// The append-only log every write-model, command, and projection reads
/// and writes through (spec §4.2).
///
/// # Ordering contract
///
/// For any two events `e1` and `e2` with `e1.position < e2.position`
/// (within the same instance), `e1` was committed no later than `e2`.
/// For a single aggregate, `aggregate_version` is also globally ordered
/// with position.
///
/// # Failure model
///
/// `concurrency_conflict` (precondition failed), `already_exists`
/// (unique constraint collision), `unavailable` (storage), or
/// `invalid_argument` (malformed command). `push` is all-or-nothing —
/// a conflict on any one command in a batch aborts the whole batch.
pub trait EventStore: Send + Sync {
    /// Append one or more commands atomically.
    ///
    /// For each command, `aggregate_version = current + 1`. If
    /// `expected_version` disagrees with `current`, the whole batch fails
    /// with `concurrency_conflict` (spec §4.2). Assigns
    /// `position.pos = next commit sequence` and
    /// `position.in_tx_order = index within this batch`. Unique-constraint
    /// adds/removes implied by the commands are persisted in the same
    /// transaction; a collision fails the batch with `already_exists`.
    ///
    /// This method never retries internally — callers retry on
    /// `concurrency_conflict` (spec §4.4, "Retry policy").
    fn push(
        &self,
        commands: Vec<Command>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, Error>> + Send + '_>>;

    /// Query events matching `filter`, ascending by position.
    fn query(
        &self,
        filter: Filter,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, Error>> + Send + '_>>;

    /// Convenience: the single most recent event matching `filter`, or
    /// `None` if none match.
    fn latest_event(
        &self,
        filter: Filter,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Event>, Error>> + Send + '_>>;

    /// Projection drain primitive: up to `limit` events strictly after
    /// `position`, ascending, scoped by `filter` (spec §4.5 step 2).
    /// `filter.from` is overwritten with `position`.
    fn events_after_position(
        &self,
        filter: Filter,
        position: Position,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, Error>> + Send + '_>>;

    /// Subscribe to a best-effort stream of newly appended events
    /// matching `filter`. Consumers MUST also poll — this is an
    /// in-process optimization, never a guaranteed delivery channel
    /// (spec §4.2).
    fn subscribe(&self, filter: Filter) -> tokio::sync::broadcast::Receiver<Notification>;

    /// Report whether the store can currently serve `push`/`query`.
    fn health(&self) -> Pin<Box<dyn Future<Output = Health> + Send + '_>>;

    /// Release any held resources (connection pools, background tasks).
    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_builder_composes() {
        let filter = Filter::for_instance("instance-1")
            .with_aggregate_types(["org".to_string()])
            .with_event_types(["org.added".to_string()])
            .after(Position::new(5, 0));
        assert_eq!(filter.instance_id, "instance-1");
        assert_eq!(filter.aggregate_type, vec!["org".to_string()]);
        assert_eq!(filter.from, Some(Position::new(5, 0)));
    }

    #[test]
    fn default_filter_is_unrestricted_besides_instance() {
        let filter = Filter::for_instance("instance-1");
        assert!(filter.aggregate_type.is_empty());
        assert!(filter.event_type.is_empty());
        assert!(filter.owner.is_none());
    }
}
