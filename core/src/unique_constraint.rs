//! Cross-aggregate uniqueness that cannot be expressed by version checks
//! alone (spec §3, "Unique-Constraint Record").
//!
//! A unique constraint maps `(instance_id, unique_type, unique_field)` to
//! the `aggregate_id` that claimed it — for example, a username claim
//! for a human user. `iam-postgres::PostgresEventStore::push` persists
//! adds/removes implied by a batch's commands in the same transaction as
//! the events; a collision fails the whole `push` with `already_exists`
//! (spec §4.2).

/// A single add or release of a unique claim, attached to a
/// [`crate::event::Command`] so the eventstore can enforce it
/// transactionally alongside the command's events.
#[derive(Clone, Debug, PartialEq)]
pub enum UniqueConstraintRequest {
    /// Claim `(unique_type, unique_field)` for `aggregate_id`. Fails the
    /// enclosing `push` with `already_exists` if already claimed by a
    /// different aggregate.
    Add {
        /// The kind of uniqueness being enforced, e.g. `"username"`.
        unique_type: String,
        /// The value being claimed, e.g. the username itself.
        unique_field: String,
        /// The aggregate claiming it.
        aggregate_id: String,
    },
    /// Release a previously claimed `(unique_type, unique_field)`, e.g.
    /// when a user is removed and their username becomes available
    /// again.
    Remove {
        /// The kind of uniqueness being released.
        unique_type: String,
        /// The value being released.
        unique_field: String,
    },
}

impl UniqueConstraintRequest {
    /// Build an `Add` request.
    #[must_use]
    pub fn add(
        unique_type: impl Into<String>,
        unique_field: impl Into<String>,
        aggregate_id: impl Into<String>,
    ) -> Self {
        Self::Add {
            unique_type: unique_type.into(),
            unique_field: unique_field.into(),
            aggregate_id: aggregate_id.into(),
        }
    }

    /// Build a `Remove` request.
    #[must_use]
    pub fn remove(unique_type: impl Into<String>, unique_field: impl Into<String>) -> Self {
        Self::Remove {
            unique_type: unique_type.into(),
            unique_field: unique_field.into(),
        }
    }
}
