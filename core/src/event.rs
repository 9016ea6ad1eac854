//! The atomic unit of the log (spec §3) and the write intent that
//! produces it.
//!
//! # Wire format
//!
//! Unlike the teacher's `bincode`-encoded event, this system's payload
//! is JSON (spec §6: "Event payload format — JSON object; fields use
//! camelCase; binary fields are base64 strings"). `payload` is a
//! `serde_json::Value` end to end — the eventstore never deserializes
//! it into a concrete type; only write-models and projection reducers
//! do, each defensively reading only the fields their revision
//! understands (spec §9, "Payload as untyped JSON").

use crate::position::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fact that has happened, already assigned a position by the
/// eventstore. Immutable once appended (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Globally unique event id (see [`crate::ids::Snowflake`]).
    pub id: i64,
    /// Dotted event type, e.g. `user.human.added` (spec §6).
    pub event_type: String,
    /// The aggregate type this event belongs to, e.g. `org`, `user`.
    pub aggregate_type: String,
    /// The aggregate instance this event mutated.
    pub aggregate_id: String,
    /// Monotonic per `(instance_id, aggregate_id)`, starting at 1.
    pub aggregate_version: i64,
    /// Schema version of `payload`, ≥ 1. New fields are additive; old
    /// revisions are never re-purposed (spec §6).
    pub revision: i32,
    /// Arbitrary JSON payload. camelCase fields, base64 binary.
    pub payload: serde_json::Value,
    /// Who caused this event (a user id, a system actor name, ...).
    pub creator: String,
    /// Resource owner / tenant sub-scope (typically an organization id).
    pub owner: String,
    /// Top-level tenant.
    pub instance_id: String,
    /// Wall clock at append time. Informational only — ordering is by
    /// `position`, never by `created_at`.
    pub created_at: DateTime<Utc>,
    /// Global per-instance cursor assigned by the eventstore.
    pub position: Position,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} (aggregate={}/{}, v{}, pos={})",
            self.event_type,
            self.instance_id,
            self.aggregate_type,
            self.aggregate_id,
            self.aggregate_version,
            self.position
        )
    }
}

/// An ephemeral write intent, identical in shape to [`Event`] minus the
/// fields the eventstore itself assigns (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Command {
    /// Dotted event type this command will produce.
    pub event_type: String,
    /// The aggregate type this command targets.
    pub aggregate_type: String,
    /// The aggregate instance this command targets.
    pub aggregate_id: String,
    /// Schema version of `payload`.
    pub revision: i32,
    /// Arbitrary JSON payload for the resulting event.
    pub payload: serde_json::Value,
    /// Who is issuing this command.
    pub creator: String,
    /// Resource owner / tenant sub-scope.
    pub owner: String,
    /// Top-level tenant.
    pub instance_id: String,
    /// Optimistic-concurrency precondition: the aggregate must currently
    /// be at this version or `push` fails with `concurrency_conflict`.
    /// `None` skips the check (only appropriate for first-ever commands
    /// on a brand new aggregate id, and even then callers should usually
    /// pass `Some(0)`).
    pub expected_version: Option<i64>,
    /// Unique-constraint claims/releases to persist in the same
    /// transaction as the resulting event (spec §3,
    /// "Unique-Constraint Record"; spec §4.2, "Persist unique-constraint
    /// adds/removes in the same transaction as the events").
    pub unique_constraints: Vec<crate::unique_constraint::UniqueConstraintRequest>,
}

impl Command {
    /// Build a command. Event-type naming convention is
    /// `<aggregateType>.<subject>.<verb>` (spec §6), advisory only.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        revision: i32,
        payload: serde_json::Value,
        instance_id: impl Into<String>,
        owner: impl Into<String>,
        creator: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            revision,
            payload,
            creator: creator.into(),
            owner: owner.into(),
            instance_id: instance_id.into(),
            expected_version: None,
            unique_constraints: Vec::new(),
        }
    }

    /// Attach an optimistic-concurrency precondition.
    #[must_use]
    pub const fn with_expected_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Attach a unique-constraint claim or release to persist alongside
    /// this command's event.
    #[must_use]
    pub fn with_unique_constraint(
        mut self,
        request: crate::unique_constraint::UniqueConstraintRequest,
    ) -> Self {
        self.unique_constraints.push(request);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_builder_defaults_expected_version_to_none() {
        let cmd = Command::new(
            "org",
            "org-1",
            "org.added",
            1,
            json!({"name": "Acme"}),
            "instance-1",
            "org-1",
            "user-1",
        );
        assert_eq!(cmd.expected_version, None);
        assert_eq!(cmd.event_type, "org.added");
    }

    #[test]
    fn with_expected_version_sets_precondition() {
        let cmd = Command::new(
            "org",
            "org-1",
            "org.renamed",
            1,
            json!({}),
            "instance-1",
            "org-1",
            "user-1",
        )
        .with_expected_version(3);
        assert_eq!(cmd.expected_version, Some(3));
    }

    #[test]
    fn event_display_includes_position() {
        let event = Event {
            id: 1,
            event_type: "org.added".to_string(),
            aggregate_type: "org".to_string(),
            aggregate_id: "org-1".to_string(),
            aggregate_version: 1,
            revision: 1,
            payload: json!({}),
            creator: "user-1".to_string(),
            owner: "org-1".to_string(),
            instance_id: "instance-1".to_string(),
            created_at: Utc::now(),
            position: Position::new(1, 0),
        };
        assert!(event.to_string().contains("pos=1.0"));
    }
}
