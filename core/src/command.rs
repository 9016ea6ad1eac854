//! Supporting types for the command layer's seven-step template (spec
//! §4.4, component C4). The template itself — validate, resolve ids,
//! authorize, load, check invariants, emit, reduce — is implemented per
//! command in `iam-domain`; this module holds the shared inputs and
//! outputs every command handler passes around.

use crate::environment::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Ambient request context threaded through every command handler: who
/// is calling, on whose behalf, and the [`Clock`] it timestamps its work
/// with (spec §4.4 step 3, "authorize"; `iam_core::environment`'s `Clock`
/// abstraction).
#[derive(Clone)]
pub struct CommandContext {
    /// The authenticated caller.
    pub caller_id: String,
    /// Tenant scope.
    pub instance_id: String,
    /// Command id for observability, e.g. `COMMAND-App10` (spec §4.4).
    pub command_id: &'static str,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("caller_id", &self.caller_id)
            .field("instance_id", &self.instance_id)
            .field("command_id", &self.command_id)
            .finish_non_exhaustive()
    }
}

impl CommandContext {
    /// Build a context for a command identified by `command_id`, timestamping
    /// with [`SystemClock`]. Use [`Self::with_clock`] to inject a
    /// deterministic clock in tests.
    #[must_use]
    pub fn new(
        caller_id: impl Into<String>,
        instance_id: impl Into<String>,
        command_id: &'static str,
    ) -> Self {
        Self {
            caller_id: caller_id.into(),
            instance_id: instance_id.into(),
            command_id,
            clock: Arc::new(SystemClock),
        }
    }

    /// Override this context's clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The current time per this context's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Step 3 of the command template (spec §4.4, "authorize"):
/// `check_permission(ctx, resource, action, scope)`.
///
/// This is a minimal scope check, not a policy engine — domain-level
/// policy semantics beyond how they are persisted are out of scope (spec
/// §1). It enforces the one invariant every command needs regardless of
/// policy: a command must be attributed to an authenticated caller, and
/// that caller must be acting within the tenant scope it claims.
///
/// # Errors
///
/// Returns `permission_denied` if `ctx.caller_id` is empty, or if `scope`
/// does not match `ctx.instance_id`.
pub fn check_permission(
    ctx: &CommandContext,
    resource: &str,
    action: &str,
    scope: &str,
) -> crate::error::Result<()> {
    if ctx.caller_id.trim().is_empty() {
        return Err(crate::error::Error::permission_denied(
            ctx.command_id,
            format!("no authenticated caller for {action} on {resource}"),
        ));
    }
    if scope != ctx.instance_id {
        return Err(crate::error::Error::permission_denied(
            ctx.command_id,
            format!(
                "caller {} may not {action} {resource} outside instance {}",
                ctx.caller_id, ctx.instance_id
            ),
        ));
    }
    Ok(())
}

/// What every command returns on success (spec §4.4 step 7): enough
/// information for a caller to know what happened without re-querying.
#[derive(Clone, Debug)]
pub struct ObjectDetails {
    /// The aggregate's version after this command's events were applied.
    pub sequence: i64,
    /// When the command's events were committed.
    pub event_date: DateTime<Utc>,
    /// The resource owner the affected aggregate belongs to.
    pub resource_owner: String,
}

impl ObjectDetails {
    /// Build details from a just-reduced write-model and the position of
    /// its most recently applied event.
    #[must_use]
    pub fn new(sequence: i64, event_date: DateTime<Utc>, resource_owner: impl Into<String>) -> Self {
        Self {
            sequence,
            event_date,
            resource_owner: resource_owner.into(),
        }
    }
}

/// Convenience: derive [`ObjectDetails`] from the last event of a
/// successful `push`, which is always the event with the highest
/// position in the batch.
#[must_use]
pub fn object_details_from_last_event(
    events: &[crate::event::Event],
) -> Option<ObjectDetails> {
    events
        .iter()
        .max_by_key(|event| event.position)
        .map(|event| {
            ObjectDetails::new(event.aggregate_version, event.created_at, &event.owner)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::position::Position;
    use serde_json::json;

    fn event_at(position: Position, version: i64) -> Event {
        Event {
            id: 1,
            event_type: "org.added".to_string(),
            aggregate_type: "org".to_string(),
            aggregate_id: "org-1".to_string(),
            aggregate_version: version,
            revision: 1,
            payload: json!({}),
            creator: "user-1".to_string(),
            owner: "org-1".to_string(),
            instance_id: "instance-1".to_string(),
            created_at: Utc::now(),
            position,
        }
    }

    #[test]
    fn object_details_picks_highest_position() {
        let events = vec![
            event_at(Position::new(1, 0), 1),
            event_at(Position::new(1, 1), 2),
        ];
        let details = object_details_from_last_event(&events).unwrap();
        assert_eq!(details.sequence, 2);
    }

    #[test]
    fn object_details_from_empty_events_is_none() {
        assert!(object_details_from_last_event(&[]).is_none());
    }

    #[test]
    fn check_permission_rejects_an_unauthenticated_caller() {
        let ctx = CommandContext::new("", "instance-1", "COMMAND-Test1");
        let error = check_permission(&ctx, "organization", "create", "instance-1").unwrap_err();
        assert_eq!(error.kind, crate::error::Kind::PermissionDenied);
    }

    #[test]
    fn check_permission_rejects_a_scope_outside_the_caller_instance() {
        let ctx = CommandContext::new("user-admin", "instance-1", "COMMAND-Test1");
        let error = check_permission(&ctx, "organization", "create", "instance-2").unwrap_err();
        assert_eq!(error.kind, crate::error::Kind::PermissionDenied);
    }

    #[test]
    fn check_permission_allows_an_authenticated_caller_in_scope() {
        let ctx = CommandContext::new("user-admin", "instance-1", "COMMAND-Test1");
        check_permission(&ctx, "organization", "create", "instance-1").unwrap();
    }
}
