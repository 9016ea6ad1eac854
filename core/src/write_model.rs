//! The write-model contract (spec §4.3, component C3): a transient,
//! in-memory reduction of one aggregate's events, loaded fresh for each
//! command and discarded after.
//!
//! Write-models are pure functions of the event stream: the same events
//! in the same order always produce the same model. They never read
//! from projection tables — doing so would read stale state and violate
//! command determinism (spec §4.3). Cross-aggregate checks must either
//! load another write-model or use a [`crate::unique_constraint`].

use crate::error::Error;
use crate::event::Event;
use crate::event_store::{EventStore, Filter};

/// A pure reduction of one aggregate's event stream, plus the version it
/// was loaded at (spec §4.3).
///
/// # Examples
///
/// ```
/// use iam_core::event::Event;
/// use iam_core::write_model::WriteModel;
///
/// #[derive(Default)]
/// struct OrgModel {
///     name: Option<String>,
///     loaded_version: i64,
/// }
///
/// impl WriteModel for OrgModel {
///     fn reduce(&mut self, event: &Event) {
///         match event.event_type.as_str() {
///             "org.added" => {
///                 self.name = event.payload.get("name")
///                     .and_then(|v| v.as_str())
///                     .map(str::to_string);
///             }
///             _ => {} // unknown event types are no-ops
///         }
///         self.loaded_version = event.aggregate_version;
///     }
///
///     fn loaded_version(&self) -> i64 {
///         self.loaded_version
///     }
/// }
/// ```
pub trait WriteModel: Default + Send {
    /// Apply one event to this model. Handlers for event types this
    /// model does not recognize MUST be no-ops (spec §4.3).
    fn reduce(&mut self, event: &Event);

    /// The highest `aggregate_version` seen so far. `0` for a model that
    /// has not been reduced from any events (a brand-new aggregate).
    fn loaded_version(&self) -> i64;
}

/// Load `model` by issuing a filtered query for `aggregate_id` scoped to
/// `owner`/`instance_id` and reducing events in position order (spec
/// §4.3). The returned model's `loaded_version` is the aggregate's
/// current version, suitable as `expected_version` for the command's
/// subsequent `push`.
///
/// # Errors
///
/// Propagates any [`Error`] the underlying `query` call returns.
pub async fn load<M: WriteModel>(
    store: &dyn EventStore,
    instance_id: &str,
    owner: &str,
    aggregate_id: &str,
) -> Result<M, Error> {
    let filter = Filter::for_instance(instance_id)
        .with_aggregate_ids([aggregate_id.to_string()])
        .with_owner(owner);
    let events = store.query(filter).await?;
    let mut model = M::default();
    for event in &events {
        model.reduce(event);
    }
    Ok(model)
}

/// Fold newly appended events into an already-loaded model in place, so
/// command handlers can return up-to-date [`crate::command::ObjectDetails`]
/// without a second round trip to the store (spec §4.3,
/// "append_and_reduce").
pub fn append_and_reduce<M: WriteModel>(model: &mut M, events: &[Event]) {
    for event in events {
        model.reduce(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;
    use chrono::Utc;
    use serde_json::json;

    #[derive(Default)]
    struct TestModel {
        name: Option<String>,
        loaded_version: i64,
    }

    impl WriteModel for TestModel {
        fn reduce(&mut self, event: &Event) {
            if event.event_type == "org.added" {
                self.name = event
                    .payload
                    .get("name")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
            }
            self.loaded_version = event.aggregate_version;
        }

        fn loaded_version(&self) -> i64 {
            self.loaded_version
        }
    }

    fn test_event(event_type: &str, version: i64, payload: serde_json::Value) -> Event {
        Event {
            id: 1,
            event_type: event_type.to_string(),
            aggregate_type: "org".to_string(),
            aggregate_id: "org-1".to_string(),
            aggregate_version: version,
            revision: 1,
            payload,
            creator: "user-1".to_string(),
            owner: "org-1".to_string(),
            instance_id: "instance-1".to_string(),
            created_at: Utc::now(),
            position: Position::new(version, 0),
        }
    }

    #[test]
    fn unknown_event_types_are_no_ops_besides_version_tracking() {
        let mut model = TestModel::default();
        model.reduce(&test_event("org.renamed", 1, json!({"name": "ignored"})));
        assert_eq!(model.name, None);
        assert_eq!(model.loaded_version(), 1);
    }

    #[test]
    fn append_and_reduce_updates_model_in_place() {
        let mut model = TestModel::default();
        let events = vec![test_event("org.added", 1, json!({"name": "Acme"}))];
        append_and_reduce(&mut model, &events);
        assert_eq!(model.name, Some("Acme".to_string()));
        assert_eq!(model.loaded_version(), 1);
    }
}
