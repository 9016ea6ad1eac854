//! A fast, deterministic, in-process [`EventStore`], used by every crate's
//! unit tests instead of standing up Postgres. Grounded on the teacher's
//! split between a production Postgres backend and an in-memory testing
//! backend implementing the same trait (`core/src/event_store.rs`'s
//! doc comment names `InMemoryEventStore` as the testing counterpart to
//! `PostgresEventStore`).

use iam_core::error::Error;
use iam_core::event::{Command, Event};
use iam_core::event_store::{EventStore, Filter, Health, Notification};
use iam_core::position::Position;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use tokio::sync::broadcast;

struct State {
    events: Vec<Event>,
    next_pos: i64,
    next_id: i64,
    // (instance_id, aggregate_id) -> current version
    versions: HashMap<(String, String), i64>,
    // (instance_id, unique_type, unique_field) -> aggregate_id
    unique_constraints: HashMap<(String, String, String), String>,
}

impl State {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            next_pos: 1,
            next_id: 1,
            versions: HashMap::new(),
            unique_constraints: HashMap::new(),
        }
    }
}

/// In-memory [`EventStore`] backed by a single mutex-guarded `Vec<Event>`.
/// Not for production use — it holds every event in process memory and
/// offers no durability across restarts.
pub struct InMemoryEventStore {
    state: Mutex<State>,
    notifications: broadcast::Sender<Notification>,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (notifications, _) = broadcast::channel(1024);
        Self {
            state: Mutex::new(State::new()),
            notifications,
        }
    }

    #[allow(clippy::unwrap_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn matches(event: &Event, filter: &Filter) -> bool {
    if event.instance_id != filter.instance_id {
        return false;
    }
    if !filter.aggregate_type.is_empty() && !filter.aggregate_type.contains(&event.aggregate_type)
    {
        return false;
    }
    if !filter.aggregate_id.is_empty() && !filter.aggregate_id.contains(&event.aggregate_id) {
        return false;
    }
    if !filter.event_type.is_empty() && !filter.event_type.contains(&event.event_type) {
        return false;
    }
    if let Some(owner) = &filter.owner {
        if &event.owner != owner {
            return false;
        }
    }
    if let Some(from) = filter.from {
        if event.position <= from {
            return false;
        }
    }
    if let Some(to) = filter.to {
        if event.position > to {
            return false;
        }
    }
    true
}

impl EventStore for InMemoryEventStore {
    fn push(
        &self,
        commands: Vec<Command>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, Error>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.lock();

            // Validate all preconditions before mutating anything, so a
            // failure anywhere in the batch leaves the store untouched
            // (spec §4.2, "push is all-or-nothing").
            for command in &commands {
                let key = (command.instance_id.clone(), command.aggregate_id.clone());
                let current = state.versions.get(&key).copied().unwrap_or(0);
                if let Some(expected) = command.expected_version {
                    if expected != current {
                        return Err(Error::failed_precondition(
                            "EVENTSTORE-Conflict1",
                            format!(
                                "concurrency conflict on {}/{}: expected version {expected}, found {current}",
                                command.aggregate_type, command.aggregate_id
                            ),
                        ));
                    }
                }
                for request in &command.unique_constraints {
                    if let iam_core::unique_constraint::UniqueConstraintRequest::Add {
                        unique_type,
                        unique_field,
                        aggregate_id,
                    } = request
                    {
                        let ckey = (
                            command.instance_id.clone(),
                            unique_type.clone(),
                            unique_field.clone(),
                        );
                        if let Some(existing) = state.unique_constraints.get(&ckey) {
                            if existing != aggregate_id {
                                return Err(Error::already_exists(
                                    "EVENTSTORE-Unique1",
                                    format!("{unique_type}:{unique_field} already claimed"),
                                ));
                            }
                        }
                    }
                }
            }

            let mut produced = Vec::with_capacity(commands.len());
            for (index, command) in commands.into_iter().enumerate() {
                let key = (command.instance_id.clone(), command.aggregate_id.clone());
                let current = state.versions.get(&key).copied().unwrap_or(0);
                let new_version = current + 1;
                let id = state.next_id;
                state.next_id += 1;
                let position = Position::new(state.next_pos, index as i32);

                for request in &command.unique_constraints {
                    match request {
                        iam_core::unique_constraint::UniqueConstraintRequest::Add {
                            unique_type,
                            unique_field,
                            aggregate_id,
                        } => {
                            state.unique_constraints.insert(
                                (command.instance_id.clone(), unique_type.clone(), unique_field.clone()),
                                aggregate_id.clone(),
                            );
                        }
                        iam_core::unique_constraint::UniqueConstraintRequest::Remove {
                            unique_type,
                            unique_field,
                        } => {
                            state.unique_constraints.remove(&(
                                command.instance_id.clone(),
                                unique_type.clone(),
                                unique_field.clone(),
                            ));
                        }
                    }
                }

                let event = Event {
                    id,
                    event_type: command.event_type,
                    aggregate_type: command.aggregate_type,
                    aggregate_id: command.aggregate_id,
                    aggregate_version: new_version,
                    revision: command.revision,
                    payload: command.payload,
                    creator: command.creator,
                    owner: command.owner,
                    instance_id: command.instance_id,
                    created_at: chrono::Utc::now(),
                    position,
                };
                state.versions.insert(key, new_version);
                state.events.push(event.clone());
                produced.push(event);
            }
            state.next_pos += 1;

            for event in &produced {
                let _ = self.notifications.send(Notification {
                    position: event.position,
                });
            }

            Ok(produced)
        })
    }

    fn query(
        &self,
        filter: Filter,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, Error>> + Send + '_>> {
        Box::pin(async move {
            let state = self.lock();
            let mut matched: Vec<Event> = state
                .events
                .iter()
                .filter(|event| matches(event, &filter))
                .cloned()
                .collect();
            matched.sort_by_key(|event| event.position);
            Ok(matched)
        })
    }

    fn latest_event(
        &self,
        filter: Filter,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Event>, Error>> + Send + '_>> {
        Box::pin(async move {
            let state = self.lock();
            let latest = state
                .events
                .iter()
                .filter(|event| matches(event, &filter))
                .max_by_key(|event| event.position)
                .cloned();
            Ok(latest)
        })
    }

    fn events_after_position(
        &self,
        filter: Filter,
        position: Position,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, Error>> + Send + '_>> {
        let filter = filter.after(position);
        Box::pin(async move {
            let state = self.lock();
            let mut matched: Vec<Event> = state
                .events
                .iter()
                .filter(|event| matches(event, &filter))
                .cloned()
                .collect();
            matched.sort_by_key(|event| event.position);
            matched.truncate(limit as usize);
            Ok(matched)
        })
    }

    fn subscribe(&self, _filter: Filter) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    fn health(&self) -> Pin<Box<dyn Future<Output = Health> + Send + '_>> {
        Box::pin(async move {
            Health {
                available: true,
                detail: None,
            }
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iam_core::unique_constraint::UniqueConstraintRequest;
    use serde_json::json;

    fn add_org_command(instance: &str, org_id: &str, expected: Option<i64>) -> Command {
        Command::new(
            "org",
            org_id,
            "org.added",
            1,
            json!({"name": "Acme"}),
            instance,
            org_id,
            "user-1",
        )
        .with_expected_version(expected.unwrap_or(0))
    }

    #[tokio::test]
    async fn push_assigns_monotonic_versions_and_positions() {
        let store = InMemoryEventStore::new();
        let events = store
            .push(vec![add_org_command("instance-1", "org-1", Some(0))])
            .await
            .unwrap();
        assert_eq!(events[0].aggregate_version, 1);
        assert_eq!(events[0].position, Position::new(1, 0));

        let events = store
            .push(vec![Command::new(
                "org",
                "org-1",
                "org.renamed",
                1,
                json!({}),
                "instance-1",
                "org-1",
                "user-1",
            )
            .with_expected_version(1)])
            .await
            .unwrap();
        assert_eq!(events[0].aggregate_version, 2);
        assert_eq!(events[0].position, Position::new(2, 0));
    }

    #[tokio::test]
    async fn push_rejects_stale_expected_version() {
        let store = InMemoryEventStore::new();
        store
            .push(vec![add_org_command("instance-1", "org-1", Some(0))])
            .await
            .unwrap();

        let err = store
            .push(vec![add_org_command("instance-1", "org-1", Some(0))])
            .await
            .unwrap_err();
        assert_eq!(err.kind, iam_core::error::Kind::FailedPrecondition);
    }

    #[tokio::test]
    async fn push_rejects_duplicate_unique_constraint() {
        let store = InMemoryEventStore::new();
        let command = add_org_command("instance-1", "org-1", Some(0))
            .with_unique_constraint(UniqueConstraintRequest::add("slug", "acme", "org-1"));
        store.push(vec![command]).await.unwrap();

        let conflicting = add_org_command("instance-1", "org-2", Some(0))
            .with_unique_constraint(UniqueConstraintRequest::add("slug", "acme", "org-2"));
        let err = store.push(vec![conflicting]).await.unwrap_err();
        assert_eq!(err.kind, iam_core::error::Kind::AlreadyExists);
    }

    #[tokio::test]
    async fn query_filters_by_instance_and_returns_ascending_position() {
        let store = InMemoryEventStore::new();
        store
            .push(vec![add_org_command("instance-1", "org-1", Some(0))])
            .await
            .unwrap();
        store
            .push(vec![add_org_command("instance-2", "org-2", Some(0))])
            .await
            .unwrap();
        store
            .push(vec![Command::new(
                "org",
                "org-1",
                "org.renamed",
                1,
                json!({}),
                "instance-1",
                "org-1",
                "user-1",
            )
            .with_expected_version(1)])
            .await
            .unwrap();

        let events = store
            .query(Filter::for_instance("instance-1"))
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].position < events[1].position);
    }

    #[tokio::test]
    async fn events_after_position_respects_limit() {
        let store = InMemoryEventStore::new();
        for i in 0..5 {
            store
                .push(vec![add_org_command(
                    "instance-1",
                    &format!("org-{i}"),
                    Some(0),
                )])
                .await
                .unwrap();
        }
        let events = store
            .events_after_position(Filter::for_instance("instance-1"), Position::BEFORE_FIRST, 2)
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn subscribe_receives_pushed_event_notifications() {
        let store = InMemoryEventStore::new();
        let mut receiver = store.subscribe(Filter::for_instance("instance-1"));
        store
            .push(vec![add_org_command("instance-1", "org-1", Some(0))])
            .await
            .unwrap();
        let notification = receiver.recv().await.unwrap();
        assert_eq!(notification.position, Position::new(1, 0));
    }
}
