//! Application state shared across all HTTP handlers.

use iam_core::event_store::EventStore;
use iam_query::LabelPolicyReader;
use std::sync::Arc;

/// Shared application state: the one thing every handler needs to reach
/// the command and query layers.
#[derive(Clone)]
pub struct AppState {
    /// The eventstore every command handler reads and writes through.
    pub store: Arc<dyn EventStore>,
    /// The `label_policies` read model `resolve_label_policy` queries (an
    /// `iam-postgres::LabelPolicyProjection` in production, an
    /// `InMemoryLabelPolicyProjection` in tests).
    pub label_policies: Arc<dyn LabelPolicyReader>,
}

impl AppState {
    /// Build state around an eventstore and a label-policy reader.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, label_policies: Arc<dyn LabelPolicyReader>) -> Self {
        Self { store, label_policies }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iam_testing::{InMemoryEventStore, InMemoryLabelPolicyProjection};

    fn state() -> AppState {
        AppState::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryLabelPolicyProjection::new()),
        )
    }

    #[test]
    fn state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn wraps_an_eventstore() {
        let state = state();
        assert!(Arc::strong_count(&state.store) >= 1);
    }
}
