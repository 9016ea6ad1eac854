//! A fast, deterministic [`Projection`] + [`LabelPolicyReader`] test
//! double for the `label_policies` read model, the in-memory counterpart
//! to `iam-postgres::LabelPolicyProjection`.

use crate::in_memory_checkpoint::InMemoryProjectionTransaction;
use iam_core::error::Error;
use iam_core::event::Event;
use iam_core::projection::{Projection, ProjectionTransaction};
use iam_query::LabelPolicyReader;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

/// In-memory projection over `label_policy.set` events, keyed by
/// `(instance_id, scope_key)`.
#[derive(Default)]
pub struct InMemoryLabelPolicyProjection {
    rows: Mutex<HashMap<(String, String), String>>,
    event_types: Vec<String>,
    aggregate_types: Vec<String>,
}

impl InMemoryLabelPolicyProjection {
    /// Construct an empty projection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            event_types: vec!["label_policy.set".to_string()],
            aggregate_types: vec!["label_policy".to_string()],
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), String>> {
        self.rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Projection for InMemoryLabelPolicyProjection {
    fn name(&self) -> &str {
        "label_policies"
    }

    fn event_types(&self) -> &[String] {
        &self.event_types
    }

    fn aggregate_types(&self) -> &[String] {
        &self.aggregate_types
    }

    fn polling_interval(&self) -> Duration {
        Duration::from_millis(10)
    }

    fn batch_size(&self) -> u32 {
        100
    }

    fn apply<'a>(
        &'a self,
        _tx: &'a mut dyn ProjectionTransaction,
        event: &'a Event,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            if event.event_type != "label_policy.set" {
                return Ok(());
            }
            let Some(primary_color) = event.payload.get("primaryColor").and_then(|v| v.as_str()) else {
                return Ok(());
            };
            self.lock().insert(
                (event.instance_id.clone(), event.aggregate_id.clone()),
                primary_color.to_string(),
            );
            Ok(())
        })
    }

    fn initialize(&self) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        Box::pin(async move { Ok(()) })
    }
}

impl LabelPolicyReader for InMemoryLabelPolicyProjection {
    fn primary_color<'a>(
        &'a self,
        instance_id: &'a str,
        scope_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, Error>> + Send + 'a>> {
        Box::pin(async move {
            Ok(self
                .lock()
                .get(&(instance_id.to_string(), scope_key.to_string()))
                .cloned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iam_core::event::Event;
    use iam_core::position::Position;
    use serde_json::json;

    fn set_event(instance_id: &str, scope_key: &str, primary_color: &str) -> Event {
        Event {
            id: 1,
            event_type: "label_policy.set".to_string(),
            aggregate_type: "label_policy".to_string(),
            aggregate_id: scope_key.to_string(),
            aggregate_version: 1,
            revision: 1,
            payload: json!({ "primaryColor": primary_color }),
            creator: "user-admin".to_string(),
            owner: scope_key.to_string(),
            instance_id: instance_id.to_string(),
            created_at: chrono::Utc::now(),
            position: Position::new(1, 0),
        }
    }

    #[tokio::test]
    async fn apply_then_read_back_the_projected_row() {
        let projection = InMemoryLabelPolicyProjection::new();
        let mut tx = InMemoryProjectionTransaction;
        projection
            .apply(&mut tx, &set_event("instance-1", "org:org-1", "#222222"))
            .await
            .unwrap();

        let color = projection.primary_color("instance-1", "org:org-1").await.unwrap();
        assert_eq!(color.as_deref(), Some("#222222"));
    }

    #[tokio::test]
    async fn unset_scope_reads_back_none() {
        let projection = InMemoryLabelPolicyProjection::new();
        let color = projection.primary_color("instance-1", "org:org-1").await.unwrap();
        assert!(color.is_none());
    }
}
