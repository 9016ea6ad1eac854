//! Owns the set of registered projections for a deployment, starts and
//! stops their workers, and exposes `catch_up` (spec §4.6).
//!
//! Grounded on the teacher's `projections/src/manager.rs` lifecycle shape
//! (construct with dependencies, `start`/shutdown-channel pair per
//! consumer), re-targeted here from one Kafka consumer group per manager
//! to one owned `JoinHandle` per registered projection, since there is no
//! message bus to hand offset tracking to (spec §1, non-goal iv).

use iam_core::error::Error;
use iam_core::event_store::{EventStore, Filter};
use iam_core::projection::{Projection, ProjectionCheckpointStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::worker::ProjectionWorker;

struct RunningWorker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Registry of projections for one `instance_id` scope. Each registered
/// projection gets its own [`ProjectionWorker`] when started, running
/// independently — a slow or failed projection never blocks another
/// (spec §4.5, "Backpressure and fairness").
pub struct ProjectionRegistry {
    event_store: Arc<dyn EventStore>,
    checkpoints: Arc<dyn ProjectionCheckpointStore>,
    instance_id: String,
    worker_id: String,
    projections: Mutex<HashMap<String, Arc<dyn Projection>>>,
    running: Mutex<HashMap<String, RunningWorker>>,
}

impl ProjectionRegistry {
    /// Build a registry scoped to `instance_id`. `worker_id` identifies
    /// this process for lease ownership across every projection it runs.
    #[must_use]
    pub fn new(
        event_store: Arc<dyn EventStore>,
        checkpoints: Arc<dyn ProjectionCheckpointStore>,
        instance_id: impl Into<String>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            event_store,
            checkpoints,
            instance_id: instance_id.into(),
            worker_id: worker_id.into(),
            projections: Mutex::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
        }
    }

    fn lock_projections(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<dyn Projection>>> {
        self.projections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, HashMap<String, RunningWorker>> {
        self.running
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register a projection. Does not start it — call [`Self::start`]
    /// or [`Self::start_all`].
    pub fn register(&self, projection: Arc<dyn Projection>) {
        self.lock_projections()
            .insert(projection.name().to_string(), projection);
    }

    /// Spawn `name`'s worker. A no-op if it is already running.
    ///
    /// # Errors
    ///
    /// Returns `not_found` if `name` was never registered.
    pub fn start(&self, name: &str) -> Result<(), Error> {
        if self.lock_running().contains_key(name) {
            return Ok(());
        }
        let projection = self
            .lock_projections()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("PROJECTION-Registry1", format!("projection {name} is not registered")))?;

        let worker = ProjectionWorker::new(
            projection,
            Arc::clone(&self.event_store),
            Arc::clone(&self.checkpoints),
            self.instance_id.clone(),
            self.worker_id.clone(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let name_owned = name.to_string();
        let handle = tokio::spawn(async move {
            if let Err(error) = worker.run(shutdown_rx).await {
                tracing::error!(projection = %name_owned, error = %error, "projection worker exited with error");
            }
        });

        self.lock_running().insert(
            name.to_string(),
            RunningWorker {
                shutdown: shutdown_tx,
                handle,
            },
        );
        Ok(())
    }

    /// Start every registered projection.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered starting any projection.
    pub fn start_all(&self) -> Result<(), Error> {
        let names: Vec<String> = self.lock_projections().keys().cloned().collect();
        for name in names {
            self.start(&name)?;
        }
        Ok(())
    }

    /// Signal `name`'s worker to stop and wait for it to drain its
    /// current batch. A no-op if it is not running.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker task panicked.
    pub async fn stop(&self, name: &str) -> Result<(), Error> {
        let worker = self.lock_running().remove(name);
        if let Some(worker) = worker {
            worker.shutdown.send(true).ok();
            worker
                .handle
                .await
                .map_err(|error| Error::internal("PROJECTION-Registry2", error.to_string()))?;
        }
        Ok(())
    }

    /// Stop every running projection.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered stopping any projection.
    pub async fn stop_all(&self) -> Result<(), Error> {
        let names: Vec<String> = self.lock_running().keys().cloned().collect();
        for name in names {
            self.stop(&name).await?;
        }
        Ok(())
    }

    /// Block until every projection in `names` has applied all events up
    /// to the log's current tip, or `timeout` elapses (spec §4.6).
    ///
    /// # Errors
    ///
    /// Returns `unavailable` if `timeout` elapses before every named
    /// projection catches up, or if reading the tip or a checkpoint
    /// fails.
    pub async fn catch_up(&self, names: &[String], timeout: Duration) -> Result<(), Error> {
        let tip = self
            .event_store
            .latest_event(Filter::for_instance(self.instance_id.clone()))
            .await?
            .map_or(iam_core::position::Position::BEFORE_FIRST, |event| event.position);

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let mut caught_up = true;
            for name in names {
                let checkpoint = self.checkpoints.load(name).await?;
                if checkpoint.position < tip {
                    caught_up = false;
                    break;
                }
            }
            if caught_up {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::unavailable(
                    "PROJECTION-CatchUp1",
                    format!("projections {names:?} did not reach tip {tip} within {timeout:?}"),
                ));
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iam_core::event::{Command, Event};
    use iam_core::projection::ProjectionTransaction;
    use iam_testing::{InMemoryEventStore, InMemoryProjectionCheckpointStore};
    use serde_json::json;
    use std::time::Duration as StdDuration;

    struct NoopProjection;

    impl Projection for NoopProjection {
        fn name(&self) -> &str {
            "orgs_by_name"
        }
        fn event_types(&self) -> &[String] {
            &[]
        }
        fn aggregate_types(&self) -> &[String] {
            &[]
        }
        fn polling_interval(&self) -> StdDuration {
            StdDuration::from_millis(5)
        }
        fn batch_size(&self) -> u32 {
            10
        }
        fn apply<'a>(
            &'a self,
            _tx: &'a mut dyn ProjectionTransaction,
            _event: &'a Event,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Error>> + Send + 'a>>
        {
            Box::pin(async move { Ok(()) })
        }
        fn initialize(
            &self,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Error>> + Send + '_>>
        {
            Box::pin(async move { Ok(()) })
        }
    }

    #[tokio::test]
    async fn catch_up_succeeds_once_the_checkpoint_reaches_the_tip() {
        let event_store = Arc::new(InMemoryEventStore::new());
        event_store
            .push(vec![Command::new(
                "org", "org-1", "org.added", 1, json!({"name": "Acme"}),
                "instance-1", "org-1", "user-1",
            )
            .with_expected_version(0)])
            .await
            .unwrap();

        let checkpoints = Arc::new(InMemoryProjectionCheckpointStore::new());
        let registry = ProjectionRegistry::new(
            event_store.clone(),
            checkpoints.clone(),
            "instance-1",
            "worker-a",
        );
        registry.register(Arc::new(NoopProjection));
        registry.start("orgs_by_name").unwrap();

        registry
            .catch_up(&["orgs_by_name".to_string()], StdDuration::from_secs(2))
            .await
            .unwrap();

        registry.stop_all().await.unwrap();
    }

    #[tokio::test]
    async fn catch_up_times_out_when_a_projection_is_never_started() {
        let event_store = Arc::new(InMemoryEventStore::new());
        event_store
            .push(vec![Command::new(
                "org", "org-1", "org.added", 1, json!({"name": "Acme"}),
                "instance-1", "org-1", "user-1",
            )
            .with_expected_version(0)])
            .await
            .unwrap();

        let checkpoints = Arc::new(InMemoryProjectionCheckpointStore::new());
        let registry = ProjectionRegistry::new(event_store, checkpoints, "instance-1", "worker-a");
        registry.register(Arc::new(NoopProjection));

        let err = registry
            .catch_up(&["orgs_by_name".to_string()], StdDuration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.kind, iam_core::error::Kind::Unavailable);
    }

    #[test]
    fn starting_an_unregistered_projection_is_not_found() {
        let event_store = Arc::new(InMemoryEventStore::new());
        let checkpoints = Arc::new(InMemoryProjectionCheckpointStore::new());
        let registry = ProjectionRegistry::new(event_store, checkpoints, "instance-1", "worker-a");
        let err = registry.start("ghost").unwrap_err();
        assert_eq!(err.kind, iam_core::error::Kind::NotFound);
    }
}
