//! Drives a single [`Projection`] through the operation loop spec §4.5
//! describes: acquire lease, fetch batch, apply, advance checkpoint,
//! sleep-or-wake, repeat.

use iam_core::error::Error;
use iam_core::event_store::{EventStore, Filter};
use iam_core::projection::{Projection, ProjectionCheckpointStore, ProjectionStatus, ProjectionTransaction};
use iam_runtime::metrics::ProjectionMetrics;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Consecutive reducer failures at the same position before a worker
/// marks its checkpoint `failed` and stops retrying on its own (spec
/// §4.5, "Failure semantics"). Not specified numerically by the spec;
/// chosen to tolerate a handful of transient failures (a restarted
/// dependency, a brief lock contention) without masking a genuinely
/// poisoned event for long.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Runs one [`Projection`] against the shared event log, owning its own
/// lease/fetch/apply/advance loop. Constructed and supervised by
/// [`crate::ProjectionRegistry`]; tests may drive one directly.
pub struct ProjectionWorker {
    projection: Arc<dyn Projection>,
    event_store: Arc<dyn EventStore>,
    checkpoints: Arc<dyn ProjectionCheckpointStore>,
    instance_id: String,
    worker_id: String,
    max_retries: u32,
}

impl ProjectionWorker {
    /// Build a worker for `projection`, scoped to `instance_id` (the
    /// eventstore's tenant scope — every [`Filter`] this worker builds is
    /// `Filter::for_instance(instance_id)` narrowed by the projection's
    /// own event/aggregate types). `worker_id` identifies this process
    /// instance for lease ownership and log correlation.
    #[must_use]
    pub fn new(
        projection: Arc<dyn Projection>,
        event_store: Arc<dyn EventStore>,
        checkpoints: Arc<dyn ProjectionCheckpointStore>,
        instance_id: impl Into<String>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            projection,
            event_store,
            checkpoints,
            instance_id: instance_id.into(),
            worker_id: worker_id.into(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Override [`DEFAULT_MAX_RETRIES`].
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn filter(&self) -> Filter {
        Filter::for_instance(self.instance_id.clone())
            .with_event_types(self.projection.event_types().iter().cloned())
            .with_aggregate_types(self.projection.aggregate_types().iter().cloned())
    }

    /// Run until `shutdown` carries `true`. Initializes the projection's
    /// tables first; an initializer failure moves the checkpoint straight
    /// to `Failed` and returns the error without entering the loop (spec
    /// §4.5, "Lifecycle states").
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails, or if the retry budget
    /// for a poison event is exhausted.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), Error> {
        let name = self.projection.name().to_string();

        self.checkpoints.set_status(&name, ProjectionStatus::Starting).await?;
        if let Err(error) = self.projection.initialize().await {
            self.checkpoints
                .set_status(&name, ProjectionStatus::Failed)
                .await
                .ok();
            return Err(error);
        }

        let lease_duration = self.projection.polling_interval() * 5;
        let mut notifications = self.event_store.subscribe(self.filter());

        tracing::info!(projection = %name, "projection worker starting");

        while !*shutdown.borrow() {
            let acquired = self
                .checkpoints
                .acquire_lease(&name, &self.worker_id, lease_duration)
                .await?;
            if !acquired {
                self.wait_for_tick(&mut notifications, &mut shutdown).await;
                continue;
            }

            match self.drain_once(&name).await {
                Ok(batch_was_full) => {
                    if batch_was_full {
                        // More work is very likely waiting; loop without sleeping.
                        continue;
                    }
                }
                Err(error) => {
                    ProjectionMetrics::record_failure();
                    let retries = self
                        .checkpoints
                        .record_failure(&name, &error.to_string())
                        .await
                        .unwrap_or(u32::MAX);
                    tracing::error!(
                        projection = %name,
                        error = %error,
                        retries,
                        "projection batch failed"
                    );
                    if retries >= self.max_retries {
                        self.checkpoints
                            .set_status(&name, ProjectionStatus::Failed)
                            .await
                            .ok();
                        return Err(error);
                    }
                }
            }

            self.wait_for_tick(&mut notifications, &mut shutdown).await;
        }

        self.checkpoints
            .set_status(&name, ProjectionStatus::Stopped)
            .await
            .ok();
        tracing::info!(projection = %name, "projection worker stopped");
        Ok(())
    }

    /// Sleep until the next poll tick, a subscription notification, or a
    /// shutdown signal — whichever comes first. A lagged/dropped
    /// notification is never a correctness bug: the poll that follows is
    /// always the source of truth (spec §4.2, §9).
    async fn wait_for_tick(
        &self,
        notifications: &mut tokio::sync::broadcast::Receiver<iam_core::event_store::Notification>,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        tokio::select! {
            () = tokio::time::sleep(self.projection.polling_interval()) => {}
            _ = notifications.recv() => {}
            _ = shutdown.changed() => {}
        }
    }

    /// Steps 2–4 of the operation loop for one lease period: fetch a
    /// batch, apply each event in order, advance the checkpoint. Returns
    /// whether the batch was full (a signal there is more to drain
    /// immediately, spec §4.5 step 5).
    async fn drain_once(&self, name: &str) -> Result<bool, Error> {
        let checkpoint = self.checkpoints.load(name).await?;
        let batch_size = self.projection.batch_size();

        let events = self
            .event_store
            .events_after_position(self.filter(), checkpoint.position, batch_size)
            .await?;
        if events.is_empty() {
            return Ok(false);
        }

        let mut tx = self.checkpoints.begin_transaction().await?;
        let started = Instant::now();
        for event in &events {
            self.projection.apply(tx.as_mut(), event).await?;
        }
        ProjectionMetrics::record_applied(events.len(), started.elapsed());

        #[allow(clippy::expect_used)]
        let last_position = events.last().expect("checked non-empty above").position;
        let lease_duration = self.projection.polling_interval() * 5;
        self.checkpoints
            .advance(tx, name, &self.worker_id, last_position, lease_duration)
            .await?;

        Ok(u32::try_from(events.len()).is_ok_and(|len| len == batch_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iam_core::event::{Command, Event};
    use iam_core::position::Position;
    use iam_testing::{InMemoryEventStore, InMemoryProjectionCheckpointStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingProjection {
        fail_until: AtomicUsize,
    }

    impl CountingProjection {
        fn new() -> Self {
            Self {
                fail_until: AtomicUsize::new(0),
            }
        }

        fn failing(times: usize) -> Self {
            Self {
                fail_until: AtomicUsize::new(times),
            }
        }
    }

    impl Projection for CountingProjection {
        fn name(&self) -> &str {
            "orgs_by_name"
        }

        fn event_types(&self) -> &[String] {
            &[]
        }

        fn aggregate_types(&self) -> &[String] {
            &[]
        }

        fn polling_interval(&self) -> Duration {
            Duration::from_millis(10)
        }

        fn batch_size(&self) -> u32 {
            2
        }

        fn apply<'a>(
            &'a self,
            _tx: &'a mut dyn ProjectionTransaction,
            _event: &'a Event,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Error>> + Send + 'a>>
        {
            Box::pin(async move {
                if self.fail_until.load(Ordering::SeqCst) > 0 {
                    self.fail_until.fetch_sub(1, Ordering::SeqCst);
                    return Err(Error::internal("PROJECTION-Test1", "synthetic failure"));
                }
                Ok(())
            })
        }

        fn initialize(
            &self,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Error>> + Send + '_>>
        {
            Box::pin(async move { Ok(()) })
        }
    }

    fn add_org_command(org_id: &str) -> Command {
        Command::new(
            "org",
            org_id,
            "org.added",
            1,
            json!({"name": "Acme"}),
            "instance-1",
            org_id,
            "user-1",
        )
        .with_expected_version(0)
    }

    #[tokio::test]
    async fn drains_all_events_and_advances_checkpoint() {
        let event_store = Arc::new(InMemoryEventStore::new());
        for i in 0..5 {
            event_store
                .push(vec![add_org_command(&format!("org-{i}"))])
                .await
                .unwrap();
        }
        let checkpoints = Arc::new(InMemoryProjectionCheckpointStore::new());
        let projection: Arc<dyn Projection> = Arc::new(CountingProjection::new());
        let worker = ProjectionWorker::new(
            projection,
            event_store.clone(),
            checkpoints.clone(),
            "instance-1",
            "worker-a",
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).ok();
        handle.await.unwrap().unwrap();

        let checkpoint = checkpoints.load("orgs_by_name").await.unwrap();
        assert_eq!(checkpoint.position, Position::new(5, 0));
    }

    #[tokio::test]
    async fn failure_is_retried_then_resolved() {
        let event_store = Arc::new(InMemoryEventStore::new());
        event_store.push(vec![add_org_command("org-1")]).await.unwrap();

        let checkpoints = Arc::new(InMemoryProjectionCheckpointStore::new());
        let projection: Arc<dyn Projection> = Arc::new(CountingProjection::failing(2));
        let worker = ProjectionWorker::new(
            projection,
            event_store,
            checkpoints.clone(),
            "instance-1",
            "worker-a",
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).ok();
        handle.await.unwrap().unwrap();

        let checkpoint = checkpoints.load("orgs_by_name").await.unwrap();
        assert_eq!(checkpoint.position, Position::new(1, 0));
        assert_eq!(checkpoint.retry_count, 0);
    }

    #[tokio::test]
    async fn exhausted_retry_budget_marks_checkpoint_failed() {
        let event_store = Arc::new(InMemoryEventStore::new());
        event_store.push(vec![add_org_command("org-1")]).await.unwrap();

        let checkpoints = Arc::new(InMemoryProjectionCheckpointStore::new());
        let projection: Arc<dyn Projection> = Arc::new(CountingProjection::failing(100));
        let worker = ProjectionWorker::new(
            projection,
            event_store,
            checkpoints.clone(),
            "instance-1",
            "worker-a",
        )
        .with_max_retries(2);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let result = worker.run(shutdown_rx).await;
        assert!(result.is_err());

        let checkpoint = checkpoints.load("orgs_by_name").await.unwrap();
        assert_eq!(checkpoint.status, ProjectionStatus::Failed);
    }
}
