//! A fast, deterministic, in-process [`ProjectionCheckpointStore`], the
//! checkpoint-store counterpart to [`crate::InMemoryEventStore`] — used by
//! `iam-projections`' worker/registry tests instead of standing up
//! Postgres.

use iam_core::error::Error;
use iam_core::position::Position;
use iam_core::projection::{Checkpoint, ProjectionCheckpointStore, ProjectionStatus, ProjectionTransaction};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

/// No-op [`ProjectionTransaction`] for [`InMemoryProjectionCheckpointStore`]
/// — there is no real transaction to share, only a handle to satisfy the
/// trait so in-memory `Projection` test doubles apply through the same
/// interface as a Postgres-backed one.
pub struct InMemoryProjectionTransaction;

impl ProjectionTransaction for InMemoryProjectionTransaction {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// In-memory [`ProjectionCheckpointStore`] backed by a single mutex-guarded
/// map. Not for production use — no durability across restarts.
#[derive(Default)]
pub struct InMemoryProjectionCheckpointStore {
    rows: Mutex<HashMap<String, Checkpoint>>,
}

impl InMemoryProjectionCheckpointStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Checkpoint>> {
        self.rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn blank(name: &str) -> Checkpoint {
    Checkpoint {
        name: name.to_string(),
        position: Position::BEFORE_FIRST,
        status: ProjectionStatus::Stopped,
        lease_owner: None,
        lease_expires_at: None,
        retry_count: 0,
        last_error: None,
    }
}

impl ProjectionCheckpointStore for InMemoryProjectionCheckpointStore {
    fn load(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Checkpoint, Error>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            let mut rows = self.lock();
            Ok(rows.entry(name.clone()).or_insert_with(|| blank(&name)).clone())
        })
    }

    fn acquire_lease(
        &self,
        name: &str,
        worker_id: &str,
        lease_duration: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<bool, Error>> + Send + '_>> {
        let name = name.to_string();
        let worker_id = worker_id.to_string();
        Box::pin(async move {
            let mut rows = self.lock();
            let row = rows.entry(name.clone()).or_insert_with(|| blank(&name));
            let now = chrono::Utc::now();
            // A worker renewing its own still-live lease also counts as a
            // successful acquisition — see iam-postgres's checkpoint store
            // for why.
            let expired = row.lease_expires_at.is_none_or(|expiry| expiry < now)
                || row.lease_owner.as_deref() == Some(worker_id.as_str());
            if !expired {
                return Ok(false);
            }
            row.lease_owner = Some(worker_id);
            row.lease_expires_at = Some(
                now + chrono::Duration::from_std(lease_duration).unwrap_or(chrono::Duration::zero()),
            );
            row.status = ProjectionStatus::Running;
            Ok(true)
        })
    }

    fn begin_transaction(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn ProjectionTransaction>, Error>> + Send + '_>> {
        Box::pin(async move { Ok(Box::new(InMemoryProjectionTransaction) as Box<dyn ProjectionTransaction>) })
    }

    fn advance(
        &self,
        _tx: Box<dyn ProjectionTransaction>,
        name: &str,
        worker_id: &str,
        position: Position,
        lease_duration: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        let name = name.to_string();
        let worker_id = worker_id.to_string();
        Box::pin(async move {
            let mut rows = self.lock();
            let row = rows.entry(name.clone()).or_insert_with(|| blank(&name));
            row.position = position;
            row.lease_owner = Some(worker_id);
            row.lease_expires_at = Some(
                chrono::Utc::now()
                    + chrono::Duration::from_std(lease_duration).unwrap_or(chrono::Duration::zero()),
            );
            row.retry_count = 0;
            row.last_error = None;
            row.status = ProjectionStatus::Running;
            Ok(())
        })
    }

    fn record_failure(
        &self,
        name: &str,
        error: &str,
    ) -> Pin<Box<dyn Future<Output = Result<u32, Error>> + Send + '_>> {
        let name = name.to_string();
        let error = error.to_string();
        Box::pin(async move {
            let mut rows = self.lock();
            let row = rows.entry(name.clone()).or_insert_with(|| blank(&name));
            row.retry_count += 1;
            row.last_error = Some(error);
            Ok(row.retry_count)
        })
    }

    fn set_status(
        &self,
        name: &str,
        status: ProjectionStatus,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            let mut rows = self.lock();
            rows.entry(name.clone()).or_insert_with(|| blank(&name)).status = status;
            Ok(())
        })
    }
}
