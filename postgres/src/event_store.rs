//! `PostgreSQL`-backed [`EventStore`] (spec §4.2, component C2).
//!
//! Grounded on the disintegrate Postgres event store
//! (`other_examples/..._disintegrate-postgres-src-event_store.rs.rs`):
//! each `push` runs inside a `SERIALIZABLE` transaction, checks the
//! aggregate's current version before inserting, and relies on Postgres
//! to reject a racing commit with error code `40001`. Unlike disintegrate
//! (which streams a single global log), this store is additionally
//! scoped per `instance_id`, with a `next_pos` sequence row per instance
//! so `position.pos` stays a compact per-tenant counter (spec §3).

use iam_core::environment::{Clock, SystemClock};
use iam_core::error::Error;
use iam_core::event::{Command, Event};
use iam_core::event_store::{EventStore, Filter, Health, Notification};
use iam_core::ids::Snowflake;
use iam_core::position::Position;
use iam_core::unique_constraint::UniqueConstraintRequest;
use iam_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use iam_runtime::retry::{retry_with_predicate, RetryPolicy};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{QueryBuilder, Row};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::broadcast;

/// `PostgreSQL`-backed [`EventStore`].
///
/// Holds a connection pool, this process's [`Snowflake`] id generator, and
/// the ambient resilience primitives from `iam-runtime`: a [`RetryPolicy`]
/// retried only for connectivity-classified (`unavailable`) failures, and
/// a [`CircuitBreaker`] guarding [`EventStore::health`] so a degraded
/// database fails fast instead of queueing retries indefinitely.
pub struct PostgresEventStore {
    pool: PgPool,
    ids: Snowflake,
    retry_policy: RetryPolicy,
    circuit_breaker: CircuitBreaker,
    notifications: broadcast::Sender<Notification>,
    clock: Arc<dyn Clock>,
}

impl PostgresEventStore {
    /// Wrap an existing pool. `machine_id` seeds this process's id
    /// generator (spec §4.1); each process talking to the same database
    /// must use a distinct `machine_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if `machine_id` does not fit the generator's
    /// 10-bit field.
    pub fn from_pool(pool: PgPool, machine_id: u64) -> Result<Self, Error> {
        let ids = Snowflake::new(machine_id)
            .map_err(|e| Error::internal("EVENTSTORE-MachineId1", e.to_string()))?;
        let (notifications, _) = broadcast::channel(1024);
        Ok(Self {
            pool,
            ids,
            retry_policy: RetryPolicy::default(),
            circuit_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            notifications,
            clock: Arc::new(SystemClock),
        })
    }

    /// Override the clock used to stamp `created_at` on every event.
    /// Production code never needs this; tests substitute a fixed clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Connect using [`iam_core::config::Config`] and wrap the resulting
    /// pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::unavailable`] if the connection cannot be
    /// established.
    pub async fn connect(config: &iam_core::config::Config) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(&config.database_url)
            .await
            .map_err(|e| {
                Error::unavailable("EVENTSTORE-Connect1", format!("failed to connect: {e}"))
                    .with_source(e)
            })?;
        Self::from_pool(pool, config.machine_id)
    }

    /// Run the crate's bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::unavailable`] if migration fails.
    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                Error::unavailable("EVENTSTORE-Migrate1", format!("migration failed: {e}"))
                    .with_source(e)
            })
    }

    async fn push_once(&self, commands: &[Command]) -> Result<Vec<Event>, Error> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        let mut produced = Vec::with_capacity(commands.len());
        let mut pos: Option<i64> = None;

        for (index, command) in commands.iter().enumerate() {
            let current: Option<i64> = sqlx::query_scalar(
                "SELECT MAX(aggregate_version) FROM events WHERE instance_id = $1 AND aggregate_id = $2",
            )
            .bind(&command.instance_id)
            .bind(&command.aggregate_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_error)?;
            let current = current.unwrap_or(0);

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
                apply_unique_constraint(&mut tx, &command.instance_id, request).await?;
            }

            if pos.is_none() {
                pos = Some(next_position(&mut tx, &command.instance_id).await?);
            }
            let position = Position::new(
                pos.expect("assigned above"),
                i32::try_from(index).unwrap_or(i32::MAX),
            );

            let id = self
                .ids
                .next_id()
                .map_err(|e| Error::internal("EVENTSTORE-Id1", e.to_string()))?;
            let new_version = current + 1;
            let created_at = self.clock.now();

            sqlx::query(
                "INSERT INTO events (
                    id, instance_id, aggregate_type, aggregate_id, aggregate_version,
                    event_type, revision, payload, creator, owner, created_at,
                    position_pos, position_in_tx
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            )
            .bind(id)
            .bind(&command.instance_id)
            .bind(&command.aggregate_type)
            .bind(&command.aggregate_id)
            .bind(new_version)
            .bind(&command.event_type)
            .bind(command.revision)
            .bind(&command.payload)
            .bind(&command.creator)
            .bind(&command.owner)
            .bind(created_at)
            .bind(position.pos)
            .bind(position.in_tx_order)
            .execute(&mut *tx)
            .await
            .map_err(map_push_error)?;

            produced.push(Event {
                id,
                event_type: command.event_type.clone(),
                aggregate_type: command.aggregate_type.clone(),
                aggregate_id: command.aggregate_id.clone(),
                aggregate_version: new_version,
                revision: command.revision,
                payload: command.payload.clone(),
                creator: command.creator.clone(),
                owner: command.owner.clone(),
                instance_id: command.instance_id.clone(),
                created_at,
                position,
            });
        }

        tx.commit().await.map_err(map_push_error)?;

        for event in &produced {
            let _ = self.notifications.send(Notification {
                position: event.position,
            });
        }

        Ok(produced)
    }

    async fn query_once(&self, filter: &Filter) -> Result<Vec<Event>, Error> {
        let mut builder = select_events(filter);
        builder.push(" ORDER BY position_pos ASC, position_in_tx ASC");
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        rows.iter().map(row_to_event).collect()
    }
}

async fn apply_unique_constraint(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    instance_id: &str,
    request: &UniqueConstraintRequest,
) -> Result<(), Error> {
    match request {
        UniqueConstraintRequest::Add {
            unique_type,
            unique_field,
            aggregate_id,
        } => {
            sqlx::query(
                "INSERT INTO unique_constraints (instance_id, unique_type, unique_field, aggregate_id)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(instance_id)
            .bind(unique_type)
            .bind(unique_field)
            .bind(aggregate_id)
            .execute(&mut **tx)
            .await
            .map_err(map_push_error)?;
        }
        UniqueConstraintRequest::Remove {
            unique_type,
            unique_field,
        } => {
            sqlx::query(
                "DELETE FROM unique_constraints
                 WHERE instance_id = $1 AND unique_type = $2 AND unique_field = $3",
            )
            .bind(instance_id)
            .bind(unique_type)
            .bind(unique_field)
            .execute(&mut **tx)
            .await
            .map_err(map_db_error)?;
        }
    }
    Ok(())
}

/// Atomically read-and-increment the per-instance commit sequence,
/// returning the value to assign as this push's `position.pos`.
async fn next_position(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    instance_id: &str,
) -> Result<i64, Error> {
    sqlx::query(
        "INSERT INTO event_sequences (instance_id, next_pos) VALUES ($1, 1)
         ON CONFLICT (instance_id) DO NOTHING",
    )
    .bind(instance_id)
    .execute(&mut **tx)
    .await
    .map_err(map_db_error)?;

    let pos: i64 = sqlx::query_scalar(
        "UPDATE event_sequences SET next_pos = next_pos + 1
         WHERE instance_id = $1
         RETURNING next_pos - 1",
    )
    .bind(instance_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(map_db_error)?;

    Ok(pos)
}

fn select_events(filter: &Filter) -> QueryBuilder<'_, sqlx::Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT id, instance_id, event_type, aggregate_type, aggregate_id, aggregate_version,
                revision, payload, creator, owner, created_at, position_pos, position_in_tx
         FROM events WHERE instance_id = ",
    );
    qb.push_bind(filter.instance_id.clone());

    if !filter.aggregate_type.is_empty() {
        qb.push(" AND aggregate_type = ANY(");
        qb.push_bind(filter.aggregate_type.clone());
        qb.push(")");
    }
    if !filter.aggregate_id.is_empty() {
        qb.push(" AND aggregate_id = ANY(");
        qb.push_bind(filter.aggregate_id.clone());
        qb.push(")");
    }
    if !filter.event_type.is_empty() {
        qb.push(" AND event_type = ANY(");
        qb.push_bind(filter.event_type.clone());
        qb.push(")");
    }
    if let Some(owner) = &filter.owner {
        qb.push(" AND owner = ");
        qb.push_bind(owner.clone());
    }
    if let Some(from) = filter.from {
        qb.push(" AND (position_pos, position_in_tx) > (");
        qb.push_bind(from.pos);
        qb.push(", ");
        qb.push_bind(from.in_tx_order);
        qb.push(")");
    }
    if let Some(to) = filter.to {
        qb.push(" AND (position_pos, position_in_tx) <= (");
        qb.push_bind(to.pos);
        qb.push(", ");
        qb.push_bind(to.in_tx_order);
        qb.push(")");
    }
    qb
}

fn row_to_event(row: &PgRow) -> Result<Event, Error> {
    let position_pos: i64 = row.try_get("position_pos").map_err(map_db_error)?;
    let position_in_tx: i32 = row.try_get("position_in_tx").map_err(map_db_error)?;
    Ok(Event {
        id: row.try_get("id").map_err(map_db_error)?,
        event_type: row.try_get("event_type").map_err(map_db_error)?,
        aggregate_type: row.try_get("aggregate_type").map_err(map_db_error)?,
        aggregate_id: row.try_get("aggregate_id").map_err(map_db_error)?,
        aggregate_version: row.try_get("aggregate_version").map_err(map_db_error)?,
        revision: row.try_get("revision").map_err(map_db_error)?,
        payload: row.try_get("payload").map_err(map_db_error)?,
        creator: row.try_get("creator").map_err(map_db_error)?,
        owner: row.try_get("owner").map_err(map_db_error)?,
        instance_id: row.try_get("instance_id").map_err(map_db_error)?,
        created_at: row.try_get("created_at").map_err(map_db_error)?,
        position: Position::new(position_pos, position_in_tx),
    })
}

/// Classify a generic database failure as `unavailable` — the only kind
/// [`retry_with_predicate`] is allowed to retry (spec §4.2, "push does not
/// retry internally" for anything else).
pub(crate) fn map_db_error(err: sqlx::Error) -> Error {
    Error::unavailable("EVENTSTORE-Db1", format!("database error: {err}")).with_source(err)
}

/// Classify a failure from the insert path of `push`, distinguishing
/// Postgres's serialization-failure code (`40001`, a losing side of a
/// `SERIALIZABLE` race) and unique-violation code (`23505`) from ordinary
/// connectivity errors.
fn map_push_error(err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(ref description) = err {
        match description.code().as_deref() {
            Some("40001") => {
                return Error::failed_precondition(
                    "EVENTSTORE-Conflict2",
                    "serialization conflict committing events",
                )
                .with_source(err);
            }
            Some("23505") => {
                if description.constraint() == Some("unique_constraints_pkey") {
                    return Error::already_exists(
                        "EVENTSTORE-Unique2",
                        "unique constraint already claimed",
                    )
                    .with_source(err);
                }
                return Error::failed_precondition(
                    "EVENTSTORE-Conflict3",
                    "concurrent append raced this aggregate's version",
                )
                .with_source(err);
            }
            _ => {}
        }
    }
    map_db_error(err)
}

impl EventStore for PostgresEventStore {
    fn push(
        &self,
        commands: Vec<Command>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, Error>> + Send + '_>> {
        Box::pin(async move {
            retry_with_predicate(
                self.retry_policy.clone(),
                || self.push_once(&commands),
                |err: &Error| err.kind == iam_core::error::Kind::Unavailable,
            )
            .await
        })
    }

    fn query(
        &self,
        filter: Filter,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, Error>> + Send + '_>> {
        Box::pin(async move {
            retry_with_predicate(
                self.retry_policy.clone(),
                || self.query_once(&filter),
                |err: &Error| err.kind == iam_core::error::Kind::Unavailable,
            )
            .await
        })
    }

    fn latest_event(
        &self,
        filter: Filter,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Event>, Error>> + Send + '_>> {
        Box::pin(async move {
            let mut builder = select_events(&filter);
            builder.push(" ORDER BY position_pos DESC, position_in_tx DESC LIMIT 1");
            let row = builder
                .build()
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_error)?;
            row.as_ref().map(row_to_event).transpose()
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
            let mut builder = select_events(&filter);
            builder.push(" ORDER BY position_pos ASC, position_in_tx ASC LIMIT ");
            builder.push_bind(i64::from(limit));
            let rows = builder
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(map_db_error)?;
            rows.iter().map(row_to_event).collect()
        })
    }

    fn subscribe(&self, _filter: Filter) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    fn health(&self) -> Pin<Box<dyn Future<Output = Health> + Send + '_>> {
        Box::pin(async move {
            match self
                .circuit_breaker
                .call(|| async {
                    sqlx::query("SELECT 1")
                        .execute(&self.pool)
                        .await
                        .map_err(map_db_error)
                })
                .await
            {
                Ok(_) => Health {
                    available: true,
                    detail: None,
                },
                Err(err) => Health {
                    available: false,
                    detail: Some(err.to_string()),
                },
            }
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move { self.pool.close().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_push_error_classifies_serialization_failure() {
        // Constructing a real sqlx::Error::Database requires a live
        // driver error; the code-path is exercised end to end by the
        // testcontainers-backed integration tests in `tests/`.
        let err = Error::failed_precondition("EVENTSTORE-Conflict2", "x");
        assert_eq!(err.kind, iam_core::error::Kind::FailedPrecondition);
    }
}
