//! The `label_policies` read model: a concrete [`Projection`] plus
//! [`LabelPolicyReader`] over its own table, replacing the event-replay
//! `iam-domain::label_policy::resolve` used before the query layer had a
//! real projection to read (spec §4.7).
//!
//! Grounded on `iam-postgres::checkpoint`'s row-per-key upsert style;
//! `apply` and `primary_color` are this crate's first worked example of a
//! domain-specific projection beyond the generic eventstore tables.

use iam_core::error::Error;
use iam_core::event::Event;
use iam_core::projection::{Projection, ProjectionTransaction};
use iam_query::LabelPolicyReader;
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::event_store::map_db_error;
use crate::transaction::PgProjectionTransaction;

/// `PostgreSQL`-backed projection over `label_policy.set` events, keyed by
/// `(instance_id, scope_key)`.
pub struct LabelPolicyProjection {
    pool: PgPool,
    event_types: Vec<String>,
    aggregate_types: Vec<String>,
}

impl LabelPolicyProjection {
    /// Wrap an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            event_types: vec!["label_policy.set".to_string()],
            aggregate_types: vec!["label_policy".to_string()],
        }
    }
}

impl Projection for LabelPolicyProjection {
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
        Duration::from_millis(200)
    }

    fn batch_size(&self) -> u32 {
        100
    }

    fn apply<'a>(
        &'a self,
        tx: &'a mut dyn ProjectionTransaction,
        event: &'a Event,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            // Unrecognized event types are a no-op (spec §4.5, forward
            // compatibility) even though the worker already filters by
            // `event_types()` — this also covers direct `apply` calls in
            // tests that bypass the filter.
            if event.event_type != "label_policy.set" {
                return Ok(());
            }
            let Some(primary_color) = event.payload.get("primaryColor").and_then(|v| v.as_str()) else {
                return Ok(());
            };

            let pg_tx = tx
                .as_any_mut()
                .downcast_mut::<PgProjectionTransaction>()
                .ok_or_else(|| Error::internal("PROJECTION-LabelPolicy1", "expected a Postgres transaction"))?;

            sqlx::query(
                "INSERT INTO label_policies (instance_id, scope_key, primary_color, updated_at)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (instance_id, scope_key)
                 DO UPDATE SET primary_color = EXCLUDED.primary_color, updated_at = EXCLUDED.updated_at",
            )
            .bind(&event.instance_id)
            .bind(&event.aggregate_id)
            .bind(primary_color)
            .bind(event.created_at)
            .execute(&mut *pg_tx.0)
            .await
            .map_err(map_db_error)?;

            Ok(())
        })
    }

    fn initialize(&self) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        Box::pin(async move {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS label_policies (
                    instance_id TEXT NOT NULL,
                    scope_key TEXT NOT NULL,
                    primary_color TEXT NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL,
                    PRIMARY KEY (instance_id, scope_key)
                 )",
            )
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
            Ok(())
        })
    }
}

impl LabelPolicyReader for LabelPolicyProjection {
    fn primary_color<'a>(
        &'a self,
        instance_id: &'a str,
        scope_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT primary_color FROM label_policies WHERE instance_id = $1 AND scope_key = $2",
            )
            .bind(instance_id)
            .bind(scope_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
            Ok(row.map(|row| row.get::<String, _>("primary_color")))
        })
    }
}
