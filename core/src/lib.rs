//! # iam-core
//!
//! Shared contracts for the event-sourced identity/access backend: the
//! eventstore trait, the write-model framework, the command template's
//! supporting types, projection trait contracts, the error taxonomy, and
//! ID generation.
//!
//! ## Core concepts
//!
//! - **Event**: an immutable fact, already positioned in the log
//!   ([`event::Event`]).
//! - **Command**: a write intent, not yet appended ([`event::Command`]).
//! - **`EventStore`**: the append-only log every write-model, command,
//!   and projection reads and writes through ([`event_store::EventStore`]).
//! - **`WriteModel`**: a pure reduction of an aggregate's events, used by
//!   the command layer to check business invariants
//!   ([`write_model::WriteModel`]).
//! - **Projection**: a named, idempotent consumer of the log that
//!   maintains read-model tables ([`projection::Projection`]).
//!
//! ## Architecture principles
//!
//! - All truth lives in the log; no shared mutable in-memory state is
//!   authoritative (spec §5).
//! - Write-models are pure functions of their event stream.
//! - Projections are eventually consistent, idempotent, and rebuildable.
//! - Every error carries a stable code for log correlation (spec §7).
//!
//! ## Example
//!
//! ```
//! use iam_core::event::Command;
//! use serde_json::json;
//!
//! let command = Command::new(
//!     "org",
//!     "org-1",
//!     "org.added",
//!     1,
//!     json!({"name": "Acme Corp"}),
//!     "instance-1",
//!     "org-1",
//!     "user-1",
//! )
//! .with_expected_version(0);
//!
//! assert_eq!(command.event_type, "org.added");
//! ```

pub mod command;
pub mod config;
pub mod environment;
pub mod error;
pub mod event;
pub mod event_store;
pub mod ids;
pub mod position;
pub mod projection;
pub mod unique_constraint;
pub mod write_model;
