//! # `iam-projections`
//!
//! The projection engine (spec §4.5/§4.6, components C5/C6): a worker
//! that drives a single [`iam_core::projection::Projection`] through its
//! lease/fetch/apply/advance loop, and a registry that owns the set of
//! workers for a deployment and exposes the `catch_up` primitive tests and
//! operators use to wait for a projection to reach the current tip.
//!
//! Grounded on the teacher's `projections/src/manager.rs`
//! `ProjectionManager` lifecycle (load checkpoint, subscribe, process,
//! shut down on signal), re-targeted from Kafka consumer groups to the
//! poll-plus-best-effort-notification model this eventstore uses instead
//! of a message bus (spec §4.2, §4.5). See `DESIGN.md` for the grounding
//! ledger.

pub mod registry;
pub mod worker;

pub use registry::ProjectionRegistry;
pub use worker::ProjectionWorker;
