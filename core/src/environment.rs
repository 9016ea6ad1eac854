//! Ambient collaborators injected into commands and projection workers.
//!
//! Kept deliberately small: the spec's "global singletons" design note
//! (§9) says the eventstore client, the ID generator, and the projection
//! registry are process-scoped collaborators passed explicitly, never
//! hidden globals. `Clock` is the one cross-cutting dependency worth a
//! trait, since every command and projection tick timestamps its work and
//! tests need a deterministic substitute.

use chrono::{DateTime, Utc};

/// Abstracts time so commands and projection workers are deterministically
/// testable.
///
/// # Examples
///
/// ```
/// use iam_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let _now = clock.now();
/// ```
pub trait Clock: Send + Sync {
    /// Get the current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
