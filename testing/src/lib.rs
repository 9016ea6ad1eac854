//! # iam-testing
//!
//! Test fixtures for the event-sourced identity/access backend: a fast,
//! deterministic in-memory eventstore and a fixed clock, so write-model,
//! command, and projection tests never need a real Postgres instance.
//!
//! ## Example
//!
//! ```
//! use iam_testing::InMemoryEventStore;
//! use iam_core::event::Command;
//! use iam_core::event_store::EventStore;
//! use serde_json::json;
//!
//! # async fn example() {
//! let store = InMemoryEventStore::new();
//! let command = Command::new(
//!     "org", "org-1", "org.added", 1, json!({"name": "Acme"}),
//!     "instance-1", "org-1", "user-1",
//! ).with_expected_version(0);
//! let events = store.push(vec![command]).await.unwrap();
//! assert_eq!(events[0].aggregate_version, 1);
//! # }
//! ```

use chrono::{DateTime, Utc};
use iam_core::environment::Clock;

pub mod in_memory;
pub mod in_memory_checkpoint;
pub mod in_memory_label_policy;
pub use in_memory::InMemoryEventStore;
pub use in_memory_checkpoint::{InMemoryProjectionCheckpointStore, InMemoryProjectionTransaction};
pub use in_memory_label_policy::InMemoryLabelPolicyProjection;

/// Mock implementations of environment traits, currently just [`Clock`].
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use iam_testing::mocks::FixedClock;
    /// use iam_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};

// Placeholder test module
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }
}
