//! The eventstore's global per-instance cursor.
//!
//! Spec §3: `position = (pos, in_tx_order)` is a lexicographic global
//! cursor — `pos` is a commit sequence (monotonic per instance) and
//! `in_tx_order` disambiguates events committed together in the same
//! `push`. `Ord` is derived field-order, which gives exactly the
//! lexicographic comparison the spec requires.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A strictly-increasing, per-instance, lexicographic cursor over the
/// event log.
///
/// # Examples
///
/// ```
/// use iam_core::position::Position;
///
/// let a = Position::new(10, 0);
/// let b = Position::new(10, 1);
/// let c = Position::new(11, 0);
/// assert!(a < b);
/// assert!(b < c);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Commit sequence, monotonic per `instance_id`.
    pub pos: i64,
    /// Disambiguates events committed together in the same `push` batch.
    pub in_tx_order: i32,
}

impl Position {
    /// The position before any event has ever been committed.
    pub const BEFORE_FIRST: Self = Self {
        pos: 0,
        in_tx_order: 0,
    };

    /// Construct a position.
    #[must_use]
    pub const fn new(pos: i64, in_tx_order: i32) -> Self {
        Self { pos, in_tx_order }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.pos, self.in_tx_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_lexicographic() {
        assert!(Position::new(1, 5) < Position::new(2, 0));
        assert!(Position::new(5, 0) < Position::new(5, 1));
        assert_eq!(Position::new(5, 1), Position::new(5, 1));
    }

    #[test]
    fn before_first_is_the_minimum() {
        assert!(Position::BEFORE_FIRST < Position::new(1, 0));
    }

    #[test]
    fn display_format() {
        assert_eq!(Position::new(42, 3).to_string(), "42.3");
    }
}
