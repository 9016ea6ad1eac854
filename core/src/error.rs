//! The typed error taxonomy shared by the eventstore, write-models, and
//! the command layer (spec §7).
//!
//! Every constructed error carries a `kind` (maps 1:1 to a wire status at
//! the API boundary, see `iam-web::error`) and a `stable_code` — a short
//! string like `COMMAND-Org1` attached for log correlation, per spec
//! §4.4/§6. This mirrors the teacher's `web/src/error.rs` `AppError`
//! pattern, pushed one layer down so it's available to every crate, not
//! just the HTTP boundary.

use std::fmt;
use thiserror::Error;

/// Language-neutral error kind from spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Structural validation failed (step 1 of the command template).
    InvalidArgument,
    /// An aggregate the command or query required was missing.
    NotFound,
    /// A unique constraint or a re-creation attempt collided.
    AlreadyExists,
    /// A business rule or version check failed.
    FailedPrecondition,
    /// Authorization check failed.
    PermissionDenied,
    /// Storage or another transient dependency is unavailable.
    Unavailable,
    /// A bug or broken invariant.
    Internal,
}

impl Kind {
    /// The caller action this kind recommends, used only for documentation
    /// and log enrichment (never parsed by callers).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::FailedPrecondition => "failed_precondition",
            Self::PermissionDenied => "permission_denied",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed error carrying a [`Kind`] and a stable code for correlation.
///
/// `push`/`query`/command handlers construct these directly rather than
/// propagating a stringly-typed error; `iam-web::error::AppError`
/// converts them to the wire `{code, message, stable_code}` shape at the
/// boundary (spec §7, "user-visible behavior").
#[derive(Debug, Error)]
#[error("[{stable_code}] {message}")]
pub struct Error {
    /// The taxonomy kind.
    pub kind: Kind,
    /// Human-readable message. Never shown as the sole identifier — pair
    /// with `stable_code` for log correlation.
    pub message: String,
    /// Stable code, e.g. `COMMAND-Org1`, attached to every error per spec
    /// §4.4.
    pub stable_code: &'static str,
    /// The underlying cause, if any (not serialized to callers).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Construct an error with no underlying cause.
    #[must_use]
    pub fn new(kind: Kind, stable_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stable_code,
            source: None,
        }
    }

    /// Attach an underlying cause, typically a `sqlx::Error` or similar.
    #[must_use]
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// `invalid_argument` — structural validation failed.
    #[must_use]
    pub fn invalid_argument(stable_code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Kind::InvalidArgument, stable_code, message)
    }

    /// `not_found` — aggregate missing where required.
    #[must_use]
    pub fn not_found(stable_code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Kind::NotFound, stable_code, message)
    }

    /// `already_exists` — unique constraint or re-creation collision.
    #[must_use]
    pub fn already_exists(stable_code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Kind::AlreadyExists, stable_code, message)
    }

    /// `failed_precondition` — business-rule or version-conflict failure.
    #[must_use]
    pub fn failed_precondition(stable_code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Kind::FailedPrecondition, stable_code, message)
    }

    /// `permission_denied` — authorization check failed.
    #[must_use]
    pub fn permission_denied(stable_code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Kind::PermissionDenied, stable_code, message)
    }

    /// `unavailable` — storage or transient dependency failure.
    #[must_use]
    pub fn unavailable(stable_code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Kind::Unavailable, stable_code, message)
    }

    /// `internal` — a bug or broken invariant. Always worth alerting on.
    #[must_use]
    pub fn internal(stable_code: &'static str, message: impl Into<String>) -> Self {
        Self::new(Kind::Internal, stable_code, message)
    }
}

/// Convenience alias used throughout the core and domain crates.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_stable_code_and_message() {
        let err = Error::not_found("COMMAND-Org2", "organization not found");
        assert_eq!(
            err.to_string(),
            "[COMMAND-Org2] organization not found"
        );
    }

    #[test]
    fn kind_as_str_matches_wire_taxonomy() {
        assert_eq!(Kind::FailedPrecondition.as_str(), "failed_precondition");
        assert_eq!(Kind::AlreadyExists.as_str(), "already_exists");
    }
}
