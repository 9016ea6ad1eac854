//! Reader contract for the label-policy read model (spec §4.7): the
//! dyn-compatible boundary between `iam-domain`'s resolution logic and
//! whatever concrete projection table backs it, mirroring
//! [`crate::resolve_policy`]'s loader-closure shape without committing
//! callers to a particular storage backend.

use iam_core::error::Error;
use std::future::Future;
use std::pin::Pin;

/// Point lookup into a label-policy projection table, keyed by one scope
/// row (`org:<id>` or `instance:<id>`) within `instance_id`.
pub trait LabelPolicyReader: Send + Sync {
    /// The primary color stored for `scope_key`, or `None` if no row has
    /// been projected yet.
    fn primary_color<'a>(
        &'a self,
        instance_id: &'a str,
        scope_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, Error>> + Send + 'a>>;
}
