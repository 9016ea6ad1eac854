//! Policy inheritance (spec §4.7): a setting resolves by checking, in
//! order, an org-scoped override, an instance-wide default, and finally a
//! built-in fallback — stopping at the first level that has a row.
//! Resolution is single-shot: each call checks the chain once, front to
//! back, with no retry or merge across levels.

use iam_core::error::Error;
use std::future::Future;

/// Resolve a policy value by checking `org_loader`, then `instance_loader`,
/// falling back to `builtin_default` if neither has an override.
///
/// # Errors
///
/// Returns whatever error either loader returns.
pub async fn resolve_policy<T, FOrg, FutOrg, FInst, FutInst>(
    org_loader: FOrg,
    instance_loader: FInst,
    builtin_default: T,
) -> Result<T, Error>
where
    FOrg: FnOnce() -> FutOrg,
    FutOrg: Future<Output = Result<Option<T>, Error>>,
    FInst: FnOnce() -> FutInst,
    FutInst: Future<Output = Result<Option<T>, Error>>,
{
    if let Some(value) = org_loader().await? {
        return Ok(value);
    }
    if let Some(value) = instance_loader().await? {
        return Ok(value);
    }
    Ok(builtin_default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn org_override_wins_over_instance_and_builtin() {
        let resolved = resolve_policy(
            || async { Ok(Some(30u32)) },
            || async { Ok(Some(60u32)) },
            90u32,
        )
        .await
        .unwrap();
        assert_eq!(resolved, 30);
    }

    #[tokio::test]
    async fn instance_default_wins_when_org_has_no_override() {
        let resolved = resolve_policy(
            || async { Ok(None) },
            || async { Ok(Some(60u32)) },
            90u32,
        )
        .await
        .unwrap();
        assert_eq!(resolved, 60);
    }

    #[tokio::test]
    async fn builtin_default_is_the_final_fallback() {
        let resolved =
            resolve_policy(|| async { Ok(None) }, || async { Ok(None) }, 90u32)
                .await
                .unwrap();
        assert_eq!(resolved, 90);
    }

    #[tokio::test]
    async fn propagates_a_loader_error() {
        let result: Result<u32, Error> = resolve_policy(
            || async { Err(Error::internal("QUERY-Policy1", "db unavailable")) },
            || async { Ok(Some(60u32)) },
            90u32,
        )
        .await;
        assert!(result.is_err());
    }
}
