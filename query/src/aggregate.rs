//! Bounded sub-aggregation (spec §4.7): a composite read — a page of
//! parent rows plus each parent's child rows — must stay at a fixed,
//! small number of round trips regardless of how many parents the page
//! holds. `load_children` is the one place that number is spent: one
//! batched `WHERE parent_id = ANY(...)` query, never one query per parent.

use iam_core::error::Error;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

/// Load child rows for every id in `parent_ids` through a single call to
/// `load_batch`, then group them by parent id. `load_batch` is expected to
/// issue one `WHERE parent_id = ANY($1)`-shaped query — not loop over
/// `parent_ids` itself.
///
/// # Errors
///
/// Returns whatever error `load_batch` returns.
pub async fn load_children<Id, Child, F, Fut>(
    parent_ids: &[Id],
    load_batch: F,
) -> Result<HashMap<Id, Vec<Child>>, Error>
where
    Id: Clone + Eq + Hash,
    F: FnOnce(&[Id]) -> Fut,
    Fut: Future<Output = Result<Vec<(Id, Child)>, Error>>,
{
    let mut grouped: HashMap<Id, Vec<Child>> = HashMap::new();
    if parent_ids.is_empty() {
        return Ok(grouped);
    }

    for (parent_id, child) in load_batch(parent_ids).await? {
        grouped.entry(parent_id).or_default().push(child);
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn groups_children_by_parent_without_per_parent_calls() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let parent_ids = vec!["org-1".to_string(), "org-2".to_string()];

        let grouped = load_children(&parent_ids, |ids| {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let ids = ids.to_vec();
            async move {
                Ok(ids
                    .into_iter()
                    .flat_map(|id| vec![(id.clone(), "member-a".to_string()), (id, "member-b".to_string())])
                    .collect())
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(grouped["org-1"].len(), 2);
        assert_eq!(grouped["org-2"].len(), 2);
    }

    #[tokio::test]
    async fn skips_the_batch_call_entirely_when_there_are_no_parents() {
        let grouped = load_children::<String, String, _, _>(&[], |_| async { Ok(vec![]) })
            .await
            .unwrap();
        assert!(grouped.is_empty());
    }
}
