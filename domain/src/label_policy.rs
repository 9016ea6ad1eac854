//! Label policy: branding settings (currently just a primary color) that
//! resolve through the org → instance-default → built-in chain (spec
//! §4.7, §8 seed scenario 4). The command side is a single `set` event
//! per scope; the read side is a worked example of
//! [`iam_query::resolve_policy`].

use iam_core::command::{check_permission, object_details_from_last_event, CommandContext, ObjectDetails};
use iam_core::error::Error;
use iam_core::event::{Command, Event};
use iam_core::event_store::EventStore;
use iam_core::write_model::{self, WriteModel};
use iam_query::LabelPolicyReader;
use serde_json::json;

/// Aggregate type string used throughout commands/events/filters.
pub const AGGREGATE_TYPE: &str = "label_policy";

/// The built-in fallback when neither an org nor an instance-default row
/// exists yet. Not specified numerically by the spec; chosen as a neutral
/// brand color.
pub const BUILTIN_PRIMARY_COLOR: &str = "#4A90D9";

fn org_scoped_id(org_id: &str) -> String {
    format!("org:{org_id}")
}

fn instance_default_id(instance_id: &str) -> String {
    format!("instance:{instance_id}")
}

#[derive(Default, Debug)]
struct LabelPolicyModel {
    primary_color: Option<String>,
    loaded_version: i64,
}

impl WriteModel for LabelPolicyModel {
    fn reduce(&mut self, event: &Event) {
        if event.event_type == "label_policy.set" {
            self.primary_color = event
                .payload
                .get("primaryColor")
                .and_then(|v| v.as_str())
                .map(str::to_string);
        }
        self.loaded_version = event.aggregate_version;
    }

    fn loaded_version(&self) -> i64 {
        self.loaded_version
    }
}

/// A resolved label policy, carrying whether it came from a fallback
/// level rather than an org-specific row (spec §8 seed scenario 4:
/// "query returns the instance row marked `is_default=true`").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelPolicyView {
    /// The resolved color, as a `#rrggbb` hex string.
    pub primary_color: String,
    /// `true` if this came from the instance-default or built-in
    /// fallback rather than an org-specific override.
    pub is_default: bool,
}

/// `COMMAND-LabelPolicy1`: set the org-scoped override.
///
/// # Errors
///
/// Returns whatever error the underlying `push` returns.
pub async fn set_org_policy(
    store: &dyn EventStore,
    ctx: &CommandContext,
    org_id: &str,
    primary_color: &str,
) -> Result<ObjectDetails, Error> {
    set(store, ctx, &org_scoped_id(org_id), org_id, primary_color, "COMMAND-LabelPolicy1").await
}

/// `COMMAND-LabelPolicy2`: set the instance-wide default.
///
/// # Errors
///
/// Returns whatever error the underlying `push` returns.
pub async fn set_instance_default_policy(
    store: &dyn EventStore,
    ctx: &CommandContext,
    primary_color: &str,
) -> Result<ObjectDetails, Error> {
    let instance_id = ctx.instance_id.clone();
    set(
        store,
        ctx,
        &instance_default_id(&instance_id),
        &instance_id,
        primary_color,
        "COMMAND-LabelPolicy2",
    )
    .await
}

async fn set(
    store: &dyn EventStore,
    ctx: &CommandContext,
    aggregate_id: &str,
    owner: &str,
    primary_color: &str,
    command_id: &'static str,
) -> Result<ObjectDetails, Error> {
    if primary_color.trim().is_empty() {
        return Err(Error::invalid_argument(command_id, "primaryColor must not be empty"));
    }

    check_permission(ctx, "label_policy", "set", &ctx.instance_id)?;

    let mut model: LabelPolicyModel =
        write_model::load(store, &ctx.instance_id, owner, aggregate_id).await?;

    let command = Command::new(
        AGGREGATE_TYPE,
        aggregate_id,
        "label_policy.set",
        1,
        json!({ "primaryColor": primary_color }),
        ctx.instance_id.clone(),
        owner,
        ctx.caller_id.clone(),
    )
    .with_expected_version(model.loaded_version());

    let events = store.push(vec![command]).await?;
    write_model::append_and_reduce(&mut model, &events);
    tracing::info!(aggregate_id, "label policy set");

    object_details_from_last_event(&events)
        .ok_or_else(|| Error::internal(command_id, "push succeeded but returned no events"))
}

/// Resolve the effective label policy for `org_id` within `instance_id`:
/// org override, then instance default, then [`BUILTIN_PRIMARY_COLOR`]
/// (spec §4.7, "inheritance resolution" — single-shot, no merge across
/// levels). Reads the `label_policies` projection table rather than
/// replaying the event log (spec §4.7, "reads from projection tables").
///
/// # Errors
///
/// Propagates any [`Error`] the underlying reader returns.
pub async fn resolve(
    reader: &dyn LabelPolicyReader,
    instance_id: &str,
    org_id: &str,
) -> Result<LabelPolicyView, Error> {
    let org_scoped = org_scoped_id(org_id);
    let instance_default = instance_default_id(instance_id);

    iam_query::resolve_policy(
        || load_scoped(reader, instance_id, &org_scoped, false),
        || load_scoped(reader, instance_id, &instance_default, true),
        LabelPolicyView {
            primary_color: BUILTIN_PRIMARY_COLOR.to_string(),
            is_default: true,
        },
    )
    .await
}

async fn load_scoped(
    reader: &dyn LabelPolicyReader,
    instance_id: &str,
    scope_key: &str,
    is_default: bool,
) -> Result<Option<LabelPolicyView>, Error> {
    let primary_color = reader.primary_color(instance_id, scope_key).await?;
    Ok(primary_color.map(|primary_color| LabelPolicyView { primary_color, is_default }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use iam_testing::{InMemoryEventStore, InMemoryLabelPolicyProjection, InMemoryProjectionTransaction};

    fn ctx() -> CommandContext {
        CommandContext::new("user-admin", "instance-1", "COMMAND-LabelPolicy1")
    }

    /// Drives every event the store has produced for `instance-1` through
    /// `reader` synchronously, standing in for a worker's catch-up loop
    /// (spec §4.6) inside a fast unit test.
    async fn catch_up(store: &InMemoryEventStore, reader: &InMemoryLabelPolicyProjection) {
        use iam_core::event_store::{EventStore, Filter};
        use iam_core::projection::Projection;

        let events = store.query(Filter::for_instance("instance-1")).await.unwrap();
        let mut tx = InMemoryProjectionTransaction;
        for event in &events {
            reader.apply(&mut tx, event).await.unwrap();
        }
    }

    #[tokio::test]
    async fn falls_back_to_the_builtin_default_when_nothing_is_set() {
        let reader = InMemoryLabelPolicyProjection::new();
        let view = resolve(&reader, "instance-1", "org-1").await.unwrap();
        assert_eq!(view.primary_color, BUILTIN_PRIMARY_COLOR);
        assert!(view.is_default);
    }

    #[tokio::test]
    async fn instance_default_wins_over_the_builtin() {
        let store = InMemoryEventStore::new();
        set_instance_default_policy(&store, &ctx(), "#111111").await.unwrap();
        let reader = InMemoryLabelPolicyProjection::new();
        catch_up(&store, &reader).await;

        let view = resolve(&reader, "instance-1", "org-1").await.unwrap();
        assert_eq!(view.primary_color, "#111111");
        assert!(view.is_default);
    }

    #[tokio::test]
    async fn org_override_wins_over_the_instance_default() {
        let store = InMemoryEventStore::new();
        set_instance_default_policy(&store, &ctx(), "#111111").await.unwrap();
        set_org_policy(&store, &ctx(), "org-1", "#222222").await.unwrap();
        let reader = InMemoryLabelPolicyProjection::new();
        catch_up(&store, &reader).await;

        let view = resolve(&reader, "instance-1", "org-1").await.unwrap();
        assert_eq!(view.primary_color, "#222222");
        assert!(!view.is_default);

        // A different org still falls through to the instance default.
        let other = resolve(&reader, "instance-1", "org-2").await.unwrap();
        assert_eq!(other.primary_color, "#111111");
        assert!(other.is_default);
    }
}
