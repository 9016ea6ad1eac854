//! The organization aggregate (spec §8 seed scenario 1): the root tenant
//! object within an instance, with a name and a membership roster.
//!
//! Grounded on the teacher's action → reducer → event module split
//! (`actions.rs`/`reducers/`/`events.rs`), with the Reducer/Effect/Store
//! machinery itself replaced by a direct `async fn` per command (spec
//! §4.4, DESIGN.md's C4 entry) and the event enum reduced straight over
//! [`iam_core::write_model::WriteModel`] instead of a generic `State`.

use iam_core::command::{check_permission, object_details_from_last_event, CommandContext, ObjectDetails};
use iam_core::error::Error;
use iam_core::event::{Command, Event};
use iam_core::event_store::EventStore;
use iam_core::write_model::{self, WriteModel};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::user;

/// Aggregate type string used throughout commands/events/filters.
pub const AGGREGATE_TYPE: &str = "org";

/// Domain events the org aggregate produces, keyed by `event_type` (spec
/// §9: "model [prototype-chain dispatch] as an explicit mapping from
/// event-type string to handler function; unknown keys are ignored").
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "eventType")]
pub enum OrgEvent {
    /// An organization was created.
    #[serde(rename = "org.added")]
    Added {
        /// The organization's initial display name.
        name: String,
    },
    /// An organization's display name changed.
    #[serde(rename = "org.renamed")]
    Renamed {
        /// The organization's new display name.
        name: String,
    },
    /// A user was added to an organization's membership roster.
    #[serde(rename = "org.member.added")]
    MemberAdded {
        /// The added member's user id.
        user_id: String,
    },
}

impl OrgEvent {
    /// The event-type string this variant serializes under.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Added { .. } => "org.added",
            Self::Renamed { .. } => "org.renamed",
            Self::MemberAdded { .. } => "org.member.added",
        }
    }

    fn payload(&self) -> serde_json::Value {
        match self {
            Self::Added { name } | Self::Renamed { name } => json!({ "name": name }),
            Self::MemberAdded { user_id } => json!({ "userId": user_id }),
        }
    }
}

/// A pure reduction of one organization's event stream (spec §4.3).
#[derive(Default, Debug)]
pub struct OrgModel {
    /// The organization's current name, `None` until `org.added`.
    pub name: Option<String>,
    /// User ids of every member added so far.
    pub members: Vec<String>,
    loaded_version: i64,
}

impl OrgModel {
    /// Whether this org has been created yet (at least one `org.added`
    /// event has been reduced).
    #[must_use]
    pub fn exists(&self) -> bool {
        self.name.is_some()
    }
}

impl WriteModel for OrgModel {
    fn reduce(&mut self, event: &Event) {
        match event.event_type.as_str() {
            "org.added" | "org.renamed" => {
                self.name = event
                    .payload
                    .get("name")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
            }
            "org.member.added" => {
                if let Some(user_id) = event.payload.get("userId").and_then(|v| v.as_str()) {
                    self.members.push(user_id.to_string());
                }
            }
            // Unknown event types are no-ops (spec §4.3).
            _ => {}
        }
        self.loaded_version = event.aggregate_version;
    }

    fn loaded_version(&self) -> i64 {
        self.loaded_version
    }
}

async fn load(
    store: &dyn EventStore,
    instance_id: &str,
    org_id: &str,
) -> Result<OrgModel, Error> {
    write_model::load(store, instance_id, org_id, org_id).await
}

fn command_for(
    ctx: &CommandContext,
    org_id: &str,
    expected_version: i64,
    event: &OrgEvent,
) -> Command {
    Command::new(
        AGGREGATE_TYPE,
        org_id,
        event.event_type(),
        1,
        event.payload(),
        ctx.instance_id.clone(),
        org_id,
        ctx.caller_id.clone(),
    )
    .with_expected_version(expected_version)
}

/// Input for [`create_with_admin`].
#[derive(Clone, Debug)]
pub struct CreateOrganizationWithAdmin {
    /// The new organization's aggregate id, chosen by the caller.
    pub org_id: String,
    /// The organization's display name.
    pub name: String,
    /// The first admin user's username, unique within the new org.
    pub admin_username: String,
    /// The first admin user's email address.
    pub admin_email: String,
    /// The first admin user's first name.
    pub admin_first_name: String,
    /// The first admin user's last name.
    pub admin_last_name: String,
}

/// `COMMAND-Org1`: create an organization together with its first admin
/// user, in one command (spec §8 seed scenario 1). Touches two
/// aggregates — `org` and `user` — so it pushes two batches: the user
/// first (so `org.member.added` can reference a user id that already
/// exists), then the org's own `added`/`member.added` pair.
///
/// Re-invoking with an `org_id` that already exists fails
/// `already_exists` (step 5, existence precondition) without touching the
/// user aggregate at all.
///
/// # Errors
///
/// - `invalid_argument` if `name` or `admin_username` is empty (step 1).
/// - `already_exists` if `org_id` already names an organization (step 5),
///   or if `admin_username` is already claimed within the org (step 6,
///   via the user command's unique constraint).
/// - `unavailable` / `failed_precondition` as propagated from the
///   underlying `push` calls.
pub async fn create_with_admin(
    store: &dyn EventStore,
    ctx: &CommandContext,
    input: CreateOrganizationWithAdmin,
) -> Result<ObjectDetails, Error> {
    const COMMAND_ID: &str = "COMMAND-Org1";

    // Step 1: validate.
    if input.name.trim().is_empty() {
        return Err(Error::invalid_argument(COMMAND_ID, "organization name must not be empty"));
    }
    if input.admin_username.trim().is_empty() {
        return Err(Error::invalid_argument(COMMAND_ID, "admin username must not be empty"));
    }

    // Step 3: authorize.
    check_permission(ctx, "organization", "create", &ctx.instance_id)?;

    // Step 4/5: load, check the org doesn't already exist.
    let mut org = load(store, &ctx.instance_id, &input.org_id).await?;
    if org.exists() {
        tracing::warn!(org_id = %input.org_id, "organization already exists");
        return Err(Error::already_exists(
            COMMAND_ID,
            format!("organization {} already exists", input.org_id),
        ));
    }

    // Step 6 (first batch): org.added, expected_version 0 (brand new).
    let added = OrgEvent::Added { name: input.name.clone() };
    let org_events = store
        .push(vec![command_for(ctx, &input.org_id, 0, &added)])
        .await?;
    write_model::append_and_reduce(&mut org, &org_events);

    // Delegate to the user aggregate's own command for its invariants
    // (username uniqueness) — cross-aggregate checks load another
    // write-model or, as here, call its command directly (spec §4.3).
    let user_details = user::add_human(
        store,
        ctx,
        user::AddHumanUser {
            user_id: format!("{}-admin", input.org_id),
            org_id: input.org_id.clone(),
            username: input.admin_username,
            email: input.admin_email,
            first_name: input.admin_first_name,
            last_name: input.admin_last_name,
        },
    )
    .await?;

    // org.member.added, expected_version = the version after org.added.
    let member_added = OrgEvent::MemberAdded { user_id: user_details.resource_owner.clone() };
    let member_events = store
        .push(vec![command_for(ctx, &input.org_id, org.loaded_version(), &member_added)])
        .await?;
    write_model::append_and_reduce(&mut org, &member_events);
    tracing::info!(org_id = %input.org_id, "organization created");

    object_details_from_last_event(&member_events)
        .ok_or_else(|| Error::internal(COMMAND_ID, "push succeeded but returned no events"))
}

/// `COMMAND-Org2`: rename an organization.
///
/// # Errors
///
/// - `not_found` if `org_id` does not exist.
/// - `failed_precondition` if `expected_version` is stale (optimistic
///   concurrency conflict, spec §8 seed scenario 2) — the caller re-reads
///   and retries from step 4.
pub async fn rename(
    store: &dyn EventStore,
    ctx: &CommandContext,
    org_id: &str,
    new_name: &str,
) -> Result<ObjectDetails, Error> {
    const COMMAND_ID: &str = "COMMAND-Org2";

    if new_name.trim().is_empty() {
        return Err(Error::invalid_argument(COMMAND_ID, "organization name must not be empty"));
    }

    // Step 3: authorize.
    check_permission(ctx, "organization", "rename", &ctx.instance_id)?;

    let mut org = load(store, &ctx.instance_id, org_id).await?;
    if !org.exists() {
        return Err(Error::not_found(COMMAND_ID, format!("organization {org_id} not found")));
    }
    // Idempotence shortcut (spec §4.4 step 5): renaming to the current
    // name is a no-op success, no event appended.
    if org.name.as_deref() == Some(new_name) {
        return Ok(ObjectDetails::new(org.loaded_version(), ctx.now(), org_id));
    }

    let renamed = OrgEvent::Renamed { name: new_name.to_string() };
    let events = store
        .push(vec![command_for(ctx, org_id, org.loaded_version(), &renamed)])
        .await?;
    write_model::append_and_reduce(&mut org, &events);

    object_details_from_last_event(&events)
        .ok_or_else(|| Error::internal(COMMAND_ID, "push succeeded but returned no events"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use iam_testing::InMemoryEventStore;
    use std::sync::Arc;

    fn ctx() -> CommandContext {
        CommandContext::new("user-admin", "instance-1", "COMMAND-Org1")
    }

    #[tokio::test]
    async fn creating_an_organization_emits_events_in_spec_order() {
        let store = InMemoryEventStore::new();
        let details = create_with_admin(
            &store,
            &ctx(),
            CreateOrganizationWithAdmin {
                org_id: "org-1".to_string(),
                name: "Acme".to_string(),
                admin_username: "alice".to_string(),
                admin_email: "alice@acme.com".to_string(),
                admin_first_name: "Al".to_string(),
                admin_last_name: "Ice".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(details.resource_owner, "org-1");

        let filter = iam_core::event_store::Filter::for_instance("instance-1");
        let events = store.query(filter).await.unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["org.added", "user.human.added", "org.member.added"]);
    }

    #[tokio::test]
    async fn recreating_the_same_org_id_fails_already_exists() {
        let store = Arc::new(InMemoryEventStore::new());
        let input = || CreateOrganizationWithAdmin {
            org_id: "org-1".to_string(),
            name: "Acme".to_string(),
            admin_username: "alice".to_string(),
            admin_email: "alice@acme.com".to_string(),
            admin_first_name: "Al".to_string(),
            admin_last_name: "Ice".to_string(),
        };
        create_with_admin(store.as_ref(), &ctx(), input()).await.unwrap();

        let error = create_with_admin(store.as_ref(), &ctx(), input()).await.unwrap_err();
        assert_eq!(error.kind, iam_core::error::Kind::AlreadyExists);
    }

    #[tokio::test]
    async fn renaming_to_the_current_name_is_a_no_op() {
        let store = InMemoryEventStore::new();
        create_with_admin(
            &store,
            &ctx(),
            CreateOrganizationWithAdmin {
                org_id: "org-1".to_string(),
                name: "Acme".to_string(),
                admin_username: "alice".to_string(),
                admin_email: "alice@acme.com".to_string(),
                admin_first_name: "Al".to_string(),
                admin_last_name: "Ice".to_string(),
            },
        )
        .await
        .unwrap();

        rename(&store, &ctx(), "org-1", "Renamed").await.unwrap();
        let before = store
            .query(iam_core::event_store::Filter::for_instance("instance-1"))
            .await
            .unwrap()
            .len();

        rename(&store, &ctx(), "org-1", "Renamed").await.unwrap();
        let after = store
            .query(iam_core::event_store::Filter::for_instance("instance-1"))
            .await
            .unwrap()
            .len();
        assert_eq!(before, after);
    }
}
