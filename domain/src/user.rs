//! The human user aggregate (spec §8 seed scenarios 1 and 5): a person
//! who can be added to an organization, identified by a username unique
//! within that organization.
//!
//! Grounded the same way as [`crate::organization`] — action/event/reducer
//! split from the teacher's auth crate, Reducer/Effect machinery dropped
//! in favor of a direct `async fn` per command.

use iam_core::command::{check_permission, object_details_from_last_event, CommandContext, ObjectDetails};
use iam_core::error::Error;
use iam_core::event::{Command, Event};
use iam_core::event_store::EventStore;
use iam_core::unique_constraint::UniqueConstraintRequest;
use iam_core::write_model::{self, WriteModel};
use serde_json::json;

/// Aggregate type string used throughout commands/events/filters.
pub const AGGREGATE_TYPE: &str = "user";

/// The kind of uniqueness claimed for a username (spec §3,
/// "Unique-Constraint Record"; spec §8 seed scenario 5).
const USERNAME_UNIQUE_TYPE: &str = "username";

/// Usernames are unique per organization, not per instance — the
/// `unique_constraints` table is keyed only by `(instance_id, unique_type,
/// unique_field)` (`iam-postgres::event_store::apply_unique_constraint`),
/// so the org id is folded into the claimed field itself.
fn username_claim(org_id: &str, username: &str) -> String {
    format!("{org_id}:{username}")
}

/// A pure reduction of one user's event stream.
#[derive(Default, Debug)]
pub struct UserModel {
    /// The user's username, `None` until `user.human.added`.
    pub username: Option<String>,
    /// The organization this user belongs to.
    pub org_id: Option<String>,
    loaded_version: i64,
}

impl UserModel {
    /// Whether this user has been added yet (a `user.human.added` event
    /// has been reduced).
    #[must_use]
    pub fn exists(&self) -> bool {
        self.username.is_some()
    }
}

impl WriteModel for UserModel {
    fn reduce(&mut self, event: &Event) {
        match event.event_type.as_str() {
            "user.human.added" => {
                self.username = event
                    .payload
                    .get("username")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                self.org_id = event
                    .payload
                    .get("orgId")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
            }
            "user.human.removed" => {
                self.username = None;
                self.org_id = None;
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

/// Input for [`add_human`].
#[derive(Clone, Debug)]
pub struct AddHumanUser {
    /// The new user's aggregate id, chosen by the caller.
    pub user_id: String,
    /// The organization this user is being added to.
    pub org_id: String,
    /// Username, unique within `org_id`.
    pub username: String,
    /// Email address.
    pub email: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
}

/// `COMMAND-User1`: add a human user to an organization.
///
/// # Errors
///
/// - `invalid_argument` if `username` or `email` is empty (step 1).
/// - `already_exists` if `user_id` already names a user, or if
///   `username` is already claimed within `org_id` (step 6, enforced by
///   the eventstore's unique-constraint table in the same transaction as
///   the event — spec §8 seed scenario 5).
pub async fn add_human(
    store: &dyn EventStore,
    ctx: &CommandContext,
    input: AddHumanUser,
) -> Result<ObjectDetails, Error> {
    const COMMAND_ID: &str = "COMMAND-User1";

    if input.username.trim().is_empty() {
        return Err(Error::invalid_argument(COMMAND_ID, "username must not be empty"));
    }
    if input.email.trim().is_empty() {
        return Err(Error::invalid_argument(COMMAND_ID, "email must not be empty"));
    }

    check_permission(ctx, "user", "add", &ctx.instance_id)?;

    let mut model: UserModel =
        write_model::load(store, &ctx.instance_id, &input.org_id, &input.user_id).await?;
    if model.exists() {
        tracing::warn!(user_id = %input.user_id, "user already exists");
        return Err(Error::already_exists(
            COMMAND_ID,
            format!("user {} already exists", input.user_id),
        ));
    }

    let payload = json!({
        "orgId": input.org_id,
        "username": input.username,
        "email": input.email,
        "firstName": input.first_name,
        "lastName": input.last_name,
    });
    let command = Command::new(
        AGGREGATE_TYPE,
        input.user_id.clone(),
        "user.human.added",
        1,
        payload,
        ctx.instance_id.clone(),
        input.org_id.clone(),
        ctx.caller_id.clone(),
    )
    .with_expected_version(0)
    .with_unique_constraint(UniqueConstraintRequest::add(
        USERNAME_UNIQUE_TYPE,
        username_claim(&input.org_id, &input.username),
        input.user_id.clone(),
    ));

    let events = store.push(vec![command]).await?;
    write_model::append_and_reduce(&mut model, &events);
    tracing::info!(user_id = %input.user_id, org_id = %input.org_id, "human user added");

    object_details_from_last_event(&events)
        .ok_or_else(|| Error::internal(COMMAND_ID, "push succeeded but returned no events"))
}

/// `COMMAND-User2`: remove a human user from an organization, releasing
/// its username's uniqueness claim so it can be reclaimed by a later
/// `add_human` (spec §8 seed scenario 5).
///
/// # Errors
///
/// - `not_found` if `user_id` does not exist in `org_id`.
pub async fn remove_human(
    store: &dyn EventStore,
    ctx: &CommandContext,
    org_id: &str,
    user_id: &str,
) -> Result<ObjectDetails, Error> {
    const COMMAND_ID: &str = "COMMAND-User2";

    check_permission(ctx, "user", "remove", &ctx.instance_id)?;

    let mut model: UserModel = write_model::load(store, &ctx.instance_id, org_id, user_id).await?;
    let Some(username) = model.username.clone() else {
        return Err(Error::not_found(COMMAND_ID, format!("user {user_id} not found")));
    };

    let command = Command::new(
        AGGREGATE_TYPE,
        user_id,
        "user.human.removed",
        1,
        json!({}),
        ctx.instance_id.clone(),
        org_id,
        ctx.caller_id.clone(),
    )
    .with_expected_version(model.loaded_version())
    .with_unique_constraint(UniqueConstraintRequest::remove(
        USERNAME_UNIQUE_TYPE,
        username_claim(org_id, &username),
    ));

    let events = store.push(vec![command]).await?;
    write_model::append_and_reduce(&mut model, &events);
    tracing::info!(user_id, org_id, "human user removed");

    object_details_from_last_event(&events)
        .ok_or_else(|| Error::internal(COMMAND_ID, "push succeeded but returned no events"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use iam_testing::InMemoryEventStore;

    fn ctx() -> CommandContext {
        CommandContext::new("user-admin", "instance-1", "COMMAND-User1")
    }

    fn input(user_id: &str, username: &str) -> AddHumanUser {
        AddHumanUser {
            user_id: user_id.to_string(),
            org_id: "org-1".to_string(),
            username: username.to_string(),
            email: format!("{username}@acme.com"),
            first_name: "Al".to_string(),
            last_name: "Ice".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_username_in_the_same_org_fails_already_exists() {
        let store = InMemoryEventStore::new();
        add_human(&store, &ctx(), input("user-1", "alice")).await.unwrap();

        let error = add_human(&store, &ctx(), input("user-2", "alice")).await.unwrap_err();
        assert_eq!(error.kind, iam_core::error::Kind::AlreadyExists);
    }

    #[tokio::test]
    async fn same_username_is_allowed_in_a_different_org() {
        let store = InMemoryEventStore::new();
        add_human(&store, &ctx(), input("user-1", "alice")).await.unwrap();

        let mut other_org = input("user-2", "alice");
        other_org.org_id = "org-2".to_string();
        add_human(&store, &ctx(), other_org).await.unwrap();
    }

    #[tokio::test]
    async fn removing_a_user_releases_its_username_for_reuse() {
        let store = InMemoryEventStore::new();
        add_human(&store, &ctx(), input("user-1", "alice")).await.unwrap();
        let error = add_human(&store, &ctx(), input("user-2", "alice")).await.unwrap_err();
        assert_eq!(error.kind, iam_core::error::Kind::AlreadyExists);

        remove_human(&store, &ctx(), "org-1", "user-1").await.unwrap();

        add_human(&store, &ctx(), input("user-3", "alice")).await.unwrap();
    }

    #[tokio::test]
    async fn removing_a_user_that_does_not_exist_fails_not_found() {
        let store = InMemoryEventStore::new();
        let error = remove_human(&store, &ctx(), "org-1", "ghost").await.unwrap_err();
        assert_eq!(error.kind, iam_core::error::Kind::NotFound);
    }
}
