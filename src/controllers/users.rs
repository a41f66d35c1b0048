use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{Controller, ensure_all_found, parse_inputs};
use crate::authz::{GuardContext, UpdateInput, ensure_unique_ids};
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::store::WriteBatch;
use crate::types::{Principal, RoleSet, User};
use crate::validation::validate_username;

/// Fields only system admins may change, and never on themselves.
const PRIVILEGED_FIELDS: [&str; 2] = ["admin", "archived"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserInput {
    pub username: String,
    #[serde(default)]
    pub fname: String,
    #[serde(default)]
    pub lname: String,
    #[serde(default)]
    pub preferred_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub custom: Map<String, Value>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default = "default_provider")]
    pub provider: String,
}

fn default_provider() -> String {
    "local".to_string()
}

impl CreateUserInput {
    fn into_user(self, created_by: Option<&str>) -> User {
        let mut user = User::new(self.username, self.admin, created_by);
        user.fname = self.fname;
        user.lname = self.lname;
        user.preferred_name = self.preferred_name;
        user.email = self.email;
        user.custom = self.custom;
        user.provider = self.provider;
        user
    }
}

impl Controller {
    /// Creates users and enrolls each one in the default organization with
    /// read and write, in a single write. System admins only.
    pub fn create_users(&self, actor: &Principal, input: Value) -> Result<Vec<User>> {
        if !actor.admin {
            return Err(Error::Authorization(
                "only system admins can create users".to_string(),
            ));
        }

        let inputs: Vec<CreateUserInput> = parse_inputs(input)?;
        let users: Vec<User> = inputs
            .into_iter()
            .map(|i| i.into_user(Some(&actor.id)))
            .collect();
        self.insert_users(&actor.id, users)
    }

    /// Creates the first system admin. Used by `mbee init`, when no principal
    /// exists yet to act on its behalf. Returns the existing user unchanged if
    /// the username is taken.
    pub fn bootstrap_admin(&self, username: &str) -> Result<User> {
        if let Some(existing) = self.store.get_user(username)? {
            return Ok(existing);
        }
        let mut created = self.insert_users(username, vec![User::new(username, true, None)])?;
        created
            .pop()
            .ok_or_else(|| Error::not_found(username))
    }

    fn insert_users(&self, actor_id: &str, users: Vec<User>) -> Result<Vec<User>> {
        ensure_unique_ids(users.iter().map(|u| u.username.as_str()))?;
        for u in &users {
            validate_username(&u.username)?;
        }

        let usernames: Vec<String> = users.iter().map(|u| u.username.clone()).collect();
        let existing = self.store.find_users(&usernames)?;
        if !existing.is_empty() {
            let names: Vec<String> = existing.into_iter().map(|u| u.username).collect();
            return Err(Error::Conflict(format!(
                "user(s) already exist: {}",
                names.join(", ")
            )));
        }

        let default_id = self.default_org_id().to_string();
        let mut default_org = self
            .store
            .find_orgs(std::slice::from_ref(&default_id))?
            .pop()
            .ok_or_else(|| Error::not_found(&default_id))?;
        for name in &usernames {
            default_org.permissions.insert(name.clone(), RoleSet::WRITE);
        }
        default_org.lifecycle.touch(actor_id, Utc::now());

        self.store.commit(&WriteBatch {
            insert_users: users.clone(),
            update_orgs: vec![default_org],
            ..Default::default()
        })?;

        tracing::info!(actor = %actor_id, users = ?usernames, "created users");
        self.emit(EventKind::UsersCreated, usernames);
        self.emit(EventKind::OrgsUpdated, vec![default_id]);
        Ok(users)
    }

    /// Returns users by username, or all of them. Archived users are only
    /// visible to system admins.
    pub fn find_users(&self, actor: &Principal, ids: Option<&[String]>) -> Result<Vec<User>> {
        let visible = |u: &User| actor.admin || !u.lifecycle.archived;

        match ids {
            Some(ids) => {
                let users: Vec<User> = self
                    .store
                    .find_users(ids)?
                    .into_iter()
                    .filter(visible)
                    .collect();
                let found: HashSet<String> = users.iter().map(|u| u.username.clone()).collect();
                ensure_all_found(ids, &found)?;
                Ok(users)
            }
            None => Ok(self.store.list_users()?.into_iter().filter(visible).collect()),
        }
    }

    /// The authenticated principal's own user record.
    pub fn whoami(&self, actor: &Principal) -> Result<User> {
        self.store
            .get_user(&actor.id)?
            .ok_or_else(|| Error::not_found(&actor.id))
    }

    /// Updates users. Anyone may edit their own profile; system admins may edit
    /// anyone, except their own `admin` and `archived` flags.
    pub fn update_users(&self, actor: &Principal, input: Value) -> Result<Vec<User>> {
        let updates = UpdateInput::many_from_value(input)?;
        ensure_unique_ids(updates.iter().map(|u| u.id.as_str()))?;

        for update in &updates {
            let privileged = PRIVILEGED_FIELDS
                .iter()
                .find(|f| update.fields.contains_key(**f));
            let is_self = update.id == actor.id;

            if let Some(field) = privileged {
                if is_self {
                    return Err(Error::Authorization(format!(
                        "users cannot change their own {field} flag"
                    )));
                }
                if !actor.admin {
                    return Err(Error::Authorization(format!(
                        "only system admins can change {field}"
                    )));
                }
            }
            if !is_self && !actor.admin {
                return Err(Error::Authorization(format!(
                    "cannot update user {}",
                    update.id
                )));
            }
        }

        let ids: Vec<String> = updates.iter().map(|u| u.id.clone()).collect();
        let users = self.store.find_users(&ids)?;
        let found: HashSet<String> = users.iter().map(|u| u.username.clone()).collect();
        ensure_all_found(&ids, &found)?;

        let directory = HashMap::new();
        let ctx = GuardContext {
            actor,
            now: Utc::now(),
            directory: &directory,
            dependents: &[],
        };

        let mut updated = Vec::with_capacity(updates.len());
        for update in &updates {
            let Some(user) = users.iter().find(|u| u.username == update.id) else {
                continue;
            };
            let mut next = user.clone();
            self.guard.apply(&ctx, &mut next, &update.fields)?;
            updated.push(next);
        }

        self.store.commit(&WriteBatch {
            update_users: updated.clone(),
            ..Default::default()
        })?;

        tracing::info!(actor = %actor.id, users = ?ids, "updated users");
        self.emit(EventKind::UsersUpdated, ids);
        Ok(updated)
    }

    /// Deletes users, their tokens and every permission entry naming them.
    /// System admins only; nobody can delete themselves.
    pub fn delete_users(&self, actor: &Principal, ids: &[String]) -> Result<Vec<String>> {
        ensure_unique_ids(ids.iter().map(String::as_str))?;
        if !actor.admin {
            return Err(Error::Authorization(
                "only system admins can delete users".to_string(),
            ));
        }
        if ids.contains(&actor.id) {
            return Err(Error::Authorization(
                "users cannot delete themselves".to_string(),
            ));
        }

        let users = self.store.find_users(ids)?;
        let found: HashSet<String> = users.iter().map(|u| u.username.clone()).collect();
        ensure_all_found(ids, &found)?;

        let deleted = self.store.delete_users(ids)?;
        tracing::info!(actor = %actor.id, users = ?ids, deleted, "deleted users");
        self.emit(EventKind::UsersDeleted, ids.to_vec());
        Ok(ids.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::test_support::harness;
    use super::*;
    use crate::store::Store;

    #[test]
    fn test_create_enrolls_in_default_org() {
        let h = harness();
        let created = h
            .controller
            .create_users(&h.admin(), json!([{"username": "carol", "fname": "Carol"}, {"username": "dave"}]))
            .unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].fname, "Carol");
        assert_eq!(created[0].provider, "local");

        let org = h.store.find_orgs(&["default".into()]).unwrap().remove(0);
        assert_eq!(org.permissions["carol"], RoleSet::WRITE);
        assert_eq!(org.permissions["dave"], RoleSet::WRITE);
    }

    #[test]
    fn test_create_requires_admin() {
        let h = harness();
        h.add_users(&["alice"]);
        let err = h
            .controller
            .create_users(&h.user("alice"), json!({"username": "carol"}))
            .unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
    }

    #[test]
    fn test_create_rejects_existing_and_invalid() {
        let h = harness();
        let err = h
            .controller
            .create_users(&h.admin(), json!({"username": "bob"}))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let err = h
            .controller
            .create_users(&h.admin(), json!({"username": "No Spaces"}))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_user_edits_own_profile() {
        let h = harness();
        h.add_users(&["carol"]);
        let updated = h
            .controller
            .update_users(&h.user("carol"), json!({"id": "carol", "preferred_name": "CJ"}))
            .unwrap();
        assert_eq!(updated[0].preferred_name, "CJ");
        assert_eq!(updated[0].lifecycle.last_modified_by.as_deref(), Some("carol"));
    }

    #[test]
    fn test_user_cannot_edit_others() {
        let h = harness();
        h.add_users(&["carol", "dave"]);
        let err = h
            .controller
            .update_users(&h.user("carol"), json!({"id": "dave", "fname": "D"}))
            .unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
    }

    #[test]
    fn test_admin_cannot_change_own_flags() {
        let h = harness();
        let err = h
            .controller
            .update_users(&h.admin(), json!({"id": "bob", "admin": false}))
            .unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));

        let err = h
            .controller
            .update_users(&h.admin(), json!({"id": "bob", "archived": true}))
            .unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
    }

    #[test]
    fn test_archived_user_hidden_and_ungrantable() {
        let h = harness();
        h.add_users(&["carol", "alice"]);
        h.controller
            .update_users(&h.admin(), json!({"id": "carol", "archived": true}))
            .unwrap();

        let listed = h.controller.find_users(&h.user("alice"), None).unwrap();
        assert!(listed.iter().all(|u| u.username != "carol"));
        let listed = h.controller.find_users(&h.admin(), None).unwrap();
        assert!(listed.iter().any(|u| u.username == "carol"));

        h.controller
            .create_orgs(&h.admin(), json!({"id": "acme"}))
            .unwrap();
        let err = h
            .controller
            .update_orgs(&h.admin(), json!({"id": "acme", "permissions": {"carol": "read"}}))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_delete_purges_permissions() {
        let h = harness();
        h.controller
            .create_users(&h.admin(), json!({"username": "carol"}))
            .unwrap();
        h.controller
            .create_orgs(&h.admin(), json!({"id": "acme", "permissions": {"carol": "write"}}))
            .unwrap();

        let err = h
            .controller
            .delete_users(&h.admin(), &["bob".into()])
            .unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));

        h.controller
            .delete_users(&h.admin(), &["carol".into()])
            .unwrap();
        let orgs = h
            .store
            .find_orgs(&["acme".into(), "default".into()])
            .unwrap();
        assert!(orgs.iter().all(|o| !o.permissions.contains_key("carol")));
        assert!(h.store.get_user("carol").unwrap().is_none());
    }

    #[test]
    fn test_bootstrap_admin_is_idempotent() {
        let h = harness();
        let first = h.controller.bootstrap_admin("root").unwrap();
        assert!(first.admin);
        let again = h.controller.bootstrap_admin("root").unwrap();
        assert_eq!(again.username, "root");

        let org = h.store.find_orgs(&["default".into()]).unwrap().remove(0);
        assert_eq!(org.permissions["root"], RoleSet::WRITE);
    }

    #[test]
    fn test_whoami() {
        let h = harness();
        let me = h.controller.whoami(&h.admin()).unwrap();
        assert_eq!(me.username, "bob");
        assert!(me.admin);
    }
}
