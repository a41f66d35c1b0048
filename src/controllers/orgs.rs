use std::collections::HashSet;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{
    Controller, ensure_all_found, ensure_grantable, ensure_not_self, parse_inputs,
};
use crate::authz::evaluator::{can_admin, can_delete_org, can_read};
use crate::authz::{
    GuardContext, UpdateInput, ensure_unique_ids, initial_permissions, referenced_usernames,
};
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::store::WriteBatch;
use crate::types::{Organization, Principal, Project, RoleSet};
use crate::validation::validate_org_id;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateOrgInput {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub permissions: Option<Value>,
    #[serde(default)]
    pub custom: Option<Map<String, Value>>,
}

impl Controller {
    /// Creates organizations. System admins only; the creator becomes org admin.
    pub fn create_orgs(&self, actor: &Principal, input: Value) -> Result<Vec<Organization>> {
        if !actor.admin {
            return Err(Error::Authorization(
                "only system admins can create organizations".to_string(),
            ));
        }

        let inputs: Vec<CreateOrgInput> = parse_inputs(input)?;
        ensure_unique_ids(inputs.iter().map(|i| i.id.as_str()))?;
        for i in &inputs {
            validate_org_id(&i.id)?;
        }

        let ids: Vec<String> = inputs.iter().map(|i| i.id.clone()).collect();
        let existing = self.store.find_orgs(&ids)?;
        if !existing.is_empty() {
            let ids: Vec<String> = existing.into_iter().map(|o| o.id).collect();
            return Err(Error::Conflict(format!(
                "organization(s) already exist: {}",
                ids.join(", ")
            )));
        }

        let mut orgs = Vec::with_capacity(inputs.len());
        let mut grantees = Vec::new();
        for i in inputs {
            let (permissions, usernames) = initial_permissions(i.permissions.as_ref())?;
            ensure_not_self(actor, &usernames)?;
            grantees.extend(usernames);

            let mut org = Organization::new(&i.id, i.name.unwrap_or_else(|| i.id.clone()), Some(&actor.id));
            org.permissions = permissions;
            org.permissions.insert(actor.id.clone(), RoleSet::ADMIN);
            org.custom = i.custom.unwrap_or_default();
            orgs.push(org);
        }

        grantees.sort();
        grantees.dedup();
        let directory = self.load_directory(&grantees)?;
        ensure_grantable(&directory, &grantees)?;

        self.store.commit(&WriteBatch {
            insert_orgs: orgs.clone(),
            ..Default::default()
        })?;

        let ids: Vec<String> = orgs.iter().map(|o| o.id.clone()).collect();
        tracing::info!(actor = %actor.id, orgs = ?ids, "created organizations");
        self.emit(EventKind::OrgsCreated, ids);
        Ok(orgs)
    }

    /// Returns the requested organizations, or every readable one when `ids` is
    /// `None`. Organizations the actor cannot read are reported as not found.
    pub fn find_orgs(
        &self,
        actor: &Principal,
        ids: Option<&[String]>,
        include_archived: bool,
    ) -> Result<Vec<Organization>> {
        let visible = |o: &Organization| can_read(actor, o) && (include_archived || !o.lifecycle.archived);

        match ids {
            Some(ids) => {
                let orgs: Vec<Organization> = self
                    .store
                    .find_orgs(ids)?
                    .into_iter()
                    .filter(visible)
                    .collect();
                let found: HashSet<String> = orgs.iter().map(|o| o.id.clone()).collect();
                ensure_all_found(ids, &found)?;
                Ok(orgs)
            }
            None => Ok(self
                .store
                .list_orgs()?
                .into_iter()
                .filter(visible)
                .collect()),
        }
    }

    /// Updates one or many organizations. Every update is validated before
    /// anything is written; the batch commits as one write.
    pub fn update_orgs(&self, actor: &Principal, input: Value) -> Result<Vec<Organization>> {
        let updates = UpdateInput::many_from_value(input)?;
        ensure_unique_ids(updates.iter().map(|u| u.id.as_str()))?;

        for u in &updates {
            if self.guard.is_default_org(&u.id) {
                return Err(Error::ImmutableField(format!(
                    "the default organization {} cannot be modified",
                    u.id
                )));
            }
        }

        let ids: Vec<String> = updates.iter().map(|u| u.id.clone()).collect();
        let orgs = self.store.find_orgs(&ids)?;
        let found: HashSet<String> = orgs.iter().map(|o| o.id.clone()).collect();
        ensure_all_found(&ids, &found)?;

        let denied: Vec<&str> = orgs
            .iter()
            .filter(|o| !can_admin(actor, *o))
            .map(|o| o.id.as_str())
            .collect();
        if !denied.is_empty() {
            return Err(Error::Authorization(format!(
                "admin permission required on organization(s) {}",
                denied.join(", ")
            )));
        }

        let directory = self.load_directory(&referenced_usernames(&updates))?;
        let now = Utc::now();
        let mut updated = Vec::with_capacity(updates.len());

        for update in &updates {
            let Some(org) = orgs.iter().find(|o| o.id == update.id) else {
                continue;
            };
            let dependents: Vec<Project> = if update.fields.contains_key("permissions") {
                self.store.list_org_projects(&org.id)?
            } else {
                Vec::new()
            };
            let ctx = GuardContext {
                actor,
                now,
                directory: &directory,
                dependents: &dependents,
            };
            let mut next = org.clone();
            self.guard.apply(&ctx, &mut next, &update.fields)?;
            updated.push(next);
        }

        self.store.commit(&WriteBatch {
            update_orgs: updated.clone(),
            ..Default::default()
        })?;

        tracing::info!(actor = %actor.id, orgs = ?ids, "updated organizations");
        self.emit(EventKind::OrgsUpdated, ids);
        Ok(updated)
    }

    /// Deletes archived organizations and everything they own. System admins
    /// only; the default organization can never be deleted.
    pub fn delete_orgs(&self, actor: &Principal, ids: &[String]) -> Result<Vec<String>> {
        ensure_unique_ids(ids.iter().map(String::as_str))?;

        if let Some(id) = ids.iter().find(|id| self.guard.is_default_org(id)) {
            return Err(Error::ImmutableField(format!(
                "the default organization {id} cannot be deleted"
            )));
        }
        if !can_delete_org(actor) {
            return Err(Error::Authorization(
                "only system admins can delete organizations".to_string(),
            ));
        }

        let orgs = self.store.find_orgs(ids)?;
        let found: HashSet<String> = orgs.iter().map(|o| o.id.clone()).collect();
        ensure_all_found(ids, &found)?;

        let active: Vec<&str> = orgs
            .iter()
            .filter(|o| !o.lifecycle.archived)
            .map(|o| o.id.as_str())
            .collect();
        if !active.is_empty() {
            return Err(Error::ArchivedObject(format!(
                "organization(s) must be archived before deletion: {}",
                active.join(", ")
            )));
        }

        let deleted = self.store.delete_orgs(ids)?;
        tracing::info!(actor = %actor.id, orgs = ?ids, deleted, "deleted organizations");
        self.emit(EventKind::OrgsDeleted, ids.to_vec());
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
    fn test_create_requires_system_admin() {
        let h = harness();
        let err = h
            .controller
            .create_orgs(&h.user("alice"), json!({"id": "acme"}))
            .unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
    }

    #[test]
    fn test_create_grants_creator_admin() {
        let h = harness();
        h.add_users(&["alice"]);
        let orgs = h
            .controller
            .create_orgs(&h.admin(), json!({"id": "acme", "name": "Acme", "permissions": {"alice": "Write"}}))
            .unwrap();
        assert_eq!(orgs[0].permissions["bob"], RoleSet::ADMIN);
        assert_eq!(orgs[0].permissions["alice"], RoleSet::WRITE);
    }

    #[test]
    fn test_create_rejects_duplicates() {
        let h = harness();
        let err = h
            .controller
            .create_orgs(&h.admin(), json!([{"id": "acme"}, {"id": "acme"}]))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        h.controller.create_orgs(&h.admin(), json!({"id": "acme"})).unwrap();
        let err = h
            .controller
            .create_orgs(&h.admin(), json!({"id": "acme"}))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_find_hides_unreadable_orgs() {
        let h = harness();
        h.add_users(&["alice"]);
        h.controller.create_orgs(&h.admin(), json!({"id": "acme"})).unwrap();

        let visible = h.controller.find_orgs(&h.user("alice"), None, false).unwrap();
        assert!(visible.iter().all(|o| o.id != "acme"));

        let err = h
            .controller
            .find_orgs(&h.user("alice"), Some(&["acme".into(), "nope".into()]), false)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(ref ids) if ids.len() == 2));
    }

    #[test]
    fn test_default_org_update_rejected_even_for_admin() {
        let h = harness();
        let err = h
            .controller
            .update_orgs(&h.admin(), json!({"id": "default"}))
            .unwrap_err();
        assert!(matches!(err, Error::ImmutableField(_)));

        let err = h
            .controller
            .update_orgs(&h.user("alice"), json!({"id": "default", "name": "x"}))
            .unwrap_err();
        assert!(matches!(err, Error::ImmutableField(_)));
    }

    #[test]
    fn test_update_requires_org_admin() {
        let h = harness();
        h.add_users(&["alice", "carol"]);
        h.controller
            .create_orgs(
                &h.admin(),
                json!({"id": "acme", "permissions": {"alice": "admin", "carol": "write"}}),
            )
            .unwrap();

        let err = h
            .controller
            .update_orgs(&h.user("carol"), json!({"id": "acme", "name": "Mine"}))
            .unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));

        let orgs = h
            .controller
            .update_orgs(&h.user("alice"), json!({"id": "acme", "name": "Acme Corp"}))
            .unwrap();
        assert_eq!(orgs[0].name, "Acme Corp");
        assert_eq!(orgs[0].lifecycle.last_modified_by.as_deref(), Some("alice"));
    }

    #[test]
    fn test_remove_blocked_while_project_access_remains() {
        let h = harness();
        h.add_users(&["carol"]);
        h.controller.create_orgs(&h.admin(), json!({"id": "acme"})).unwrap();
        h.controller
            .create_projects(&h.admin(), "acme", json!({"id": "proj1", "permissions": {"carol": "write"}}))
            .unwrap();

        let err = h
            .controller
            .update_orgs(&h.admin(), json!({"id": "acme", "permissions": {"carol": "remove_all"}}))
            .unwrap_err();
        assert!(matches!(err, Error::DependentPermission(_)));

        let org = h.store.find_orgs(&["acme".into()]).unwrap().remove(0);
        assert_eq!(org.permissions["carol"], RoleSet::READ);
    }

    #[test]
    fn test_batch_rejected_as_a_whole() {
        let h = harness();
        h.controller
            .create_orgs(&h.admin(), json!([{"id": "acme"}, {"id": "beta"}]))
            .unwrap();

        let err = h
            .controller
            .update_orgs(
                &h.admin(),
                json!([{"id": "acme", "name": "Renamed"}, {"id": "beta", "created_by": "eve"}]),
            )
            .unwrap_err();
        assert!(matches!(err, Error::ImmutableField(_)));

        let acme = h.store.find_orgs(&["acme".into()]).unwrap().remove(0);
        assert_eq!(acme.name, "acme");
    }

    #[test]
    fn test_delete_requires_archive_first() {
        let h = harness();
        h.controller.create_orgs(&h.admin(), json!({"id": "acme"})).unwrap();

        let err = h
            .controller
            .delete_orgs(&h.admin(), &["acme".into()])
            .unwrap_err();
        assert!(matches!(err, Error::ArchivedObject(_)));

        h.controller
            .update_orgs(&h.admin(), json!({"id": "acme", "archived": true}))
            .unwrap();
        let deleted = h.controller.delete_orgs(&h.admin(), &["acme".into()]).unwrap();
        assert_eq!(deleted, vec!["acme".to_string()]);
        assert!(h.store.find_orgs(&["acme".into()]).unwrap().is_empty());
    }

    #[test]
    fn test_delete_default_org_rejected() {
        let h = harness();
        let err = h
            .controller
            .delete_orgs(&h.admin(), &["default".into()])
            .unwrap_err();
        assert!(matches!(err, Error::ImmutableField(_)));
    }

    #[test]
    fn test_delete_by_org_admin_rejected() {
        let h = harness();
        h.add_users(&["alice"]);
        h.controller
            .create_orgs(&h.admin(), json!({"id": "acme", "permissions": {"alice": "admin"}}))
            .unwrap();
        let err = h
            .controller
            .delete_orgs(&h.user("alice"), &["acme".into()])
            .unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));
    }

    #[tokio::test]
    async fn test_update_emits_event() {
        let h = harness();
        h.controller.create_orgs(&h.admin(), json!({"id": "acme"})).unwrap();
        let mut rx = h.events.subscribe();

        h.controller
            .update_orgs(&h.admin(), json!({"id": "acme", "name": "Acme"}))
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::OrgsUpdated);
        assert_eq!(event.ids, vec!["acme".to_string()]);
    }
}
