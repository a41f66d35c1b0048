use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::propagation::ensure_org_removal_allowed;
use super::{Resource, UpdateInput};
use crate::error::{Error, Result};
use crate::types::{
    PermissionMap, Principal, Project, ResourceKind, RoleChange, User, apply_role_change,
    normalize_role,
};

/// State loaded by the caller before validation. The guard itself does no I/O.
pub struct GuardContext<'a> {
    pub actor: &'a Principal,
    pub now: DateTime<Utc>,
    /// Users referenced by permission changes, keyed by username.
    pub directory: &'a HashMap<String, User>,
    /// Projects owned by the organization under update. Empty otherwise.
    pub dependents: &'a [Project],
}

/// Permission entries changed by one update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionDelta {
    pub granted: Vec<String>,
    pub removed: Vec<String>,
}

/// Validates and applies field-level updates against loaded resources.
#[derive(Debug, Clone)]
pub struct MutationGuard {
    default_org_id: String,
}

impl MutationGuard {
    pub fn new(default_org_id: impl Into<String>) -> Self {
        Self {
            default_org_id: default_org_id.into(),
        }
    }

    #[must_use]
    pub fn default_org_id(&self) -> &str {
        &self.default_org_id
    }

    #[must_use]
    pub fn is_default_org(&self, id: &str) -> bool {
        self.default_org_id == id
    }

    /// Applies `fields` to `resource` in place. On error the resource may be
    /// partially modified; callers validate a clone and discard it on failure.
    pub fn apply<R: Resource>(
        &self,
        ctx: &GuardContext<'_>,
        resource: &mut R,
        fields: &Map<String, Value>,
    ) -> Result<PermissionDelta> {
        let id = resource.resource_id();

        if R::KIND == ResourceKind::Organization && self.is_default_org(&id) {
            return Err(Error::ImmutableField(format!(
                "the default organization {id} cannot be modified"
            )));
        }

        let archived = match fields.get("archived") {
            None => None,
            Some(value) => Some(
                value
                    .as_bool()
                    .ok_or_else(|| Error::Validation("archived must be a boolean".to_string()))?,
            ),
        };

        if resource.lifecycle().archived && archived != Some(false) {
            return Err(Error::ArchivedObject(format!(
                "{} {id} is archived and must be unarchived before it can be changed",
                R::KIND
            )));
        }

        let editable = R::KIND.editable_fields();
        if let Some(key) = fields.keys().find(|k| !editable.contains(&k.as_str())) {
            return Err(Error::ImmutableField(format!(
                "{key} cannot be changed on {} {id}",
                R::KIND
            )));
        }

        let mut delta = PermissionDelta::default();
        for (key, value) in fields {
            match key.as_str() {
                "permissions" => {
                    let changes = self.validate_permissions::<R>(ctx, &id, value)?;
                    let map = resource.permissions_mut().ok_or_else(|| {
                        Error::ImmutableField(format!("permissions cannot be changed on {id}"))
                    })?;
                    for (username, change) in changes {
                        apply_role_change(map, &username, change);
                        match change {
                            RoleChange::Grant(_) => delta.granted.push(username),
                            RoleChange::RemoveAll => delta.removed.push(username),
                        }
                    }
                }
                "archived" => {
                    if let Some(archived) = archived {
                        resource
                            .lifecycle_mut()
                            .set_archived(archived, &ctx.actor.id, ctx.now);
                    }
                }
                _ => resource.set_field(key, value)?,
            }
        }

        resource.lifecycle_mut().touch(&ctx.actor.id, ctx.now);
        Ok(delta)
    }

    fn validate_permissions<R: Resource>(
        &self,
        ctx: &GuardContext<'_>,
        resource_id: &str,
        value: &Value,
    ) -> Result<Vec<(String, RoleChange)>> {
        let changes = parse_permission_changes(value)?;

        if changes.iter().any(|(username, _)| *username == ctx.actor.id) {
            return Err(Error::Authorization(
                "users cannot change their own permissions".to_string(),
            ));
        }

        let missing: Vec<String> = changes
            .iter()
            .filter(|(username, _)| {
                ctx.directory
                    .get(username)
                    .is_none_or(|u| u.lifecycle.archived)
            })
            .map(|(username, _)| username.clone())
            .collect();
        if !missing.is_empty() {
            return Err(Error::NotFound(missing));
        }

        if R::KIND == ResourceKind::Organization {
            for (username, change) in &changes {
                if *change == RoleChange::RemoveAll {
                    ensure_org_removal_allowed(resource_id, username, ctx.dependents)?;
                }
            }
        }

        Ok(changes)
    }
}

/// Parses a `{username: token}` object through the role model.
pub fn parse_permission_changes(value: &Value) -> Result<Vec<(String, RoleChange)>> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::Validation("permissions must be an object".to_string()))?;

    obj.iter()
        .map(|(username, token)| {
            let token = token.as_str().ok_or_else(|| {
                Error::Validation(format!("permission for {username} must be a string"))
            })?;
            Ok((username.clone(), normalize_role(token)?))
        })
        .collect()
}

/// Builds a permission map for a new resource. `remove_all` entries are
/// dropped since there is nothing to remove.
pub fn initial_permissions(value: Option<&Value>) -> Result<(PermissionMap, Vec<String>)> {
    let mut map = PermissionMap::new();
    let Some(value) = value else {
        return Ok((map, Vec::new()));
    };
    let changes = parse_permission_changes(value)?;
    let usernames = changes.iter().map(|(u, _)| u.clone()).collect();
    for (username, change) in changes {
        apply_role_change(&mut map, &username, change);
    }
    Ok((map, usernames))
}

/// Rejects a batch that names the same id twice.
pub fn ensure_unique_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    let mut dupes = Vec::new();
    for id in ids {
        if !seen.insert(id) && !dupes.contains(&id) {
            dupes.push(id);
        }
    }
    if dupes.is_empty() {
        Ok(())
    } else {
        Err(Error::Conflict(format!(
            "duplicate id(s) in request: {}",
            dupes.join(", ")
        )))
    }
}

/// Every username mentioned in the permissions field of any update.
#[must_use]
pub fn referenced_usernames(inputs: &[UpdateInput]) -> Vec<String> {
    let mut names: Vec<String> = inputs
        .iter()
        .filter_map(|i| i.fields.get("permissions"))
        .filter_map(Value::as_object)
        .flat_map(|m| m.keys().cloned())
        .collect();
    names.sort();
    names.dedup();
    names
}
