use std::collections::HashSet;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{
    Controller, Mutation, ensure_all_found, ensure_grantable, ensure_not_self, parse_inputs,
};
use crate::authz::evaluator::{
    can_admin_project, can_create_under, can_delete_project, can_read, can_read_project,
};
use crate::authz::{
    GuardContext, UpdateInput, ensure_unique_ids, initial_permissions, referenced_usernames,
};
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::store::WriteBatch;
use crate::types::{Element, Organization, Principal, Project, RoleSet, Visibility};
use crate::validation::validate_project_id;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateProjectInput {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub permissions: Option<Value>,
    #[serde(default)]
    pub custom: Option<Map<String, Value>>,
    #[serde(default)]
    pub visibility: Option<String>,
}

/// Root structural elements every project starts with: (id, name, parent).
const ROOT_ELEMENTS: [(&str, &str, Option<&str>); 4] = [
    ("model", "Model", None),
    ("__mbee__", "__mbee__", Some("model")),
    ("holding_bin", "holding bin", Some("__mbee__")),
    ("undefined", "undefined element", Some("__mbee__")),
];

fn root_elements(project: &Project, created_by: &str) -> Vec<Element> {
    let now = Utc::now();
    ROOT_ELEMENTS
        .iter()
        .map(|(id, name, parent)| Element {
            id: (*id).to_string(),
            org: project.org.clone(),
            project: project.id.clone(),
            name: (*name).to_string(),
            parent: parent.map(str::to_string),
            created_by: Some(created_by.to_string()),
            created_on: now,
        })
        .collect()
}

impl Controller {
    fn load_org(&self, org_id: &str) -> Result<Organization> {
        self.store
            .find_orgs(&[org_id.to_string()])?
            .pop()
            .ok_or_else(|| Error::not_found(org_id))
    }

    /// Creates projects under an organization. Requires org write; the creator
    /// becomes project admin and every grantee gets org read.
    pub fn create_projects(
        &self,
        actor: &Principal,
        org_id: &str,
        input: Value,
    ) -> Result<Mutation<Project>> {
        let org = self.load_org(org_id)?;
        if org.lifecycle.archived {
            return Err(Error::ArchivedObject(format!(
                "organization {org_id} is archived"
            )));
        }
        if !can_create_under(actor, &org) {
            return Err(Error::Authorization(format!(
                "write permission required on organization {org_id} to create projects"
            )));
        }

        let inputs: Vec<CreateProjectInput> = parse_inputs(input)?;
        ensure_unique_ids(inputs.iter().map(|i| i.id.as_str()))?;
        for i in &inputs {
            validate_project_id(&i.id)?;
        }

        let ids: Vec<String> = inputs.iter().map(|i| i.id.clone()).collect();
        let existing = self.store.find_projects(org_id, &ids)?;
        if !existing.is_empty() {
            let ids: Vec<String> = existing.iter().map(Project::full_id).collect();
            return Err(Error::Conflict(format!(
                "project(s) already exist: {}",
                ids.join(", ")
            )));
        }

        let mut projects = Vec::with_capacity(inputs.len());
        let mut grantees = Vec::new();
        for i in inputs {
            let (permissions, usernames) = initial_permissions(i.permissions.as_ref())?;
            ensure_not_self(actor, &usernames)?;
            grantees.extend(usernames);

            let mut project = Project::new(
                org_id,
                &i.id,
                i.name.unwrap_or_else(|| i.id.clone()),
                Some(&actor.id),
            );
            project.permissions = permissions;
            project.permissions.insert(actor.id.clone(), RoleSet::ADMIN);
            project.custom = i.custom.unwrap_or_default();
            if let Some(v) = i.visibility.as_deref() {
                project.visibility = Visibility::parse(v)?;
            }
            projects.push(project);
        }

        grantees.sort();
        grantees.dedup();
        let directory = self.load_directory(&grantees)?;
        ensure_grantable(&directory, &grantees)?;

        let elements = projects
            .iter()
            .flat_map(|p| root_elements(p, &actor.id))
            .collect();
        self.store.commit(&WriteBatch {
            insert_projects: projects.clone(),
            insert_elements: elements,
            ..Default::default()
        })?;

        let full_ids: Vec<String> = projects.iter().map(Project::full_id).collect();
        tracing::info!(actor = %actor.id, projects = ?full_ids, "created projects");
        self.emit(EventKind::ProjectsCreated, full_ids);

        let mut members: Vec<String> = projects
            .iter()
            .flat_map(|p| p.permissions.keys().cloned())
            .collect();
        members.sort();
        members.dedup();

        let mut result = Mutation::new(projects);
        result.warnings.extend(self.propagate(actor, org_id, &members));
        Ok(result)
    }

    /// Returns readable projects of an organization.
    pub fn find_projects(
        &self,
        actor: &Principal,
        org_id: &str,
        ids: Option<&[String]>,
        include_archived: bool,
    ) -> Result<Vec<Project>> {
        let org = self.load_org(org_id)?;
        if org.lifecycle.archived && !include_archived {
            return Err(Error::not_found(org_id));
        }

        let visible =
            |p: &Project| can_read_project(actor, p, &org) && (include_archived || !p.lifecycle.archived);

        match ids {
            Some(ids) => {
                let projects: Vec<Project> = self
                    .store
                    .find_projects(org_id, ids)?
                    .into_iter()
                    .filter(visible)
                    .collect();
                let found: HashSet<String> = projects.iter().map(|p| p.id.clone()).collect();
                ensure_all_found(ids, &found)
                    .map_err(|e| qualify_not_found(e, org_id))?;
                Ok(projects)
            }
            None => {
                let projects: Vec<Project> = self
                    .store
                    .list_org_projects(org_id)?
                    .into_iter()
                    .filter(visible)
                    .collect();
                // Non-members see neither the organization nor its projects.
                if projects.is_empty() && !can_read(actor, &org) {
                    return Err(Error::not_found(org_id));
                }
                Ok(projects)
            }
        }
    }

    /// Updates one or many projects of an organization in a single write,
    /// then propagates org read access to new grantees.
    pub fn update_projects(
        &self,
        actor: &Principal,
        org_id: &str,
        input: Value,
    ) -> Result<Mutation<Project>> {
        let updates = UpdateInput::many_from_value(input)?;
        ensure_unique_ids(updates.iter().map(|u| u.id.as_str()))?;

        let org = self.load_org(org_id)?;
        if org.lifecycle.archived {
            return Err(Error::ArchivedObject(format!(
                "organization {org_id} is archived"
            )));
        }

        let ids: Vec<String> = updates.iter().map(|u| u.id.clone()).collect();
        let projects = self.store.find_projects(org_id, &ids)?;
        let found: HashSet<String> = projects.iter().map(|p| p.id.clone()).collect();
        ensure_all_found(&ids, &found).map_err(|e| qualify_not_found(e, org_id))?;

        let denied: Vec<String> = projects
            .iter()
            .filter(|p| !can_admin_project(actor, p, &org))
            .map(Project::full_id)
            .collect();
        if !denied.is_empty() {
            return Err(Error::Authorization(format!(
                "admin permission required on project(s) {}",
                denied.join(", ")
            )));
        }

        let directory = self.load_directory(&referenced_usernames(&updates))?;
        let now = Utc::now();
        let ctx = GuardContext {
            actor,
            now,
            directory: &directory,
            dependents: &[],
        };

        let mut updated = Vec::with_capacity(updates.len());
        let mut granted = Vec::new();
        for update in &updates {
            let Some(project) = projects.iter().find(|p| p.id == update.id) else {
                continue;
            };
            let mut next = project.clone();
            let delta = self.guard.apply(&ctx, &mut next, &update.fields)?;
            granted.extend(delta.granted);
            updated.push(next);
        }

        self.store.commit(&WriteBatch {
            update_projects: updated.clone(),
            ..Default::default()
        })?;

        let full_ids: Vec<String> = updated.iter().map(Project::full_id).collect();
        tracing::info!(actor = %actor.id, projects = ?full_ids, "updated projects");
        self.emit(EventKind::ProjectsUpdated, full_ids);

        granted.sort();
        granted.dedup();
        let mut result = Mutation::new(updated);
        result.warnings.extend(self.propagate(actor, org_id, &granted));
        Ok(result)
    }

    /// Deletes archived projects with their elements. System admins only.
    pub fn delete_projects(
        &self,
        actor: &Principal,
        org_id: &str,
        ids: &[String],
    ) -> Result<Vec<String>> {
        ensure_unique_ids(ids.iter().map(String::as_str))?;
        if !can_delete_project(actor) {
            return Err(Error::Authorization(
                "only system admins can delete projects".to_string(),
            ));
        }

        self.load_org(org_id)?;
        let projects = self.store.find_projects(org_id, ids)?;
        let found: HashSet<String> = projects.iter().map(|p| p.id.clone()).collect();
        ensure_all_found(ids, &found).map_err(|e| qualify_not_found(e, org_id))?;

        let active: Vec<String> = projects
            .iter()
            .filter(|p| !p.lifecycle.archived)
            .map(Project::full_id)
            .collect();
        if !active.is_empty() {
            return Err(Error::ArchivedObject(format!(
                "project(s) must be archived before deletion: {}",
                active.join(", ")
            )));
        }

        let deleted = self.store.delete_projects(org_id, ids)?;
        let full_ids: Vec<String> = projects.iter().map(Project::full_id).collect();
        tracing::info!(actor = %actor.id, projects = ?full_ids, deleted, "deleted projects");
        self.emit(EventKind::ProjectsDeleted, full_ids.clone());
        Ok(full_ids)
    }
}

/// Rewrites bare project ids in a not-found error to `org:project`.
fn qualify_not_found(err: Error, org_id: &str) -> Error {
    match err {
        Error::NotFound(ids) => {
            Error::NotFound(ids.into_iter().map(|id| format!("{org_id}:{id}")).collect())
        }
        other => other,
    }
}
