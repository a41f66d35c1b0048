//! Resource controllers. Each mutating operation loads the targets, asks the
//! evaluator, runs the mutation guard over every target, commits the batch in
//! one write and then fires a post-commit event.

mod orgs;
mod projects;
mod users;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use orgs::CreateOrgInput;
pub use projects::CreateProjectInput;
pub use users::CreateUserInput;

use crate::authz::{MutationGuard, propagation::propagate_project_grants};
use crate::error::{Error, Result};
use crate::events::{Event, EventKind, Notifier};
use crate::store::{Store, WriteBatch};
use crate::types::{Organization, Principal, User};

/// Result of a mutation whose primary write succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct Mutation<T> {
    pub data: Vec<T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PropagationWarning>,
}

impl<T> Mutation<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self {
            data,
            warnings: Vec::new(),
        }
    }
}

/// A project grant was committed but the matching organization read grant was
/// not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropagationWarning {
    pub org: String,
    pub usernames: Vec<String>,
    pub message: String,
}

pub struct Controller {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    guard: MutationGuard,
}

impl Controller {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        default_org_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            guard: MutationGuard::new(default_org_id),
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    #[must_use]
    pub fn default_org_id(&self) -> &str {
        self.guard.default_org_id()
    }

    /// Creates the default organization if it does not exist yet.
    pub fn ensure_default_org(&self, name: &str) -> Result<Organization> {
        let id = self.default_org_id().to_string();
        if let Some(org) = self.store.find_orgs(std::slice::from_ref(&id))?.pop() {
            return Ok(org);
        }

        let org = Organization::new(id, name, None);
        self.store.commit(&WriteBatch {
            insert_orgs: vec![org.clone()],
            ..Default::default()
        })?;
        tracing::info!(org = %org.id, "created default organization");
        Ok(org)
    }

    fn emit(&self, kind: EventKind, ids: Vec<String>) {
        if !ids.is_empty() {
            self.notifier.notify(Event::new(kind, ids));
        }
    }

    /// Loads the users named by a permission change, keyed by username.
    fn load_directory(&self, usernames: &[String]) -> Result<HashMap<String, User>> {
        Ok(self
            .store
            .find_users(usernames)?
            .into_iter()
            .map(|u| (u.username.clone(), u))
            .collect())
    }

    /// Grants organization `read` to project grantees who lack any org entry.
    /// Runs after the project write; failure is reported, not raised.
    fn propagate(
        &self,
        actor: &Principal,
        org_id: &str,
        grantees: &[String],
    ) -> Option<PropagationWarning> {
        if grantees.is_empty() {
            return None;
        }

        let result = (|| -> Result<Vec<String>> {
            let mut org = self
                .store
                .find_orgs(&[org_id.to_string()])?
                .pop()
                .ok_or_else(|| Error::not_found(org_id))?;
            let added = propagate_project_grants(&mut org, grantees);
            if !added.is_empty() {
                org.lifecycle.touch(&actor.id, Utc::now());
                self.store.commit(&WriteBatch {
                    update_orgs: vec![org],
                    ..Default::default()
                })?;
            }
            Ok(added)
        })();

        match result {
            Ok(added) => {
                if !added.is_empty() {
                    tracing::info!(org = %org_id, users = ?added, "propagated read access to organization");
                    self.emit(EventKind::OrgsUpdated, vec![org_id.to_string()]);
                }
                None
            }
            Err(e) => {
                tracing::warn!(org = %org_id, users = ?grantees, "failed to propagate project grants: {e}");
                Some(PropagationWarning {
                    org: org_id.to_string(),
                    usernames: grantees.to_vec(),
                    message: format!("project permissions saved but organization access was not granted: {e}"),
                })
            }
        }
    }
}

/// Parses one object or an array of objects into typed inputs.
fn parse_inputs<T: DeserializeOwned>(value: Value) -> Result<Vec<T>> {
    let items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    items
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(|e| Error::Validation(e.to_string())))
        .collect()
}

/// Fails with every requested id that was not found.
fn ensure_all_found<'a>(
    requested: impl IntoIterator<Item = &'a String>,
    found: &HashSet<String>,
) -> Result<()> {
    let missing: Vec<String> = requested
        .into_iter()
        .filter(|id| !found.contains(*id))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::NotFound(missing))
    }
}

/// Rejects permission input that names the acting user.
fn ensure_not_self(actor: &Principal, usernames: &[String]) -> Result<()> {
    if usernames.iter().any(|u| *u == actor.id) {
        return Err(Error::Authorization(
            "users cannot change their own permissions".to_string(),
        ));
    }
    Ok(())
}

/// Rejects grants to unknown or archived users, listing all of them.
fn ensure_grantable(directory: &HashMap<String, User>, usernames: &[String]) -> Result<()> {
    let missing: Vec<String> = usernames
        .iter()
        .filter(|u| directory.get(*u).is_none_or(|user| user.lifecycle.archived))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::NotFound(missing))
    }
}
