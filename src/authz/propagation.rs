use crate::error::{Error, Result};
use crate::types::{Organization, Project, RoleSet};

/// Adds `read` on the organization for every project grantee that has no
/// organization entry yet. Returns the usernames that were added.
pub fn propagate_project_grants(org: &mut Organization, granted: &[String]) -> Vec<String> {
    let mut added = Vec::new();
    for username in granted {
        if org.permissions.contains_key(username) {
            continue;
        }
        org.permissions.insert(username.clone(), RoleSet::READ);
        added.push(username.clone());
    }
    added
}

/// Rejects removing `username` from an organization while any of its projects
/// still lists them.
pub fn ensure_org_removal_allowed(org_id: &str, username: &str, projects: &[Project]) -> Result<()> {
    let blocking: Vec<String> = projects
        .iter()
        .filter(|p| p.org == org_id && p.permissions.contains_key(username))
        .map(Project::full_id)
        .collect();

    if blocking.is_empty() {
        return Ok(());
    }

    Err(Error::DependentPermission(format!(
        "user {username} still has permissions on project(s) {}; remove those first",
        blocking.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_propagation_adds_read_only_when_missing() {
        let mut org = Organization::new("acme", "Acme", None);
        org.permissions.insert("alice".into(), RoleSet::ADMIN);

        let added = propagate_project_grants(&mut org, &["alice".into(), "carol".into()]);

        assert_eq!(added, vec!["carol".to_string()]);
        assert_eq!(org.permissions["carol"], RoleSet::READ);
        assert_eq!(org.permissions["alice"], RoleSet::ADMIN);
    }

    #[test]
    fn test_org_removal_blocked_by_project_entry() {
        let mut project = Project::new("acme", "proj1", "Proj 1", None);
        project.permissions.insert("carol".into(), RoleSet::WRITE);

        let err = ensure_org_removal_allowed("acme", "carol", &[project.clone()]).unwrap_err();
        assert!(matches!(err, Error::DependentPermission(ref m) if m.contains("acme:proj1")));

        assert!(ensure_org_removal_allowed("acme", "dave", &[project]).is_ok());
    }
}
