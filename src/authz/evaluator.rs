//! Pure access predicates. None of these fail; callers turn a `false` into an
//! [`Error::Authorization`](crate::error::Error::Authorization).

use super::Secured;
use crate::types::{Organization, Principal, Project, Role, Visibility};

/// Returns true if the principal holds `role` on the resource.
/// System admins hold every role everywhere.
#[must_use]
pub fn has_role<R: Secured + ?Sized>(principal: &Principal, resource: &R, role: Role) -> bool {
    if principal.admin {
        return true;
    }
    resource
        .permissions()
        .get(&principal.id)
        .is_some_and(|set| set.has(role))
}

#[must_use]
pub fn can_read<R: Secured + ?Sized>(principal: &Principal, resource: &R) -> bool {
    has_role(principal, resource, Role::Read)
}

#[must_use]
pub fn can_write<R: Secured + ?Sized>(principal: &Principal, resource: &R) -> bool {
    has_role(principal, resource, Role::Write)
}

#[must_use]
pub fn can_admin<R: Secured + ?Sized>(principal: &Principal, resource: &R) -> bool {
    has_role(principal, resource, Role::Admin)
}

/// Project creation needs write on the parent organization.
#[must_use]
pub fn can_create_under(principal: &Principal, parent_org: &Organization) -> bool {
    can_write(principal, parent_org)
}

/// Read access to a project. Internal projects are visible to every member of
/// the owning organization.
#[must_use]
pub fn can_read_project(principal: &Principal, project: &Project, org: &Organization) -> bool {
    if can_read(principal, project) {
        return true;
    }
    project.visibility == Visibility::Internal && can_read(principal, org)
}

/// Project update rights: project admin, or admin of the owning organization.
#[must_use]
pub fn can_admin_project(principal: &Principal, project: &Project, org: &Organization) -> bool {
    can_admin(principal, project) || can_admin(principal, org)
}

#[must_use]
pub fn can_delete_org(principal: &Principal) -> bool {
    principal.admin
}

/// Project deletion is restricted to system admins; project admins archive.
#[must_use]
pub fn can_delete_project(principal: &Principal) -> bool {
    principal.admin
}
