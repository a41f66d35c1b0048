//! Hierarchical permission model shared by every resource controller.
//!
//! - [`evaluator`] answers "may this principal do X to that resource".
//! - [`MutationGuard`] validates a proposed update against loaded state.
//! - [`propagation`] keeps organization membership in step with project grants.

pub mod evaluator;
mod guard;
pub mod propagation;
mod resource;

pub use guard::{
    GuardContext, MutationGuard, PermissionDelta, ensure_unique_ids, initial_permissions,
    parse_permission_changes, referenced_usernames,
};
pub use resource::{Resource, Secured, UpdateInput};
