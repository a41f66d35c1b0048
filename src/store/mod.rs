mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Documents written together by [`Store::commit`].
#[derive(Debug, Default)]
pub struct WriteBatch {
    pub insert_users: Vec<User>,
    pub insert_orgs: Vec<Organization>,
    pub insert_projects: Vec<Project>,
    pub insert_elements: Vec<Element>,
    pub update_users: Vec<User>,
    pub update_orgs: Vec<Organization>,
    pub update_projects: Vec<Project>,
}

impl WriteBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insert_users.is_empty()
            && self.insert_orgs.is_empty()
            && self.insert_projects.is_empty()
            && self.insert_elements.is_empty()
            && self.update_users.is_empty()
            && self.update_orgs.is_empty()
            && self.update_projects.is_empty()
    }
}

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    /// Applies every insert and update in the batch, or none of them.
    /// Updates of missing documents fail the whole batch with `NotFound`;
    /// duplicate inserts fail it with `Conflict`.
    fn commit(&self, batch: &WriteBatch) -> Result<()>;

    // Organization operations
    fn find_orgs(&self, ids: &[String]) -> Result<Vec<Organization>>;
    fn list_orgs(&self) -> Result<Vec<Organization>>;
    /// Deletes organizations with their projects, elements and permissions.
    fn delete_orgs(&self, ids: &[String]) -> Result<usize>;

    // Project operations
    fn find_projects(&self, org_id: &str, ids: &[String]) -> Result<Vec<Project>>;
    fn list_org_projects(&self, org_id: &str) -> Result<Vec<Project>>;
    fn delete_projects(&self, org_id: &str, ids: &[String]) -> Result<usize>;

    // Element operations
    fn list_project_elements(&self, org_id: &str, project_id: &str) -> Result<Vec<Element>>;

    // User operations (principal directory)
    fn get_user(&self, username: &str) -> Result<Option<User>>;
    fn find_users(&self, usernames: &[String]) -> Result<Vec<User>>;
    fn list_users(&self) -> Result<Vec<User>>;
    /// Deletes users and purges them from every organization and project
    /// permission map in the same transaction.
    fn delete_users(&self, usernames: &[String]) -> Result<usize>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;
}
