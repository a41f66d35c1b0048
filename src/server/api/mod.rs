mod orgs;
mod projects;
mod users;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::server::AppState;

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Organizations
        .route(
            "/orgs",
            get(orgs::list_orgs)
                .post(orgs::create_orgs)
                .patch(orgs::update_orgs)
                .delete(orgs::delete_orgs),
        )
        .route(
            "/orgs/{org_id}",
            get(orgs::get_org)
                .patch(orgs::update_org)
                .delete(orgs::delete_org),
        )
        // Projects
        .route(
            "/orgs/{org_id}/projects",
            get(projects::list_projects)
                .post(projects::create_projects)
                .patch(projects::update_projects)
                .delete(projects::delete_projects),
        )
        .route(
            "/orgs/{org_id}/projects/{project_id}",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        // Users
        .route(
            "/users",
            get(users::list_users)
                .post(users::create_users)
                .patch(users::update_users)
                .delete(users::delete_users),
        )
        .route("/users/whoami", get(users::whoami))
        .route("/users/{username}/tokens", post(users::create_user_token))
}
