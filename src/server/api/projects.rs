use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::Value;

use crate::auth::RequireUser;
use crate::error::Error;
use crate::server::AppState;
use crate::server::dto::{ArchivedParam, ListParams, ids_from_body, with_path_id};
use crate::server::response::{ApiError, ApiResponse};

pub async fn list_projects(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let ids = params.ids();
    let projects = state.controller.find_projects(
        &auth.principal(),
        &org_id,
        ids.as_deref(),
        params.archived,
    )?;

    Ok::<_, ApiError>(Json(ApiResponse::success(projects)))
}

pub async fn create_projects(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let result = state
        .controller
        .create_projects(&auth.principal(), &org_id, body)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::from(result))))
}

pub async fn update_projects(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let result = state
        .controller
        .update_projects(&auth.principal(), &org_id, body)?;

    Ok::<_, ApiError>(Json(ApiResponse::from(result)))
}

pub async fn delete_projects(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let ids = ids_from_body(&body)?;
    let deleted = state
        .controller
        .delete_projects(&auth.principal(), &org_id, &ids)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(deleted)))
}

pub async fn get_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((org_id, project_id)): Path<(String, String)>,
    Query(params): Query<ArchivedParam>,
) -> impl IntoResponse {
    let project = state
        .controller
        .find_projects(
            &auth.principal(),
            &org_id,
            Some(std::slice::from_ref(&project_id)),
            params.archived,
        )?
        .pop()
        .ok_or_else(|| Error::not_found(format!("{org_id}:{project_id}")))?;

    Ok::<_, ApiError>(Json(ApiResponse::success(project)))
}

/// Single-project update. The body is an object; warnings are returned
/// alongside the updated project.
pub async fn update_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((org_id, project_id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let body = with_path_id(body, &project_id)?;
    let mut result = state
        .controller
        .update_projects(&auth.principal(), &org_id, body)?;
    let project = result
        .data
        .pop()
        .ok_or_else(|| Error::not_found(format!("{org_id}:{project_id}")))?;

    let mut response = ApiResponse::success(project);
    response.warnings = result.warnings;
    Ok::<_, ApiError>(Json(response))
}

pub async fn delete_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((org_id, project_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let deleted = state
        .controller
        .delete_projects(&auth.principal(), &org_id, &[project_id])?;

    Ok::<_, ApiError>(Json(ApiResponse::success(deleted)))
}
