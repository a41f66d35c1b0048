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

pub async fn list_orgs(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let ids = params.ids();
    let orgs = state
        .controller
        .find_orgs(&auth.principal(), ids.as_deref(), params.archived)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(orgs)))
}

pub async fn create_orgs(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let orgs = state.controller.create_orgs(&auth.principal(), body)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(orgs))))
}

pub async fn update_orgs(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let orgs = state.controller.update_orgs(&auth.principal(), body)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(orgs)))
}

pub async fn delete_orgs(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let ids = ids_from_body(&body)?;
    let deleted = state.controller.delete_orgs(&auth.principal(), &ids)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(deleted)))
}

pub async fn get_org(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
    Query(params): Query<ArchivedParam>,
) -> impl IntoResponse {
    let org = state
        .controller
        .find_orgs(&auth.principal(), Some(std::slice::from_ref(&org_id)), params.archived)?
        .pop()
        .ok_or_else(|| Error::not_found(&org_id))?;

    Ok::<_, ApiError>(Json(ApiResponse::success(org)))
}

pub async fn update_org(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let body = with_path_id(body, &org_id)?;
    let org = state
        .controller
        .update_orgs(&auth.principal(), body)?
        .pop()
        .ok_or_else(|| Error::not_found(&org_id))?;

    Ok::<_, ApiError>(Json(ApiResponse::success(org)))
}

pub async fn delete_org(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(org_id): Path<String>,
) -> impl IntoResponse {
    let deleted = state.controller.delete_orgs(&auth.principal(), &[org_id])?;

    Ok::<_, ApiError>(Json(ApiResponse::success(deleted)))
}
