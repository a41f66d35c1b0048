use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use serde_json::Value;

use crate::auth::{RequireUser, issue_token};
use crate::error::Error;
use crate::server::AppState;
use crate::server::dto::{
    CreateTokenRequest, CreateTokenResponse, ListParams, ids_from_body,
};
use crate::server::response::{ApiError, ApiResponse};

pub async fn list_users(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let ids = params.ids();
    let users = state
        .controller
        .find_users(&auth.principal(), ids.as_deref())?;

    Ok::<_, ApiError>(Json(ApiResponse::success(users)))
}

pub async fn create_users(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let users = state.controller.create_users(&auth.principal(), body)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(users))))
}

pub async fn update_users(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let users = state.controller.update_users(&auth.principal(), body)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(users)))
}

pub async fn delete_users(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let ids = ids_from_body(&body)?;
    let deleted = state.controller.delete_users(&auth.principal(), &ids)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(deleted)))
}

pub async fn whoami(auth: RequireUser) -> impl IntoResponse {
    Json(ApiResponse::success(auth.user))
}

pub async fn create_user_token(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    body: Option<Json<CreateTokenRequest>>,
) -> impl IntoResponse {
    if !auth.user.admin && auth.user.username != username {
        return Err(ApiError::forbidden(
            "only system admins can mint tokens for other users",
        ));
    }

    let user = state
        .controller
        .store()
        .get_user(&username)?
        .ok_or_else(|| Error::not_found(&username))?;
    if user.lifecycle.archived {
        return Err(ApiError::from(Error::ArchivedObject(format!(
            "user {username} is archived"
        ))));
    }

    let req = body.map(|Json(b)| b).unwrap_or_default();
    let expires_at = match req.expires_in_seconds {
        Some(secs) if secs <= 0 => {
            return Err(ApiError::bad_request("expires_in_seconds must be positive"));
        }
        Some(secs) => Some(
            Duration::try_seconds(secs)
                .and_then(|d| Utc::now().checked_add_signed(d))
                .ok_or_else(|| ApiError::bad_request("expires_in_seconds is too large"))?,
        ),
        None => None,
    };

    let (raw, token) = issue_token(state.controller.store(), &username, expires_at)?;
    tracing::info!(actor = %auth.user.username, username = %username, token = %token.id, "minted token");

    let response = CreateTokenResponse {
        id: token.id,
        token: raw,
        username: token.username,
        created_at: token.created_at,
        expires_at: token.expires_at,
    };
    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(response))))
}
