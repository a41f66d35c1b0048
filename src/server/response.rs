use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::controllers::{Mutation, PropagationWarning};
use crate::error::Error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PropagationWarning>,
}

impl<T: Serialize> ApiResponse<T> {
    #[must_use]
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            warnings: Vec::new(),
        }
    }
}

impl<T: Serialize> From<Mutation<T>> for ApiResponse<Vec<T>> {
    fn from(m: Mutation<T>) -> Self {
        Self {
            data: Some(m.data),
            error: None,
            warnings: m.warnings,
        }
    }
}

/// API error that converts to a proper HTTP response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "ValidationError",
            message: message.into(),
        }
    }

    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            kind: "AuthorizationError",
            message: message.into(),
        }
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) | Error::InvalidPermissionValue(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Authorization(_) | Error::ArchivedObject(_) | Error::ImmutableField(_) => {
            StatusCode::FORBIDDEN
        }
        Error::DependentPermission(_) | Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Unauthorized | Error::InvalidTokenFormat => StatusCode::UNAUTHORIZED,
        Error::Database(_)
        | Error::Serialization(_)
        | Error::Io(_)
        | Error::Config(_)
        | Error::TokenLookupCollision => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if !err.is_client_error() {
            tracing::error!("request failed: {err}");
            return Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                kind: "InternalError",
                message: "Internal server error".to_string(),
            };
        }
        Self {
            status: status_for(&err),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            data: None,
            error: Some(ErrorBody {
                kind: self.kind,
                message: self.message,
            }),
            warnings: Vec::new(),
        };
        (self.status, Json(body)).into_response()
    }
}
