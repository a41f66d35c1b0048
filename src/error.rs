use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("not found: {}", .0.join(", "))]
    NotFound(Vec<String>),

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    ArchivedObject(String),

    #[error("{0}")]
    DependentPermission(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ImmutableField(String),

    #[error("invalid permission value: {0}")]
    InvalidPermissionValue(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid token format")]
    InvalidTokenFormat,

    #[error("token lookup collision")]
    TokenLookupCollision,
}

impl Error {
    /// Single missing id.
    pub fn not_found(id: impl Into<String>) -> Self {
        Error::NotFound(vec![id.into()])
    }

    /// Stable name of the error kind, surfaced to API callers.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "ValidationError",
            Error::NotFound(_) => "NotFoundError",
            Error::Authorization(_) => "AuthorizationError",
            Error::ArchivedObject(_) => "ArchivedObjectError",
            Error::DependentPermission(_) => "DependentPermissionError",
            Error::Conflict(_) => "ConflictError",
            Error::ImmutableField(_) => "ImmutableFieldError",
            Error::InvalidPermissionValue(_) => "InvalidPermissionValue",
            Error::Unauthorized | Error::InvalidTokenFormat => "AuthenticationError",
            Error::Database(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Config(_)
            | Error::TokenLookupCollision => "InternalError",
        }
    }

    /// True for errors produced by validation or authorization, as opposed to
    /// infrastructure failures.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.kind() != "InternalError"
    }
}

pub type Result<T> = std::result::Result<T, Error>;
