use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;

use super::{TokenGenerator, parse_token};
use crate::store::Store;
use crate::types::{Token, User};

#[derive(Debug, PartialEq, Eq)]
pub enum TokenValidationError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    UserArchived,
    InternalError,
}

pub struct ValidatedToken {
    pub token: Token,
    pub user: User,
}

/// Extracts a token string from a Basic auth header.
/// Expects format: Basic base64(x-token:actual_token)
pub fn extract_basic_auth_token(header: &str) -> Option<String> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let (username, password) = credentials.split_once(':')?;
    if username != "x-token" {
        return None;
    }

    Some(password.to_string())
}

/// Extracts token from Authorization header (Bearer or Basic).
/// Returns None if no auth header is present.
pub fn extract_token_from_header(
    auth_header: Option<&str>,
) -> Result<Option<String>, TokenValidationError> {
    let Some(header) = auth_header else {
        return Ok(None);
    };
    if let Some(token) = header.strip_prefix("Bearer ") {
        return Ok(Some(token.to_string()));
    }
    if header.starts_with("Basic ") {
        return extract_basic_auth_token(header)
            .ok_or(TokenValidationError::InvalidToken)
            .map(Some);
    }
    Err(TokenValidationError::InvalidScheme)
}

/// Validates a raw token against the store and resolves its owner.
/// Archived users cannot authenticate.
pub fn validate_token(
    store: &dyn Store,
    raw_token: &str,
) -> Result<ValidatedToken, TokenValidationError> {
    let (lookup, _secret) =
        parse_token(raw_token).map_err(|_| TokenValidationError::InvalidToken)?;

    let token = store
        .get_token_by_lookup(&lookup)
        .map_err(|_| TokenValidationError::InternalError)?
        .ok_or(TokenValidationError::InvalidToken)?;

    let generator = TokenGenerator::new();
    if !generator
        .verify(raw_token, &token.token_hash)
        .map_err(|_| TokenValidationError::InternalError)?
    {
        return Err(TokenValidationError::InvalidToken);
    }

    if token.expires_at.is_some_and(|at| at < Utc::now()) {
        return Err(TokenValidationError::TokenExpired);
    }

    let user = store
        .get_user(&token.username)
        .map_err(|_| TokenValidationError::InternalError)?
        .ok_or(TokenValidationError::InvalidToken)?;
    if user.lifecycle.archived {
        return Err(TokenValidationError::UserArchived);
    }

    if let Err(e) = store.update_token_last_used(&token.id) {
        tracing::warn!("Failed to update token last_used_at: {e}");
    }

    Ok(ValidatedToken { token, user })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::auth::issue_token;
    use crate::store::{SqliteStore, WriteBatch};

    fn store_with(users: Vec<User>) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .commit(&WriteBatch {
                insert_users: users,
                ..Default::default()
            })
            .unwrap();
        store
    }

    #[test]
    fn test_extract_bearer_and_basic() {
        let token = "mbee_12345678_123456789012345678901234";
        let bearer = format!("Bearer {token}");
        assert_eq!(
            extract_token_from_header(Some(bearer.as_str())).unwrap(),
            Some(token.to_string())
        );

        let basic = format!("Basic {}", STANDARD.encode(format!("x-token:{token}")));
        assert_eq!(
            extract_token_from_header(Some(basic.as_str())).unwrap(),
            Some(token.to_string())
        );

        let wrong_user = format!("Basic {}", STANDARD.encode(format!("carol:{token}")));
        assert_eq!(
            extract_token_from_header(Some(wrong_user.as_str())),
            Err(TokenValidationError::InvalidToken)
        );
        assert_eq!(
            extract_token_from_header(Some("Digest abc")),
            Err(TokenValidationError::InvalidScheme)
        );
        assert_eq!(extract_token_from_header(None).unwrap(), None);
    }

    #[test]
    fn test_validate_resolves_user() {
        let store = store_with(vec![User::new("carol", false, None)]);
        let (raw, _) = issue_token(&store, "carol", None).unwrap();

        let validated = validate_token(&store, &raw).unwrap();
        assert_eq!(validated.user.username, "carol");
        let stored = store.get_token_by_lookup(&validated.token.token_lookup).unwrap().unwrap();
        assert!(stored.last_used_at.is_some());
    }

    #[test]
    fn test_validate_rejects_expired() {
        let store = store_with(vec![User::new("carol", false, None)]);
        let (raw, _) = issue_token(&store, "carol", Some(Utc::now() - Duration::hours(1))).unwrap();
        assert_eq!(
            validate_token(&store, &raw).err(),
            Some(TokenValidationError::TokenExpired)
        );
    }

    #[test]
    fn test_validate_rejects_archived_user() {
        let mut carol = User::new("carol", false, None);
        carol.lifecycle.archived = true;
        let store = store_with(vec![carol]);
        let (raw, _) = issue_token(&store, "carol", None).unwrap();
        assert_eq!(
            validate_token(&store, &raw).err(),
            Some(TokenValidationError::UserArchived)
        );
    }
}
