mod helpers;
mod middleware;
mod token;

pub use helpers::{TokenValidationError, ValidatedToken, validate_token};
pub use middleware::{AuthError, RequireUser};
pub use token::{TokenGenerator, issue_token, parse_token};
