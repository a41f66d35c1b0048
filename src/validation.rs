use crate::error::{Error, Result};

const MAX_ID_LEN: usize = 64;
const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 36;

fn is_valid_id_char(c: char, allow_period: bool) -> bool {
    c.is_ascii_lowercase()
        || c.is_ascii_digit()
        || c == '-'
        || c == '_'
        || (allow_period && c == '.')
}

fn validate_id(id: &str, entity: &str, min_len: usize, max_len: usize, allow_period: bool) -> Result<()> {
    if id.is_empty() {
        return Err(Error::Validation(format!("{entity} id cannot be empty")));
    }
    if id.len() < min_len || id.len() > max_len {
        return Err(Error::Validation(format!(
            "{entity} id must be between {min_len} and {max_len} characters"
        )));
    }
    if !id.chars().all(|c| is_valid_id_char(c, allow_period)) {
        let mut allowed = "lowercase alphanumeric characters, hyphens, and underscores".to_string();
        if allow_period {
            allowed.push_str(", and periods");
        }
        return Err(Error::Validation(format!(
            "{entity} id {id} can only contain {allowed}"
        )));
    }
    if !id.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(Error::Validation(format!(
            "{entity} id {id} must start with a letter or digit"
        )));
    }
    Ok(())
}

pub fn validate_org_id(id: &str) -> Result<()> {
    validate_id(id, "Organization", 1, MAX_ID_LEN, false)
}

/// Project ids are scoped to an organization, so `:` is reserved.
pub fn validate_project_id(id: &str) -> Result<()> {
    validate_id(id, "Project", 1, MAX_ID_LEN, false)
}

pub fn validate_username(username: &str) -> Result<()> {
    validate_id(username, "User", MIN_USERNAME_LEN, MAX_USERNAME_LEN, true)
}
