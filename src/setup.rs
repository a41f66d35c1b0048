//! Data directory bootstrap shared by `mbee init`, `mbee serve` and tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::auth::issue_token;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::events::TracingNotifier;
use crate::server::AppState;
use crate::store::{SqliteStore, Store};

pub const ADMIN_TOKEN_FILE: &str = ".admin_token";

pub struct Initialized {
    pub admin: String,
    pub token: String,
    pub token_file: PathBuf,
}

/// Creates the database, the default organization and a system admin with a
/// fresh token. Fails if the data directory was already initialized.
pub fn initialize(config: &ServerConfig, admin: &str) -> Result<Initialized> {
    config.validate()?;
    fs::create_dir_all(&config.data_dir)?;

    let token_file = config.data_dir.join(ADMIN_TOKEN_FILE);
    if token_file.exists() {
        return Err(Error::Conflict(format!(
            "already initialized, admin token exists at {}",
            token_file.display()
        )));
    }

    let state = open_state(config)?;
    let user = state.controller.bootstrap_admin(admin)?;
    if !user.admin {
        return Err(Error::Conflict(format!(
            "user {admin} exists and is not a system admin"
        )));
    }

    let (token, _) = issue_token(state.controller.store(), &user.username, None)?;
    fs::write(&token_file, &token)?;
    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    tracing::info!(admin = %user.username, "initialized {}", config.data_dir.display());
    Ok(Initialized {
        admin: user.username,
        token,
        token_file,
    })
}

/// Opens the store and makes sure the default organization exists.
pub fn open_state(config: &ServerConfig) -> Result<AppState> {
    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    let state = AppState::new(Arc::new(store), Arc::new(TracingNotifier), config.clone());
    state
        .controller
        .ensure_default_org(&config.default_organization_name)?;
    Ok(state)
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}
