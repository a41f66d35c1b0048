//! # MBEE
//!
//! A model-based engineering collaboration server built around hierarchical
//! organization and project permissions. Usable both as a standalone binary
//! and as a library.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mbee::config::ServerConfig;
//! use mbee::events::TracingNotifier;
//! use mbee::server::{AppState, create_router};
//! use mbee::store::{SqliteStore, Store};
//!
//! let config = ServerConfig::default();
//! let store = SqliteStore::new(config.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store), Arc::new(TracingNotifier), config));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `mbee` binary. Disable with `default-features = false`.

pub mod auth;
pub mod authz;
pub mod config;
pub mod controllers;
pub mod error;
pub mod events;
pub mod server;
pub mod setup;
pub mod store;
pub mod types;
pub mod validation;
