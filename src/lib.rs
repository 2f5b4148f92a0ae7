//! # headb
//!
//! Identity and permission core for a multi-tenant JSON document service:
//! device-flow sign-in, encrypted bearer API keys and per-database role
//! grants. Usable both as a standalone server and as a library.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use headb::config::{Secrets, ServerConfig};
//! use headb::identity::Identity;
//! use headb::oauth::GithubClient;
//! use headb::server::{AppState, create_router};
//! use headb::store::{SqliteStore, Store};
//!
//! let config = ServerConfig::default();
//! let secrets = Secrets::from_env()?;
//! let store = SqliteStore::new(config.db_path())?;
//! store.initialize()?;
//!
//! let provider = GithubClient::new(&secrets.oauth_client_id, config.oauth.clone())?;
//! let identity = Identity::new(
//!     Arc::new(store),
//!     Arc::new(provider),
//!     &secrets,
//!     config.hashing,
//!     config.key_lifetime,
//! )?;
//! let router = create_router(Arc::new(AppState::new(identity)));
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `headb` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod oauth;
pub mod permissions;
pub mod server;
pub mod store;
pub mod types;
