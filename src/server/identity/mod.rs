mod keys;
mod signin;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::server::AppState;

pub fn identity_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sign-in", post(signin::sign_in))
        .route("/me", get(keys::whoami))
        .route("/keys", get(keys::list_keys))
        .route("/keys", post(keys::generate_key))
        .route("/keys/{id}", delete(keys::delete_key))
}
