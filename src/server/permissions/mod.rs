mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::server::AppState;

pub fn permissions_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/permissions", post(handlers::create_permission))
        .route("/permissions/can", get(handlers::can))
        .route("/permissions/{id}", delete(handlers::delete_permission))
}
