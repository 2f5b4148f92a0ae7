use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::{Caller, RequireCaller};
use crate::server::AppState;
use crate::server::dto::{CanQuery, CanResponse, CreatePermissionRequest};
use crate::server::response::{ApiError, ApiResponse, OptionExt};
use crate::types::ApiKey;

/// Permission routes act only on keys of the caller's own user, and only
/// with an admin key.
fn owned_key(state: &AppState, caller: &Caller, key_id: &str) -> Result<ApiKey, ApiError> {
    state.identity.require_admin(caller)?;
    state
        .identity
        .store()
        .get_api_key_for_user(key_id, &caller.user_id)?
        .or_not_found("API key not found")
}

pub async fn create_permission(
    RequireCaller(caller): RequireCaller,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePermissionRequest>,
) -> impl IntoResponse {
    let key = owned_key(&state, &caller, &req.key_id)?;

    let permission = state
        .identity
        .permissions()
        .add(&key.id, req.database_id.as_deref(), &req.role, &caller.user_id)
        .map_err(|e| match e {
            crate::error::Error::NotFound => ApiError::not_found("Database not found"),
            crate::error::Error::AlreadyExists => ApiError::conflict(
                "Could not save permission, a permission for this key and database already exists",
            ),
            e => ApiError::from(e),
        })?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(permission))))
}

pub async fn delete_permission(
    RequireCaller(caller): RequireCaller,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.identity.require_admin(&caller)?;
    let permissions = state.identity.permissions();

    let permission = permissions
        .get(&id)?
        .or_not_found("Permission not found")?;
    // Hide grants on other users' keys behind the same 404.
    owned_key(&state, &caller, &permission.key_id).map_err(|e| {
        if e.status == StatusCode::NOT_FOUND {
            ApiError::not_found("Permission not found")
        } else {
            e
        }
    })?;

    permissions.remove(&permission.id)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn can(
    RequireCaller(caller): RequireCaller,
    State(state): State<Arc<AppState>>,
    Query(query): Query<CanQuery>,
) -> impl IntoResponse {
    let key = owned_key(&state, &caller, &query.key_id)?;

    let allowed = state.identity.permissions().can(
        &key.id,
        query.database_id.as_deref(),
        &query.operation,
    )?;

    Ok::<_, ApiError>(Json(ApiResponse::success(CanResponse { allowed })))
}
