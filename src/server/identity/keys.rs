use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireCaller;
use crate::server::AppState;
use crate::server::dto::{GenerateKeyRequest, GenerateKeyResponse};
use crate::server::response::{ApiError, ApiResponse};

pub async fn whoami(RequireCaller(caller): RequireCaller) -> impl IntoResponse {
    Json(ApiResponse::success(caller))
}

pub async fn list_keys(
    RequireCaller(caller): RequireCaller,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let keys = state.identity.list_api_keys(&caller)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(keys)))
}

pub async fn generate_key(
    RequireCaller(caller): RequireCaller,
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateKeyRequest>,
) -> impl IntoResponse {
    let issued = state
        .identity
        .generate_api_key(&caller, &req.role, req.database_id.as_deref())?;

    let response = GenerateKeyResponse {
        id: issued.key.id,
        api_key: issued.bearer,
    };

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

pub async fn delete_key(
    RequireCaller(caller): RequireCaller,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.identity.delete_api_key(&caller, &id).map_err(|e| match e {
        crate::error::Error::NotFound => ApiError::not_found("API key not found"),
        e => ApiError::from(e),
    })?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
