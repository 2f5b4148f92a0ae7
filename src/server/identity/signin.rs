use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse};

pub async fn sign_in(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (response, _poller) = state.identity.sign_in().await.map_err(|e| {
        if matches!(e.kind(), crate::error::ErrorKind::Internal) {
            tracing::error!("sign-in failed: {e}");
            ApiError::internal(
                "Could not start sign-in, please try again later or contact the administrator",
            )
        } else {
            ApiError::from(e)
        }
    })?;

    Ok::<_, ApiError>(Json(ApiResponse::success(response)))
}
