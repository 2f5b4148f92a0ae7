use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, header::AUTHORIZATION, header::WWW_AUTHENTICATE, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::{Caller, extract_bearer};
use crate::error::{Error, ErrorKind};
use crate::server::AppState;

/// Extractor that requires a bearer resolving to an accepted user.
pub struct RequireCaller(pub Caller);

#[derive(Debug)]
pub enum AuthError {
    Unauthenticated,
    InternalError,
}

impl From<Error> for AuthError {
    fn from(err: Error) -> Self {
        match err.kind() {
            ErrorKind::Internal => {
                tracing::error!("authentication failed internally: {err}");
                AuthError::InternalError
            }
            _ => AuthError::Unauthenticated,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::Unauthenticated => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });
        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"headb\""),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireCaller {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        // A missing or non-Bearer header is treated as an empty bearer.
        let bearer = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(extract_bearer)
            .unwrap_or_default();

        let caller = state.identity.authenticate(bearer)?;
        Ok(RequireCaller(caller))
    }
}
