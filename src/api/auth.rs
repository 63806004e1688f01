//! Bearer token gate in front of every action route.

use super::state::ApiState;
use crate::error::AuthError;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
struct UnauthorizedResponse {
    success: bool,
    error: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(UnauthorizedResponse {
                success: false,
                error: "Unauthorized",
            }),
        )
            .into_response()
    }
}

/// Accept exactly `Bearer <secret>`, compared byte for byte.
pub fn check_bearer(header_value: Option<&str>, secret: &str) -> Result<(), AuthError> {
    let value = header_value.ok_or(AuthError::MissingHeader)?;
    let token = value.strip_prefix("Bearer ").ok_or(AuthError::NotBearer)?;
    if token.as_bytes() == secret.as_bytes() {
        Ok(())
    } else {
        Err(AuthError::InvalidToken)
    }
}

pub(super) async fn require_bearer(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if let Err(error) = check_bearer(header_value, &state.service_api_key) {
        tracing::warn!(%error, path = %request.uri().path(), "rejected request");
        return Err(error);
    }

    Ok(next.run(request).await)
}
