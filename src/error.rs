use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::error::AuthError;

/// Boundary error type for HTTP handlers. Domain errors stay tagged until
/// this point; the mapping to a status code happens here and nowhere else.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::Auth(auth) => match auth {
                // Unknown user and wrong password stay distinguishable on the
                // wire; collapsing them would be a client-visible change.
                AuthError::DuplicateUser => {
                    (StatusCode::CONFLICT, "User already exists".to_string())
                }
                AuthError::UserNotFound => (StatusCode::NOT_FOUND, "User not found".to_string()),
                AuthError::InvalidPassword => {
                    (StatusCode::UNAUTHORIZED, "Wrong password".to_string())
                }
                AuthError::AccessExpired | AuthError::TokenMismatch => {
                    (StatusCode::UNAUTHORIZED, "Check access token".to_string())
                }
                AuthError::RefreshExpired => (
                    StatusCode::UNAUTHORIZED,
                    "Check id or refresh token".to_string(),
                ),
                AuthError::Storage(err) => {
                    tracing::error!(error = %err, "storage failure");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "Storage unavailable".to_string(),
                    )
                }
                AuthError::Signing(err) => {
                    tracing::error!(error = %err, "token signing failure");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal error".to_string(),
                    )
                }
                AuthError::Internal(err) => {
                    tracing::error!(error = %err, "internal auth failure");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal error".to_string(),
                    )
                }
            },
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
