use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Business-rule failures of the credential flow. Converted to an HTTP
/// status only at the handler boundary; service code stays status-free.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    BadRequest(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email already registered")]
    EmailTaken,
    #[error("user not found")]
    UserNotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            // The public API reports a duplicate email as a plain 400;
            // the variant stays distinct so callers can tell it apart.
            AuthError::EmailTaken => StatusCode::BAD_REQUEST,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AuthError::BadRequest(msg) => msg.clone(),
            AuthError::InvalidCredentials => "Invalid credentials".into(),
            AuthError::EmailTaken => "Email already registered".into(),
            AuthError::UserNotFound => "User not found".into(),
            AuthError::Internal(e) => {
                // Detail is logged here and never leaks to the client.
                error!(error = %e, "internal error");
                "Internal server error".into()
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}
