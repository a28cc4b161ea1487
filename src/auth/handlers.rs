use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            ChangePasswordRequest, CredentialsRequest, ForgotPasswordRequest, PublicUser,
            ResetPasswordRequest, SignUpRequest, StatusMessage, TokenResponse,
        },
        error::AuthError,
        services,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(sign_up))
        .route("/auth/signin", post(sign_in))
        .route("/auth/changePassword", put(change_password))
        .route("/auth/forgotPassword", put(forgot_password))
        .route("/auth/resetPassword/:rtoken", put(reset_password))
}

#[instrument(skip(state, payload))]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<PublicUser>), AuthError> {
    let user = services::sign_up(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, payload))]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    let token = services::sign_in(&state, &payload.email, &payload.password).await?;
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<StatusMessage>, AuthError> {
    services::change_password(
        &state,
        &payload.email,
        &payload.old_password,
        &payload.new_password,
    )
    .await?;
    Ok(Json(StatusMessage {
        message: "Password changed".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<StatusMessage>, AuthError> {
    services::forgot_password(&state, &payload.email).await?;
    Ok(Json(StatusMessage {
        message: services::FORGOT_PASSWORD_MESSAGE.into(),
    }))
}

// rtoken is skipped so the secret never lands in request spans
#[instrument(skip(state, payload, rtoken))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(rtoken): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<StatusMessage>, AuthError> {
    services::reset_password(&state, &rtoken, &payload.new_password).await?;
    Ok(Json(StatusMessage {
        message: "Password reset".into(),
    }))
}
