use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::{
        dto::{PublicUser, StatusMessage},
        error::AuthError,
        repo_types::User,
        services::AuthUser,
    },
    state::AppState,
    users::dto::UpdateUserRequest,
};

use super::repo;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/deleted", get(list_deleted_users))
        .route("/users/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/users/:id/restore", put(restore_user))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
) -> Result<Json<Vec<PublicUser>>, AuthError> {
    let users = repo::list_active(&state.db)
        .await
        .map_err(AuthError::Internal)?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn list_deleted_users(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
) -> Result<Json<Vec<PublicUser>>, AuthError> {
    let users = repo::list_deleted(&state.db)
        .await
        .map_err(AuthError::Internal)?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, AuthError> {
    let user = User::find_by_id(&state.db, id)
        .await
        .map_err(AuthError::Internal)?
        .ok_or(AuthError::UserNotFound)?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<PublicUser>, AuthError> {
    let nickname = payload
        .nickname
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AuthError::BadRequest("Nothing to update".into()))?;

    let user = repo::update_nickname(&state.db, id, nickname.trim())
        .await
        .map_err(AuthError::Internal)?
        .ok_or(AuthError::UserNotFound)?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusMessage>, AuthError> {
    repo::soft_delete(&state.db, id)
        .await
        .map_err(AuthError::Internal)?
        .ok_or(AuthError::UserNotFound)?;
    Ok(Json(StatusMessage {
        message: format!("User {id} deleted"),
    }))
}

#[instrument(skip(state))]
pub async fn restore_user(
    State(state): State<AppState>,
    AuthUser(_caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, AuthError> {
    let user = repo::restore(&state.db, id)
        .await
        .map_err(AuthError::Internal)?
        .ok_or(AuthError::UserNotFound)?;
    Ok(Json(user.into()))
}
