use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                           // unique user ID
    pub email: String,                      // unique among active users
    pub nickname: String,                   // display name
    #[serde(skip_serializing)]
    pub password_hash: String,              // Argon2 hash, not exposed in JSON
    pub is_admin: bool,                     // role flag carried in the JWT
    pub deleted_at: Option<OffsetDateTime>, // soft-delete marker; None = active
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
