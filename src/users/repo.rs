use crate::auth::repo_types::User;
use sqlx::PgPool;
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, email, nickname, password_hash, is_admin, deleted_at, created_at, updated_at";

pub async fn list_active(db: &PgPool) -> anyhow::Result<Vec<User>> {
    let rows = sqlx::query_as::<_, User>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM users
        WHERE deleted_at IS NULL
        ORDER BY created_at DESC
        "#,
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn list_deleted(db: &PgPool) -> anyhow::Result<Vec<User>> {
    let rows = sqlx::query_as::<_, User>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM users
        WHERE deleted_at IS NOT NULL
        ORDER BY deleted_at DESC
        "#,
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn update_nickname(
    db: &PgPool,
    id: Uuid,
    nickname: &str,
) -> anyhow::Result<Option<User>> {
    let row = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
        SET nickname = $2, updated_at = now()
        WHERE id = $1 AND deleted_at IS NULL
        RETURNING {USER_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(nickname)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Soft delete: the row stays, the flag is set. Only an active row
/// qualifies, so deleting twice reports not-found.
pub async fn soft_delete(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
    let row = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
        SET deleted_at = now(), updated_at = now()
        WHERE id = $1 AND deleted_at IS NULL
        RETURNING {USER_COLUMNS}
        "#,
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn restore(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
    let row = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
        SET deleted_at = NULL, updated_at = now()
        WHERE id = $1 AND deleted_at IS NOT NULL
        RETURNING {USER_COLUMNS}
        "#,
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}
