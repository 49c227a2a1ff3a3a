use sqlx::{Row, SqlitePool};

use crate::error::AppError;
use crate::models::user::{CreateUser, User};

fn row_to_user(row: sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        created_at: row.get("created_at"),
    }
}

const SELECT_USERS: &str = "SELECT id, username, display_name, created_at FROM users";

pub async fn get_user(pool: &SqlitePool, user_id: &str) -> Result<User, AppError> {
    let row = sqlx::query(&format!("{SELECT_USERS} WHERE id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown_user".to_string()))?;

    Ok(row_to_user(row))
}

pub async fn user_exists(pool: &SqlitePool, user_id: &str) -> Result<bool, AppError> {
    let found = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Insert a user. With `password_hash` set to `None` the account has no
/// password login and can only authenticate with an issued bearer token.
pub async fn create_user(
    pool: &SqlitePool,
    input: &CreateUser,
    password_hash: Option<&str>,
) -> Result<User, AppError> {
    let id = uuid::Uuid::new_v4().to_string();
    let display_name = input.display_name.as_deref().unwrap_or(&input.username);

    sqlx::query("INSERT INTO users (id, username, display_name, password_hash) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(&input.username)
        .bind(display_name)
        .bind(password_hash)
        .execute(pool)
        .await?;

    get_user(pool, &id).await
}

/// Returns `(user_id, password_hash)` for a username that can log in.
pub async fn find_credentials(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<(String, String)>, AppError> {
    let row = sqlx::query_as::<_, (String, String)>(
        "SELECT id, password_hash FROM users WHERE username = ? AND password_hash IS NOT NULL",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn username_taken(pool: &SqlitePool, username: &str) -> Result<bool, AppError> {
    let existing = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(existing.is_some())
}
