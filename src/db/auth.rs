use sqlx::SqlitePool;

use crate::error::AppError;
use crate::middleware::auth::{create_token_hash, generate_token};

/// Issue a new bearer token for `user_id`, valid for `ttl_days`. Returns the raw token.
pub async fn issue_token(pool: &SqlitePool, user_id: &str, ttl_days: i64) -> Result<String, AppError> {
    let token = generate_token();
    let token_hash = create_token_hash(&token);
    let expires_at = (chrono::Utc::now() + chrono::Duration::days(ttl_days))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string();

    sqlx::query("INSERT INTO user_tokens (token_hash, user_id, expires_at) VALUES (?, ?, ?)")
        .bind(&token_hash)
        .bind(user_id)
        .bind(&expires_at)
        .execute(pool)
        .await?;

    Ok(token)
}

pub async fn revoke_token(pool: &SqlitePool, token: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM user_tokens WHERE token_hash = ?")
        .bind(create_token_hash(token))
        .execute(pool)
        .await?;
    Ok(())
}
