use sqlx::{Row, SqlitePool};

use crate::error::AppError;
use crate::models::notification::{CreateNotification, Notification};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 100;

fn row_to_notification(row: sqlx::sqlite::SqliteRow) -> Notification {
    let data: String = row.get("data");
    Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: row.get("kind"),
        title: row.get("title"),
        message: row.get("message"),
        data: serde_json::from_str(&data).unwrap_or_else(|_| serde_json::json!({})),
        read: row.get("read"),
        created_at: row.get("created_at"),
    }
}

const SELECT_NOTIFICATIONS: &str =
    "SELECT id, user_id, kind, title, message, data, read, created_at FROM notifications";

pub async fn get_notification(pool: &SqlitePool, id: &str) -> Result<Notification, AppError> {
    let row = sqlx::query(&format!("{SELECT_NOTIFICATIONS} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown_notification".to_string()))?;

    Ok(row_to_notification(row))
}

pub async fn create_notification(
    pool: &SqlitePool,
    input: &CreateNotification,
) -> Result<Notification, AppError> {
    let id = uuid::Uuid::new_v4().to_string();
    let data = input
        .data
        .clone()
        .unwrap_or_else(|| serde_json::json!({}))
        .to_string();

    sqlx::query(
        "INSERT INTO notifications (id, user_id, kind, title, message, data) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&input.user_id)
    .bind(&input.kind)
    .bind(&input.title)
    .bind(&input.message)
    .bind(&data)
    .execute(pool)
    .await?;

    get_notification(pool, &id).await
}

/// Newest first. `limit` is clamped to `1..=100` and defaults to 50.
pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: &str,
    unread_only: bool,
    limit: Option<i64>,
) -> Result<Vec<Notification>, AppError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let filter = if unread_only { " AND read = 0" } else { "" };

    let rows = sqlx::query(&format!(
        "{SELECT_NOTIFICATIONS} WHERE user_id = ?{filter} ORDER BY created_at DESC, rowid DESC LIMIT ?"
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(row_to_notification).collect())
}

/// Mark one of the user's notifications read. Someone else's notification
/// is reported as not found.
pub async fn mark_read(
    pool: &SqlitePool,
    user_id: &str,
    id: &str,
) -> Result<Notification, AppError> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("unknown_notification".to_string()));
    }

    get_notification(pool, id).await
}

/// Returns the number of notifications that changed state.
pub async fn mark_all_read(pool: &SqlitePool, user_id: &str) -> Result<u64, AppError> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE user_id = ? AND read = 0")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count_unread(pool: &SqlitePool, user_id: &str) -> Result<i64, AppError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read = 0")
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}
