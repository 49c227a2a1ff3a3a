use axum::extract::{Path, Query, State};
use axum::Json;

use crate::db;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::notification::{CreateNotification, ListNotificationsQuery};
use crate::realtime::events::{event_type, NotificationEvent};
use crate::realtime::registry::DeliveryOutcome;
use crate::state::AppState;

pub async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let notifications =
        db::notifications::list_for_user(&state.db, &auth.user_id, query.unread, query.limit)
            .await?;
    Ok(Json(serde_json::json!({ "data": notifications })))
}

/// Store a notification for `user_id`, then push it to their open stream.
/// The record is kept whether or not the push reaches anyone.
pub async fn create_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<CreateNotification>,
) -> Result<Json<serde_json::Value>, AppError> {
    if input.title.trim().is_empty() || input.message.trim().is_empty() {
        return Err(AppError::BadRequest(
            "title and message are required".to_string(),
        ));
    }
    if input.kind.is_empty() || input.kind.len() > 64 {
        return Err(AppError::BadRequest(
            "kind must be between 1 and 64 characters".to_string(),
        ));
    }
    if !db::users::user_exists(&state.db, &input.user_id).await? {
        return Err(AppError::NotFound("unknown_user".to_string()));
    }

    let notification = db::notifications::create_notification(&state.db, &input).await?;

    let payload = notification.stream_payload();
    let outcome = if notification.kind == event_type::NOTIFICATION {
        state.dispatcher.send(&notification.user_id, payload)
    } else {
        let event = NotificationEvent::new(notification.kind.clone(), payload);
        state.dispatcher.send_event(&notification.user_id, &event)
    };

    tracing::info!(
        notification_id = %notification.id,
        sender = %auth.user_id,
        recipient = %notification.user_id,
        delivered = outcome == DeliveryOutcome::Delivered,
        "notification created"
    );

    Ok(Json(serde_json::json!({
        "data": {
            "notification": notification,
            "delivered": outcome == DeliveryOutcome::Delivered
        }
    })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(notification_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let notification =
        db::notifications::mark_read(&state.db, &auth.user_id, &notification_id).await?;
    Ok(Json(serde_json::json!({ "data": notification })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated = db::notifications::mark_all_read(&state.db, &auth.user_id).await?;
    Ok(Json(serde_json::json!({ "data": { "updated": updated } })))
}
