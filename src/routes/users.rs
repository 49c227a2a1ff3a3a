use axum::extract::State;
use axum::Json;

use crate::db;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub async fn get_current_user(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = db::users::get_user(&state.db, &auth.user_id).await?;
    let unread = db::notifications::count_unread(&state.db, &auth.user_id).await?;
    Ok(Json(serde_json::json!({
        "data": {
            "user": user,
            "unread_notifications": unread,
            "connected": state.dispatcher.registry().contains(&auth.user_id)
        }
    })))
}
