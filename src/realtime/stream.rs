use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;

use super::events::{event_type, NotificationEvent};
use super::registry::{ConnectionRegistry, DeliveryChannel};
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub user_id: Option<String>,
}

/// Removes the registry entry when the response stream is dropped,
/// unless a newer stream for the same user has already replaced it.
struct StreamGuard {
    registry: ConnectionRegistry,
    user_id: String,
    connection_id: u64,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if self
            .registry
            .remove_connection(&self.user_id, self.connection_id)
        {
            tracing::info!(
                user_id = %self.user_id,
                connection_id = self.connection_id,
                "notification stream closed"
            );
        } else {
            tracing::debug!(
                user_id = %self.user_id,
                connection_id = self.connection_id,
                "notification stream ended after replacement"
            );
        }
    }
}

/// `GET /api/v1/notifications/stream`
pub async fn notification_stream(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<StreamParams>,
) -> Result<Response, AppError> {
    if let Some(ref requested) = params.user_id {
        if *requested != auth.user_id {
            return Err(AppError::Forbidden(
                "cannot open a stream for another user".to_string(),
            ));
        }
    }

    let (channel, rx) = DeliveryChannel::new();
    let connection_id = channel.id();

    let connected = NotificationEvent::new(
        event_type::CONNECTED,
        json!({ "user_id": auth.user_id, "connection_id": connection_id }),
    );
    // The receiver is alive, so the write cannot fail.
    let _ = channel.write(connected.to_frame());

    let registry = state.dispatcher.registry().clone();
    registry.add(&auth.user_id, channel);
    tracing::info!(
        user_id = %auth.user_id,
        connection_id,
        connections = registry.count(),
        "notification stream opened"
    );

    let guard = StreamGuard {
        registry,
        user_id: auth.user_id,
        connection_id,
    };

    let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let frame = rx.recv().await?;
        Some((Ok::<_, Infallible>(Event::default().data(frame)), (rx, guard)))
    });

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::new().interval(state.sse_keep_alive))
        .into_response())
}
