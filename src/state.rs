use sqlx::SqlitePool;
use std::time::Duration;

use crate::realtime::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub dispatcher: Dispatcher,
    pub sse_keep_alive: Duration,
    pub token_ttl_days: i64,
}
