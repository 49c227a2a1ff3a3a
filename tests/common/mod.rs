#![allow(dead_code)]

use axum::body::Body;
use clinicnotify::db;
use clinicnotify::models::user::{CreateUser, User};
use clinicnotify::realtime::dispatcher::Dispatcher;
use clinicnotify::realtime::registry::ConnectionRegistry;
use clinicnotify::routes;
use clinicnotify::state::AppState;
use http::{Method, Request};
use sqlx::SqlitePool;
use std::time::Duration;

/// A user created for testing, bundling the User record with its raw token.
pub struct TestUser {
    pub user: User,
    pub token: String,
}

impl TestUser {
    /// Returns the Authorization header value (`"Bearer xxx"`).
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    pub fn id(&self) -> &str {
        &self.user.id
    }
}

/// Test server that owns an in-memory SQLite pool and full AppState.
/// Each instance is isolated, so tests can run in parallel.
pub struct TestServer {
    pub state: AppState,
}

impl TestServer {
    pub async fn new() -> Self {
        let pool = db::create_pool("sqlite::memory:")
            .await
            .expect("failed to create test pool");

        let state = AppState {
            db: pool,
            dispatcher: Dispatcher::new(ConnectionRegistry::new()),
            sse_keep_alive: Duration::from_secs(15),
            token_ttl_days: 30,
        };

        Self { state }
    }

    /// Returns an Axum Router wired to this server's state for `oneshot()` calls.
    pub fn router(&self) -> axum::Router {
        routes::router(self.state.clone())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.state.db
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        self.state.dispatcher.registry()
    }

    /// Binds a TCP listener on port 0, spawns the server, and returns the base URL.
    pub async fn spawn(&self) -> String {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://127.0.0.1:{}", addr.port())
    }

    /// Create a user and issue a bearer token for it.
    pub async fn create_user_with_token(&self, username: &str) -> TestUser {
        let user = db::users::create_user(
            self.pool(),
            &CreateUser {
                username: username.to_string(),
                display_name: None,
            },
            None,
        )
        .await
        .expect("failed to create test user");

        let token = db::auth::issue_token(self.pool(), &user.id, 30)
            .await
            .expect("failed to issue test token");

        TestUser { user, token }
    }
}

/// Build an in-memory app router.
pub async fn test_app() -> axum::Router {
    TestServer::new().await.router()
}

/// Build a JSON request with an optional bearer token.
pub fn json_request(
    method: Method,
    uri: &str,
    auth: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header("Authorization", auth);
    }
    match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Parse a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
