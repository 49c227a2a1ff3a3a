//! Client side of the notification stream: an SSE decoder, an HTTP transport,
//! and [`agent::NotificationAgent`], which keeps a stream open and routes
//! incoming events to per-type listeners.

pub mod agent;
pub mod http;
pub mod sse;

pub use agent::{AgentOptions, ConnectionState, Connector, NotificationAgent};
pub use http::HttpConnector;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded with {0}")]
    Status(reqwest::StatusCode),
    #[error("stream failed: {0}")]
    Transport(String),
}
