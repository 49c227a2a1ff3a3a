//! Server side of real-time notification delivery.
//!
//! A [`registry::ConnectionRegistry`] holds at most one open stream per user,
//! the [`dispatcher::Dispatcher`] pushes events into it, and
//! [`stream::notification_stream`] is the SSE endpoint that owns each stream.

pub mod dispatcher;
pub mod events;
pub mod registry;
pub mod stream;
