use futures_util::stream::{self, Stream, StreamExt};
use reqwest::header::ACCEPT;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use super::agent::Connector;
use super::sse::SseDecoder;
use super::ClientError;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<String, ClientError>> + Send>>;

/// Opens `GET /api/v1/notifications/stream` with a bearer token.
#[derive(Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpConnector {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, token)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn stream_url(&self) -> String {
        format!("{}/api/v1/notifications/stream", self.base_url)
    }
}

impl Connector for HttpConnector {
    type Stream = EventStream;

    fn open(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Self::Stream, ClientError>> + Send {
        let request = self
            .client
            .get(self.stream_url())
            .query(&[("user_id", user_id)])
            .bearer_auth(&self.token)
            .header(ACCEPT, "text/event-stream");

        async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ClientError::Status(status));
            }
            Ok(decode_stream(response.bytes_stream()))
        }
    }
}

/// Turn a byte stream into a stream of SSE `data` payloads. The first
/// transport error is yielded once and ends the stream.
pub fn decode_stream<S, B, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    let state = (
        Box::pin(bytes),
        SseDecoder::new(),
        VecDeque::<String>::new(),
        false,
    );

    Box::pin(stream::unfold(
        state,
        |(mut bytes, mut decoder, mut pending, failed)| async move {
            loop {
                if let Some(payload) = pending.pop_front() {
                    return Some((Ok(payload), (bytes, decoder, pending, failed)));
                }
                if failed {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.feed(chunk.as_ref())),
                    Some(Err(e)) => {
                        return Some((Err(e.into()), (bytes, decoder, pending, true)));
                    }
                    None => return None,
                }
            }
        },
    ))
}
