use futures_util::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::ClientError;
use crate::realtime::events::{NotificationEvent, WILDCARD};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Opens one notification stream. Dropping the returned stream closes it.
pub trait Connector: Send + Sync + 'static {
    type Stream: Stream<Item = Result<String, ClientError>> + Send + Unpin + 'static;

    fn open(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Self::Stream, ClientError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Fixed wait between a stream failing and the next open attempt.
    pub reconnect_delay: Duration,
    /// Consecutive reconnect attempts allowed without a successful open.
    /// `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: None,
        }
    }
}

pub type Listener = Arc<dyn Fn(&NotificationEvent) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner<C> {
    connector: C,
    options: AgentOptions,
    listeners: Mutex<HashMap<String, Listener>>,
    state: watch::Sender<ConnectionState>,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Held by the running task from before `open` until its stream is dropped.
    stream_slot: tokio::sync::Mutex<()>,
}

/// Keeps a notification stream open for one user and routes each event to
/// the listener registered for its type, plus the wildcard listener.
///
/// Each connection runs on its own tokio task. A failed or finished stream
/// is reopened after [`AgentOptions::reconnect_delay`].
pub struct NotificationAgent<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> NotificationAgent<C> {
    pub fn new(connector: C) -> Self {
        Self::with_options(connector, AgentOptions::default())
    }

    pub fn with_options(connector: C, options: AgentOptions) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                connector,
                options,
                listeners: Mutex::new(HashMap::new()),
                state,
                task: Mutex::new(None),
                stream_slot: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver that sees every `Connected` / `Disconnected` transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Open a stream for `user_id`. Any stream already open is closed before
    /// the new one is requested.
    pub fn connect(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        let mut task = lock(&self.inner.task);
        if let Some(previous) = task.take() {
            // The new task cannot open until this one has released the stream slot.
            previous.abort();
        }
        *task = Some(tokio::spawn(Arc::clone(&self.inner).run(user_id)));
    }

    /// Close the stream, drop every listener and stop reconnecting.
    pub async fn disconnect(&self) {
        let previous = lock(&self.inner.task).take();
        if let Some(handle) = previous {
            handle.abort();
            let _ = handle.await;
        }
        lock(&self.inner.listeners).clear();
        self.inner.state.send_replace(ConnectionState::Disconnected);
    }

    /// Register `callback` for `event_type`, replacing any previous one.
    pub fn subscribe<F>(&self, event_type: impl Into<String>, callback: F)
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        lock(&self.inner.listeners).insert(event_type.into(), Arc::new(callback));
    }

    /// Register the wildcard listener, called for every event.
    pub fn subscribe_all<F>(&self, callback: F)
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.subscribe(WILDCARD, callback);
    }

    pub fn unsubscribe(&self, event_type: &str) {
        lock(&self.inner.listeners).remove(event_type);
    }

    /// Route one raw `data` payload as if it had arrived on the stream.
    pub fn handle_message(&self, raw: &str) {
        self.inner.dispatch(raw);
    }
}

impl<C: Connector> Drop for NotificationAgent<C> {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.inner.task).take() {
            handle.abort();
        }
    }
}

impl<C: Connector> Inner<C> {
    async fn run(self: Arc<Self>, user_id: String) {
        let mut attempts: u32 = 0;
        loop {
            {
                let _slot = self.stream_slot.lock().await;
                match self.connector.open(&user_id).await {
                    Ok(mut stream) => {
                        attempts = 0;
                        self.state.send_replace(ConnectionState::Connected);
                        tracing::info!(user_id = %user_id, "notification stream connected");

                        while let Some(item) = stream.next().await {
                            match item {
                                Ok(payload) => self.dispatch(&payload),
                                Err(e) => {
                                    tracing::warn!(user_id = %user_id, error = %e, "notification stream error");
                                    break;
                                }
                            }
                        }
                        drop(stream);
                    }
                    Err(e) => {
                        tracing::warn!(user_id = %user_id, error = %e, "failed to open notification stream");
                    }
                }

                self.state.send_replace(ConnectionState::Disconnected);
            }

            attempts += 1;
            if let Some(max) = self.options.max_reconnect_attempts {
                if attempts > max {
                    tracing::warn!(user_id = %user_id, attempts = max, "giving up on notification stream");
                    return;
                }
            }

            tracing::debug!(
                user_id = %user_id,
                delay_ms = self.options.reconnect_delay.as_millis() as u64,
                "reconnecting notification stream"
            );
            tokio::time::sleep(self.options.reconnect_delay).await;
        }
    }

    fn dispatch(&self, raw: &str) {
        let event: NotificationEvent = match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed notification message");
                return;
            }
        };

        // Clone the callbacks out so a listener may (un)subscribe without deadlocking.
        let (typed, wildcard) = {
            let listeners = lock(&self.listeners);
            let typed = if event.event_type == WILDCARD {
                None
            } else {
                listeners.get(&event.event_type).cloned()
            };
            (typed, listeners.get(WILDCARD).cloned())
        };

        if let Some(callback) = typed {
            callback(&event);
        }
        if let Some(callback) = wildcard {
            callback(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use tokio::sync::mpsc;

    type Item = Result<String, ClientError>;

    struct MockStream {
        rx: mpsc::UnboundedReceiver<Item>,
        live: Arc<AtomicUsize>,
    }

    impl Stream for MockStream {
        type Item = Item;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Item>> {
            self.rx.poll_recv(cx)
        }
    }

    impl Drop for MockStream {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Records every open and whether one ever happened while another
    /// stream was still alive.
    #[derive(Clone, Default)]
    struct MockConnector {
        opens: Arc<AtomicUsize>,
        live: Arc<AtomicUsize>,
        overlapped: Arc<AtomicBool>,
        refuse: Arc<AtomicBool>,
        senders: Arc<Mutex<Vec<mpsc::UnboundedSender<Item>>>>,
    }

    impl MockConnector {
        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        fn live(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }

        fn push(&self, item: Item) {
            let senders = self.senders.lock().unwrap();
            let _ = senders.last().unwrap().send(item);
        }

        fn fail_current(&self) {
            self.push(Err(ClientError::Transport("connection reset".to_string())));
        }
    }

    impl Connector for MockConnector {
        type Stream = MockStream;

        fn open(
            &self,
            _user_id: &str,
        ) -> impl Future<Output = Result<MockStream, ClientError>> + Send {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let result = if self.refuse.load(Ordering::SeqCst) {
                Err(ClientError::Transport("refused".to_string()))
            } else {
                if self.live.fetch_add(1, Ordering::SeqCst) > 0 {
                    self.overlapped.store(true, Ordering::SeqCst);
                }
                let (tx, rx) = mpsc::unbounded_channel();
                self.senders.lock().unwrap().push(tx);
                Ok(MockStream {
                    rx,
                    live: Arc::clone(&self.live),
                })
            };
            std::future::ready(result)
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&NotificationEvent) + Send + Sync + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let clone = Arc::clone(&hits);
        (hits, move |_: &NotificationEvent| {
            clone.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn frame(event_type: &str) -> String {
        json!({"type": event_type, "data": {"title": "T", "message": "M"}}).to_string()
    }

    #[tokio::test]
    async fn test_typed_and_wildcard_listeners() {
        let agent = NotificationAgent::new(MockConnector::default());
        let (typed, on_typed) = counter();
        let (all, on_all) = counter();
        agent.subscribe("notification", on_typed);
        agent.subscribe_all(on_all);

        agent.handle_message(&frame("notification"));
        assert_eq!(typed.load(Ordering::SeqCst), 1);
        assert_eq!(all.load(Ordering::SeqCst), 1);

        agent.handle_message(&frame("appointment_update"));
        assert_eq!(typed.load(Ordering::SeqCst), 1);
        assert_eq!(all.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unsubscribed_type_without_wildcard_is_ignored() {
        let agent = NotificationAgent::new(MockConnector::default());
        let (typed, on_typed) = counter();
        agent.subscribe("notification", on_typed);
        agent.handle_message(&frame("appointment_update"));
        assert_eq!(typed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_last_subscription_wins() {
        let agent = NotificationAgent::new(MockConnector::default());
        let (first, on_first) = counter();
        let (second, on_second) = counter();
        agent.subscribe("notification", on_first);
        agent.subscribe("notification", on_second);
        agent.handle_message(&frame("notification"));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        agent.unsubscribe("notification");
        agent.handle_message(&frame("notification"));
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listener_receives_payload() {
        let agent = NotificationAgent::new(MockConnector::default());
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        agent.subscribe("notification", move |event: &NotificationEvent| {
            *sink.lock().unwrap() = Some(event.data["title"].clone());
        });
        agent.handle_message(&frame("notification"));
        assert_eq!(*seen.lock().unwrap(), Some(json!("T")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_message_keeps_connection() {
        let connector = MockConnector::default();
        let agent = NotificationAgent::new(connector.clone());
        let (hits, on_hit) = counter();
        agent.subscribe("notification", on_hit);

        agent.connect("u1");
        settle().await;
        connector.push(Ok("not json".to_string()));
        connector.push(Ok(frame("notification")));
        settle().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(agent.state(), ConnectionState::Connected);
        assert_eq!(connector.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_once_after_fixed_delay() {
        let connector = MockConnector::default();
        let agent = NotificationAgent::new(connector.clone());

        agent.connect("u1");
        settle().await;
        assert_eq!(connector.opens(), 1);
        assert_eq!(agent.state(), ConnectionState::Connected);

        connector.fail_current();
        settle().await;
        assert_eq!(agent.state(), ConnectionState::Disconnected);
        assert_eq!(connector.live(), 0);

        tokio::time::advance(Duration::from_millis(4_900)).await;
        settle().await;
        assert_eq!(connector.opens(), 1);

        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(connector.opens(), 2);
        assert_eq!(connector.live(), 1);
        assert_eq!(agent.state(), ConnectionState::Connected);
        assert!(!connector.overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_also_reconnects() {
        let connector = MockConnector::default();
        let agent = NotificationAgent::new(connector.clone());

        agent.connect("u1");
        settle().await;
        // Dropping the sender ends the stream without an error.
        connector.senders.lock().unwrap().clear();
        settle().await;
        assert_eq!(agent.state(), ConnectionState::Disconnected);

        tokio::time::advance(DEFAULT_RECONNECT_DELAY).await;
        settle().await;
        assert_eq!(connector.opens(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_closes_previous_stream_first() {
        let connector = MockConnector::default();
        let agent = NotificationAgent::new(connector.clone());

        agent.connect("u1");
        settle().await;
        agent.connect("u1");
        settle().await;

        assert_eq!(connector.opens(), 2);
        assert_eq!(connector.live(), 1);
        assert!(!connector.overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_closes_stream_and_clears_listeners() {
        let connector = MockConnector::default();
        let agent = NotificationAgent::new(connector.clone());
        let (hits, on_hit) = counter();
        agent.subscribe_all(on_hit);

        agent.connect("u1");
        settle().await;
        agent.disconnect().await;

        assert_eq!(connector.live(), 0);
        assert_eq!(agent.state(), ConnectionState::Disconnected);

        agent.handle_message(&frame("notification"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // No reconnect is scheduled after an explicit disconnect.
        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(connector.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_forever_by_default() {
        let connector = MockConnector::default();
        connector.refuse.store(true, Ordering::SeqCst);
        let agent = NotificationAgent::new(connector.clone());

        agent.connect("u1");
        settle().await;
        for _ in 0..10 {
            tokio::time::advance(DEFAULT_RECONNECT_DELAY).await;
            settle().await;
        }
        assert_eq!(connector.opens(), 11);
        assert_eq!(agent.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_reconnect_attempts_stops_retrying() {
        let connector = MockConnector::default();
        connector.refuse.store(true, Ordering::SeqCst);
        let agent = NotificationAgent::with_options(
            connector.clone(),
            AgentOptions {
                reconnect_delay: Duration::from_secs(1),
                max_reconnect_attempts: Some(2),
            },
        );

        agent.connect("u1");
        settle().await;
        for _ in 0..10 {
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }
        // initial open plus two retries
        assert_eq!(connector.opens(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_state_sees_transitions() {
        let connector = MockConnector::default();
        let agent = NotificationAgent::new(connector.clone());
        let mut states = agent.watch_state();
        assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);

        agent.connect("u1");
        settle().await;
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), ConnectionState::Connected);

        connector.fail_current();
        settle().await;
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);

        tokio::time::advance(DEFAULT_RECONNECT_DELAY).await;
        settle().await;
        assert_eq!(*states.borrow_and_update(), ConnectionState::Connected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rapid_connects_never_overlap_streams() {
        let connector = MockConnector::default();
        let agent = NotificationAgent::new(connector.clone());

        for _ in 0..300 {
            agent.connect("u1");
            tokio::time::sleep(Duration::from_micros(50)).await;
            agent.connect("u1");
            agent.connect("u1");
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert!(connector.live() <= 1);
        }
        assert!(!connector.overlapped.load(Ordering::SeqCst));

        agent.disconnect().await;
        // Tasks aborted earlier may still be unwinding on other workers.
        tokio::time::timeout(Duration::from_secs(5), async {
            while connector.live() > 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("stream left open after disconnect");
        assert!(!connector.overlapped.load(Ordering::SeqCst));
    }
}
