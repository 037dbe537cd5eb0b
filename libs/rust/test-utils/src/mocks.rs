//! Mock implementations for testing.
//!
//! Each mock records what the token manager asked of it so tests can assert
//! on call counts, request headers and broadcast events.

use async_trait::async_trait;
use oidc_client::{
    Headers, HttpResponse, HttpTransport, KeyValueStore, MemoryStore, SessionEvent,
    SessionNotifier, TokenError, TokenResult,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Request URL
    pub url: String,
    /// Request headers
    pub headers: Headers,
}

/// Scripted outcome of one transport call.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with this response
    Respond(HttpResponse),
    /// Fail with a transport error
    Fail(String),
}

/// Transport returning scripted responses.
///
/// Replies are consumed in order; once the script runs out the fallback reply
/// is used for every further call.
#[derive(Debug)]
pub struct MockTransport {
    script: Mutex<VecDeque<MockReply>>,
    fallback: MockReply,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    /// Create a transport that always answers with `response`.
    #[must_use]
    pub fn new(response: HttpResponse) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: MockReply::Respond(response),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a transport whose calls all fail.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            fallback: MockReply::Fail(message.to_string()),
            ..Self::new(HttpResponse::default())
        }
    }

    /// Answer `status` with a JSON body.
    #[must_use]
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(HttpResponse::json_body(status, body))
    }

    /// Queue `reply` ahead of the fallback.
    #[must_use]
    pub fn then(self, reply: MockReply) -> Self {
        self.script.lock().push_back(reply);
        self
    }

    /// Sleep for `delay` before answering.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests seen so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// The most recent request.
    #[must_use]
    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn get(&self, url: &str, headers: &Headers) -> TokenResult<HttpResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(RecordedRequest {
            url: url.to_string(),
            headers: headers.clone(),
        });

        pause(self.delay).await;

        let reply = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match reply {
            MockReply::Respond(response) => Ok(response),
            MockReply::Fail(message) => Err(TokenError::transport(message)),
        }
    }
}

/// Store whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, key: &str) -> TokenResult<Option<String>> {
        Err(TokenError::storage(format!("get {key}: unavailable")))
    }

    async fn set(&self, key: &str, _value: &str) -> TokenResult<()> {
        Err(TokenError::storage(format!("set {key}: unavailable")))
    }

    async fn remove(&self, key: &str) -> TokenResult<()> {
        Err(TokenError::storage(format!("remove {key}: unavailable")))
    }
}

/// In-memory store that sleeps before each operation, like a remote or
/// disk-backed store would.
#[derive(Debug, Default)]
pub struct SlowStore {
    inner: MemoryStore,
    get_delay: Duration,
    set_delay: Duration,
    remove_delay: Duration,
}

impl SlowStore {
    /// Create a store with no delays.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` before every read.
    #[must_use]
    pub const fn with_get_delay(mut self, delay: Duration) -> Self {
        self.get_delay = delay;
        self
    }

    /// Sleep for `delay` before every write.
    #[must_use]
    pub const fn with_set_delay(mut self, delay: Duration) -> Self {
        self.set_delay = delay;
        self
    }

    /// Sleep for `delay` before every removal.
    #[must_use]
    pub const fn with_remove_delay(mut self, delay: Duration) -> Self {
        self.remove_delay = delay;
        self
    }

    /// Read `key` without the delay.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying [`MemoryStore`].
    pub async fn peek(&self, key: &str) -> TokenResult<Option<String>> {
        self.inner.get(key).await
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl KeyValueStore for SlowStore {
    async fn get(&self, key: &str) -> TokenResult<Option<String>> {
        pause(self.get_delay).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> TokenResult<()> {
        pause(self.set_delay).await;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> TokenResult<()> {
        pause(self.remove_delay).await;
        self.inner.remove(key).await
    }
}

/// Notifier recording every broadcast event.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingNotifier {
    /// Create an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events broadcast so far.
    #[must_use]
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    /// Number of `LoggedOut` broadcasts.
    #[must_use]
    pub fn logouts(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| **event == SessionEvent::LoggedOut)
            .count()
    }
}

impl SessionNotifier for RecordingNotifier {
    fn broadcast(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }
}
