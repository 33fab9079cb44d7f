// ABOUTME: Scripted Transport for deterministic engine tests.
// ABOUTME: Replays queued list results (with optional delays) and records every call.

use crate::error::ApiError;
use crate::message::{ChatAuthor, ChatMessage};
use crate::traits::{Credentials, ListPage, ListRequest, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted answer to `list`
#[derive(Debug, Clone)]
pub struct ListStep {
    pub delay: Option<Duration>,
    pub result: Result<ListPage, ApiError>,
}

/// Mock transport.
///
/// `list` pops scripted steps in order; once the script runs out it answers
/// with an empty page using the idle interval. `insert` echoes the text back
/// unless an insert failure is queued.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    steps: VecDeque<ListStep>,
    idle_interval: Duration,
    insert_results: VecDeque<Result<ChatMessage, ApiError>>,
    delete_results: VecDeque<Result<(), ApiError>>,
    list_calls: Vec<ListRequest>,
    insert_calls: Vec<String>,
    delete_calls: Vec<String>,
    tokens_seen: Vec<String>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                steps: VecDeque::new(),
                idle_interval: Duration::from_secs(60),
                insert_results: VecDeque::new(),
                delete_results: VecDeque::new(),
                list_calls: Vec::new(),
                insert_calls: Vec::new(),
                delete_calls: Vec::new(),
                tokens_seen: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Interval reported once the script is exhausted
    pub fn idle_interval(self, interval: Duration) -> Self {
        self.lock().idle_interval = interval;
        self
    }

    /// Queue a successful page
    pub fn page(self, items: Vec<ChatMessage>, next_page_token: Option<&str>, interval: Duration) -> Self {
        self.step(ListStep {
            delay: None,
            result: Ok(ListPage {
                items,
                next_page_token: next_page_token.map(str::to_string),
                polling_interval: interval,
            }),
        })
    }

    /// Queue a failure
    pub fn fail(self, error: ApiError) -> Self {
        self.step(ListStep {
            delay: None,
            result: Err(error),
        })
    }

    /// Queue an arbitrary step
    pub fn step(self, step: ListStep) -> Self {
        self.lock().steps.push_back(step);
        self
    }

    /// Queue the message the next `insert` returns
    pub fn respond_insert(self, message: ChatMessage) -> Self {
        self.lock().insert_results.push_back(Ok(message));
        self
    }

    /// Queue a failure for the next `insert`
    pub fn fail_insert(self, error: ApiError) -> Self {
        self.lock().insert_results.push_back(Err(error));
        self
    }

    /// Queue a failure for the next `delete`
    pub fn fail_delete(self, error: ApiError) -> Self {
        self.lock().delete_results.push_back(Err(error));
        self
    }

    pub fn list_calls(&self) -> Vec<ListRequest> {
        self.lock().list_calls.clone()
    }

    pub fn list_count(&self) -> usize {
        self.lock().list_calls.len()
    }

    pub fn insert_calls(&self) -> Vec<String> {
        self.lock().insert_calls.clone()
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.lock().delete_calls.clone()
    }

    /// Access tokens presented on every call, in order
    pub fn tokens_seen(&self) -> Vec<String> {
        self.lock().tokens_seen.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn list(
        &self,
        credentials: &Credentials,
        request: &ListRequest,
    ) -> Result<ListPage, ApiError> {
        let step = {
            let mut inner = self.lock();
            inner.list_calls.push(request.clone());
            inner.tokens_seen.push(credentials.access_token.clone());
            let idle = inner.idle_interval;
            inner.steps.pop_front().unwrap_or(ListStep {
                delay: None,
                result: Ok(ListPage {
                    items: Vec::new(),
                    next_page_token: request.page_token.clone(),
                    polling_interval: idle,
                }),
            })
        };

        if let Some(delay) = step.delay {
            tokio::time::sleep(delay).await;
        }
        step.result
    }

    async fn insert(
        &self,
        credentials: &Credentials,
        live_chat_id: &str,
        text: &str,
    ) -> Result<ChatMessage, ApiError> {
        let mut inner = self.lock();
        inner.insert_calls.push(text.to_string());
        inner.tokens_seen.push(credentials.access_token.clone());
        let sequence = inner.insert_calls.len();
        inner.insert_results.pop_front().unwrap_or_else(|| {
            Ok(ChatMessage::text(
                format!("sent-{}", sequence),
                live_chat_id,
                ChatAuthor::new("self", "self"),
                text,
            ))
        })
    }

    async fn delete(&self, credentials: &Credentials, message_id: &str) -> Result<(), ApiError> {
        let mut inner = self.lock();
        inner.delete_calls.push(message_id.to_string());
        inner.tokens_seen.push(credentials.access_token.clone());
        inner.delete_results.pop_front().unwrap_or(Ok(()))
    }
}
