use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use snafu::ensure;

use super::error::{StoreResult, UnauthorizedSnafu, UnavailableSnafu, ValidationSnafu};
use super::ids::MessageId;
use super::types::{Author, Cursor, Identity, MAX_MESSAGE_CHARS, Message, Page};
use super::{BoxFuture, MessageStore};

#[derive(Debug)]
struct MemoryState {
    // Ascending by id; ids are handed out from `next_id` only.
    messages: Vec<Message>,
    next_id: u64,
    revoked: bool,
    pending_fetch_failures: usize,
    pending_send_failures: usize,
}

/// In-process message store with the same paging contract as the HTTP API.
///
/// Used by tests and the demo mode; other participants can be simulated
/// with [`MemoryMessageStore::post_as`].
#[derive(Debug)]
pub struct MemoryMessageStore {
    identity: Identity,
    latency: Option<Duration>,
    state: Mutex<MemoryState>,
    fetch_count: AtomicUsize,
    send_count: AtomicUsize,
}

impl MemoryMessageStore {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            latency: None,
            state: Mutex::new(MemoryState {
                messages: Vec::new(),
                next_id: 1,
                revoked: false,
                pending_fetch_failures: 0,
                pending_send_failures: 0,
            }),
            fetch_count: AtomicUsize::new(0),
            send_count: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = (!latency.is_zero()).then_some(latency);
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Appends a message from any author, as if it arrived from another client.
    pub fn post_as(&self, author: &Author, text: impl Into<String>) -> Message {
        let mut state = self.lock();
        let message = Message::new(
            MessageId::new(state.next_id),
            author.clone(),
            text,
            Utc::now(),
        );
        state.next_id += 1;
        state.messages.push(message.clone());
        message
    }

    pub fn seed_history(&self, author: &Author, count: usize) {
        for index in 0..count {
            self.post_as(author, format!("history message {}", index + 1));
        }
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    /// Invalidates the session; every later call fails with `Unauthorized`.
    pub fn revoke_session(&self) {
        self.lock().revoked = true;
    }

    pub fn fail_next_fetches(&self, count: usize) {
        self.lock().pending_fetch_failures = count;
    }

    pub fn fail_next_send(&self) {
        self.lock().pending_send_failures = 1;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> usize {
        self.send_count.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn read_page(&self, cursor: Cursor) -> StoreResult<Page> {
        let stage = "memory-store-fetch-page";
        let mut state = self.lock();
        ensure!(!state.revoked, UnauthorizedSnafu { stage, status: 401_u16 });
        if state.pending_fetch_failures > 0 {
            state.pending_fetch_failures -= 1;
            return UnavailableSnafu {
                stage,
                details: "injected fetch failure".to_string(),
            }
            .fail();
        }
        ensure!(
            cursor.page >= 1 && cursor.page_size >= 1,
            ValidationSnafu {
                stage,
                details: format!("invalid cursor {cursor:?}"),
            }
        );

        let offset = cursor.offset();
        let page_size = cursor.page_size as usize;
        let total = state.messages.len();
        let messages = state
            .messages
            .iter()
            .rev()
            .skip(offset)
            .take(page_size)
            .cloned()
            .collect::<Vec<_>>();
        let has_next = total > offset.saturating_add(page_size);

        Ok(Page::new(messages, has_next))
    }

    fn write_message(&self, text: String) -> StoreResult<Message> {
        let stage = "memory-store-send-message";
        {
            let mut state = self.lock();
            ensure!(!state.revoked, UnauthorizedSnafu { stage, status: 401_u16 });
            if state.pending_send_failures > 0 {
                state.pending_send_failures -= 1;
                return UnavailableSnafu {
                    stage,
                    details: "injected send failure".to_string(),
                }
                .fail();
            }
        }

        let trimmed = text.trim();
        ensure!(
            !trimmed.is_empty(),
            ValidationSnafu {
                stage,
                details: "text: this field may not be blank".to_string(),
            }
        );
        ensure!(
            trimmed.chars().count() <= MAX_MESSAGE_CHARS,
            ValidationSnafu {
                stage,
                details: format!("text: ensure this field has no more than {MAX_MESSAGE_CHARS} characters"),
            }
        );

        Ok(self.post_as(&self.identity.as_author(), trimmed))
    }
}

impl MessageStore for MemoryMessageStore {
    fn fetch_page(&self, cursor: Cursor) -> BoxFuture<'_, StoreResult<Page>> {
        Box::pin(async move {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency().await;
            self.read_page(cursor)
        })
    }

    fn send_message(&self, text: String) -> BoxFuture<'_, StoreResult<Message>> {
        Box::pin(async move {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency().await;
            self.write_message(text)
        })
    }

    fn current_identity(&self) -> BoxFuture<'_, StoreResult<Identity>> {
        Box::pin(async move {
            self.simulate_latency().await;
            ensure!(
                !self.lock().revoked,
                UnauthorizedSnafu {
                    stage: "memory-store-current-identity",
                    status: 401_u16,
                }
            );
            Ok(self.identity.clone())
        })
    }
}
