//! Scripted store and fixtures shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use murmur_store::{
    Author, BoxFuture, Cursor, Identity, MemberId, Message, MessageId, MessageStore, Page,
    StoreError, StoreResult,
};
use tokio::sync::oneshot;

pub(crate) fn author() -> Author {
    Author::new(MemberId::new(2), "mara")
}

pub(crate) fn identity() -> Identity {
    Identity::new(MemberId::new(1), "you")
}

pub(crate) fn message(id: u64) -> Message {
    Message::new(
        MessageId::new(id),
        author(),
        format!("message {id}"),
        DateTime::<Utc>::UNIX_EPOCH,
    )
}

/// Builds messages in the order given.
pub(crate) fn batch(ids: &[u64]) -> Vec<Message> {
    ids.iter().copied().map(message).collect()
}

pub(crate) fn page(newest_first: &[u64], has_next: bool) -> Page {
    Page::new(batch(newest_first), has_next)
}

pub(crate) fn ids_of(messages: &[Message]) -> Vec<u64> {
    messages.iter().map(|message| message.id.get()).collect()
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Failure {
    Unauthorized,
    Unavailable,
    Rejected,
}

impl Failure {
    fn into_error(self, stage: &'static str) -> StoreError {
        match self {
            Self::Unauthorized => StoreError::Unauthorized { stage, status: 401 },
            Self::Unavailable => StoreError::UnexpectedStatus {
                stage,
                status: 503,
                body: "unavailable".to_string(),
            },
            Self::Rejected => StoreError::Validation {
                stage,
                details: "rejected".to_string(),
            },
        }
    }
}

enum Reply<T> {
    Ok(T),
    Fail(Failure),
}

struct Scripted<T> {
    reply: Reply<T>,
    gate: Option<oneshot::Receiver<()>>,
}

impl<T> Scripted<T> {
    async fn resolve(self, stage: &'static str) -> StoreResult<T> {
        if let Some(gate) = self.gate {
            let _ = gate.await;
        }
        match self.reply {
            Reply::Ok(value) => Ok(value),
            Reply::Fail(failure) => Err(failure.into_error(stage)),
        }
    }
}

/// Store whose replies are queued up front; gated replies wait until released.
///
/// Fetches with nothing queued return an empty final page.
pub(crate) struct ScriptedStore {
    fetches: Mutex<VecDeque<Scripted<Page>>>,
    sends: Mutex<VecDeque<Scripted<Message>>>,
    identity: Mutex<Option<Failure>>,
    cursors: Mutex<Vec<Cursor>>,
    send_calls: AtomicUsize,
}

impl ScriptedStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            fetches: Mutex::new(VecDeque::new()),
            sends: Mutex::new(VecDeque::new()),
            identity: Mutex::new(None),
            cursors: Mutex::new(Vec::new()),
            send_calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn push_page(&self, newest_first: &[u64], has_next: bool) {
        lock(&self.fetches).push_back(Scripted {
            reply: Reply::Ok(page(newest_first, has_next)),
            gate: None,
        });
    }

    pub(crate) fn push_raw_page(&self, raw: Page) {
        lock(&self.fetches).push_back(Scripted {
            reply: Reply::Ok(raw),
            gate: None,
        });
    }

    pub(crate) fn push_gated_page(&self, newest_first: &[u64], has_next: bool) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        lock(&self.fetches).push_back(Scripted {
            reply: Reply::Ok(page(newest_first, has_next)),
            gate: Some(gate),
        });
        release
    }

    pub(crate) fn push_fetch_failure(&self, failure: Failure) {
        lock(&self.fetches).push_back(Scripted {
            reply: Reply::Fail(failure),
            gate: None,
        });
    }

    pub(crate) fn push_sent(&self, id: u64) {
        lock(&self.sends).push_back(Scripted {
            reply: Reply::Ok(sent_message(id)),
            gate: None,
        });
    }

    pub(crate) fn push_gated_sent(&self, id: u64) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        lock(&self.sends).push_back(Scripted {
            reply: Reply::Ok(sent_message(id)),
            gate: Some(gate),
        });
        release
    }

    pub(crate) fn push_send_failure(&self, failure: Failure) {
        lock(&self.sends).push_back(Scripted {
            reply: Reply::Fail(failure),
            gate: None,
        });
    }

    pub(crate) fn fail_identity(&self, failure: Failure) {
        *lock(&self.identity) = Some(failure);
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        lock(&self.cursors).len()
    }

    pub(crate) fn cursors(&self) -> Vec<Cursor> {
        lock(&self.cursors).clone()
    }

    pub(crate) fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }
}

impl MessageStore for ScriptedStore {
    fn fetch_page(&self, cursor: Cursor) -> BoxFuture<'_, StoreResult<Page>> {
        lock(&self.cursors).push(cursor);
        let scripted = lock(&self.fetches).pop_front();
        Box::pin(async move {
            match scripted {
                Some(scripted) => scripted.resolve("scripted-fetch-page").await,
                None => Ok(Page::empty()),
            }
        })
    }

    fn send_message(&self, text: String) -> BoxFuture<'_, StoreResult<Message>> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = lock(&self.sends).pop_front();
        Box::pin(async move {
            match scripted {
                Some(scripted) => scripted.resolve("scripted-send-message").await,
                None => Err(Failure::Unavailable.into_error("scripted-send-message-empty")),
            }
            .map(|message| Message { text, ..message })
        })
    }

    fn current_identity(&self) -> BoxFuture<'_, StoreResult<Identity>> {
        let failure = *lock(&self.identity);
        Box::pin(async move {
            match failure {
                Some(failure) => Err(failure.into_error("scripted-current-identity")),
                None => Ok(identity()),
            }
        })
    }
}

// The echoed text is filled in from the request.
fn sent_message(id: u64) -> Message {
    Message::new(
        MessageId::new(id),
        identity().as_author(),
        String::new(),
        DateTime::<Utc>::UNIX_EPOCH,
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
