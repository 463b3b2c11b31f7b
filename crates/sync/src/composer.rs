use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use murmur_store::{ErrorKind, MAX_MESSAGE_CHARS, Message, StoreError};
use snafu::{ResultExt, Snafu, ensure};

use crate::engine::{AppendOutcome, SyncEngine};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ComposeError {
    #[snafu(display("message text is empty on `{stage}`"))]
    EmptyText { stage: &'static str },
    #[snafu(display("message has {chars} characters on `{stage}`, limit is {limit}"))]
    TooLong {
        stage: &'static str,
        chars: usize,
        limit: usize,
    },
    #[snafu(display("a send is already in flight on `{stage}`"))]
    SendInFlight { stage: &'static str },
    #[snafu(display("send failed on `{stage}` ({kind}): {source}"))]
    Store {
        stage: &'static str,
        kind: ErrorKind,
        source: StoreError,
    },
}

impl ComposeError {
    /// Failure class reported by the message store, if the send reached it.
    pub fn store_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Store { kind, .. } => Some(*kind),
            Self::EmptyText { .. } | Self::TooLong { .. } | Self::SendInFlight { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
struct ComposerState {
    draft: String,
    sending: bool,
}

/// Draft holder and single-flight sender for one chat view.
#[derive(Clone)]
pub struct Composer {
    engine: SyncEngine,
    state: Arc<Mutex<ComposerState>>,
}

struct SendingGuard<'a> {
    state: &'a Mutex<ComposerState>,
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).sending = false;
    }
}

impl Composer {
    pub fn new(engine: SyncEngine) -> Self {
        Self {
            engine,
            state: Arc::new(Mutex::new(ComposerState::default())),
        }
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        lock(&self.state).draft = text.into();
    }

    pub fn draft(&self) -> String {
        lock(&self.state).draft.clone()
    }

    pub fn is_sending(&self) -> bool {
        lock(&self.state).sending
    }

    /// Replaces the draft with `text` and submits it.
    pub async fn send(&self, text: impl Into<String>) -> Result<Message, ComposeError> {
        self.set_draft(text);
        self.submit().await
    }

    /// Sends the trimmed draft and appends the stored message to the cache.
    ///
    /// The draft is cleared only on success, and only if it was not edited
    /// while the request was pending.
    pub async fn submit(&self) -> Result<Message, ComposeError> {
        let stage = "compose-submit";
        let text = {
            let mut state = lock(&self.state);
            let text = state.draft.trim().to_string();
            ensure!(!text.is_empty(), EmptyTextSnafu { stage });
            let chars = text.chars().count();
            ensure!(
                chars <= MAX_MESSAGE_CHARS,
                TooLongSnafu {
                    stage,
                    chars,
                    limit: MAX_MESSAGE_CHARS,
                }
            );
            ensure!(!state.sending, SendInFlightSnafu { stage });
            state.sending = true;
            text
        };
        let _sending = SendingGuard { state: &self.state };
        let epoch = self.engine.epoch();

        let message = match self.engine.store().send_message(text.clone()).await {
            Ok(message) => message,
            Err(source) => {
                let kind = source.kind();
                self.engine.report_failure("compose-send", epoch, &source);
                return Err(source).context(StoreSnafu {
                    stage: "compose-send",
                    kind,
                });
            }
        };

        let appended = self.engine.append_confirmed(epoch, message.clone());
        {
            let mut state = lock(&self.state);
            if state.draft.trim() == text {
                state.draft.clear();
            }
        }

        tracing::info!(
            message_id = %message.id,
            chars = message.text.chars().count(),
            deduplicated = appended == AppendOutcome::AlreadyPresent,
            "message sent"
        );
        Ok(message)
    }
}

fn lock(state: &Mutex<ComposerState>) -> MutexGuard<'_, ComposerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::SyncConfig;
    use crate::events::{SyncEvent, SyncEventStream};
    use crate::testing::{Failure, ScriptedStore, ids_of};

    async fn compose_over(
        store: &Arc<ScriptedStore>,
        newest_first: &[u64],
    ) -> (Composer, SyncEngine, SyncEventStream) {
        let (engine, mut events) = SyncEngine::new(store.clone(), SyncConfig::default());
        store.push_page(newest_first, false);
        assert!(engine.load_initial().await.is_applied());
        events.drain();
        (Composer::new(engine.clone()), engine, events)
    }

    fn cached_ids(engine: &SyncEngine) -> Vec<u64> {
        engine.inspect(|cache| ids_of(cache.messages()))
    }

    #[tokio::test]
    async fn blank_text_is_rejected_without_a_request() {
        let store = ScriptedStore::new();
        let (composer, _engine, _events) = compose_over(&store, &[1]).await;

        let result = composer.send(" \n\t ").await;

        assert!(matches!(result, Err(ComposeError::EmptyText { .. })));
        assert_eq!(store.send_calls(), 0);
    }

    #[tokio::test]
    async fn oversized_text_is_rejected_locally() {
        let store = ScriptedStore::new();
        let (composer, _engine, _events) = compose_over(&store, &[1]).await;

        let result = composer.send("x".repeat(MAX_MESSAGE_CHARS + 1)).await;

        assert!(matches!(result, Err(ComposeError::TooLong { chars, .. }) if chars == MAX_MESSAGE_CHARS + 1));
        assert_eq!(store.send_calls(), 0);
        assert_eq!(composer.draft().len(), MAX_MESSAGE_CHARS + 1);
    }

    #[tokio::test]
    async fn successful_send_appends_and_clears_draft() {
        let store = ScriptedStore::new();
        let (composer, engine, mut events) = compose_over(&store, &[3, 2, 1]).await;
        store.push_sent(4);
        composer.set_draft("  hello there ");

        let sent = match composer.submit().await {
            Ok(sent) => sent,
            Err(error) => panic!("send should succeed: {error}"),
        };

        assert_eq!(sent.text, "hello there");
        assert_eq!(cached_ids(&engine), vec![1, 2, 3, 4]);
        assert!(composer.draft().is_empty());
        assert!(!composer.is_sending());
        let emitted = events.drain();
        assert_eq!(emitted.last(), Some(&SyncEvent::ScrollToBottomRequested));
    }

    #[tokio::test]
    async fn message_already_polled_is_not_appended_twice() {
        let store = ScriptedStore::new();
        let (composer, engine, _events) = compose_over(&store, &[15, 14]).await;
        let release = store.push_gated_sent(16);
        store.push_page(&[16, 15, 14], false);

        let (sent, polled) = tokio::join!(composer.send("hi"), async {
            let polled = engine.poll().await;
            let _ = release.send(());
            polled
        });

        assert!(sent.is_ok());
        assert!(polled.is_applied());
        assert_eq!(cached_ids(&engine), vec![14, 15, 16]);
    }

    #[tokio::test]
    async fn failed_send_keeps_draft_and_reports_kind() {
        let store = ScriptedStore::new();
        let (composer, engine, mut events) = compose_over(&store, &[2, 1]).await;
        store.push_send_failure(Failure::Rejected);

        let result = composer.send("rejected text").await;

        let error = match result {
            Ok(message) => panic!("send should fail, got {message:?}"),
            Err(error) => error,
        };
        assert_eq!(error.store_kind(), Some(ErrorKind::ValidationError));
        assert_eq!(composer.draft(), "rejected text");
        assert_eq!(cached_ids(&engine), vec![1, 2]);
        assert_eq!(events.drain(), vec![SyncEvent::Error(ErrorKind::ValidationError)]);
    }

    #[tokio::test]
    async fn second_submit_during_send_is_rejected() {
        let store = ScriptedStore::new();
        let (composer, _engine, _events) = compose_over(&store, &[1]).await;
        let release = store.push_gated_sent(2);

        let (first, second) = tokio::join!(composer.send("first"), async {
            let second = composer.submit().await;
            let _ = release.send(());
            second
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(ComposeError::SendInFlight { .. })));
        assert_eq!(store.send_calls(), 1);
    }

    #[tokio::test]
    async fn draft_edited_during_send_survives_success() {
        let store = ScriptedStore::new();
        let (composer, _engine, _events) = compose_over(&store, &[1]).await;
        let release = store.push_gated_sent(2);

        let (sent, ()) = tokio::join!(composer.send("first"), async {
            composer.set_draft("second thought");
            let _ = release.send(());
        });

        assert!(sent.is_ok());
        assert_eq!(composer.draft(), "second thought");
    }

    #[tokio::test]
    async fn confirmation_after_reset_is_not_appended() {
        let store = ScriptedStore::new();
        let (composer, engine, _events) = compose_over(&store, &[1]).await;
        let release = store.push_gated_sent(2);

        let (sent, ()) = tokio::join!(composer.send("late"), async {
            engine.reset();
            let _ = release.send(());
        });

        assert!(sent.is_ok());
        assert!(engine.snapshot().is_empty());
    }
}
