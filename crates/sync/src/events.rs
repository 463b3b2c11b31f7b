use std::sync::Arc;

use murmur_store::{ErrorKind, Message, MessageId};
use tokio::sync::mpsc;

/// Immutable view of the cache handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheSnapshot {
    pub messages: Arc<[Message]>,
    pub has_more_older: bool,
}

impl CacheSnapshot {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.messages.iter().map(|message| message.id).collect()
    }

    pub fn newest(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Content height measured right before an older-page merge.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollAnchor {
    pub captured_height: f32,
}

impl ScrollAnchor {
    pub const fn new(captured_height: f32) -> Self {
        Self { captured_height }
    }

    /// Offset shift that keeps previously visible rows in place after a prepend.
    pub fn correction(&self, new_height: f32) -> f32 {
        new_height - self.captured_height
    }
}

/// Signals emitted by the sync engine for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The initial page has been applied.
    Ready,
    CacheChanged(CacheSnapshot),
    ScrollToBottomRequested,
    /// Emitted after older messages were prepended; carries the pre-merge height.
    ScrollAnchorCorrectionRequested { captured_height: f32 },
    Error(ErrorKind),
}

#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    events: mpsc::UnboundedSender<SyncEvent>,
}

impl EventSink {
    pub(crate) fn emit(&self, event: SyncEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("sync event dropped because the presentation layer is gone");
        }
    }
}

pub struct SyncEventStream {
    events: mpsc::UnboundedReceiver<SyncEvent>,
}

impl SyncEventStream {
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SyncEvent> {
        self.events.try_recv().ok()
    }

    /// Takes every event queued so far without waiting.
    pub fn drain(&mut self) -> Vec<SyncEvent> {
        let mut drained = Vec::new();
        while let Some(event) = self.try_recv() {
            drained.push(event);
        }
        drained
    }
}

pub(crate) fn event_channel() -> (EventSink, SyncEventStream) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    (
        EventSink { events: events_tx },
        SyncEventStream { events: events_rx },
    )
}
