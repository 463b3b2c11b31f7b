use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{MalformedPageSnafu, StoreResult};
use super::ids::{MemberId, MessageId};

/// Server-side limit on message text, counted in characters.
pub const MAX_MESSAGE_CHARS: usize = 5_000;

/// Message author as embedded in every message payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    pub id: MemberId,
    #[serde(rename = "username")]
    pub display_name: String,
}

impl Author {
    pub fn new(id: MemberId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// One chat message. Immutable once the server has assigned its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub author: Author,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        id: MessageId,
        author: Author,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            author,
            text: text.into(),
            created_at,
        }
    }

    pub fn author_id(&self) -> MemberId {
        self.author.id
    }

    pub fn author_display_name(&self) -> &str {
        &self.author.display_name
    }
}

/// Page-number pagination position. Page 1 is always the most recent batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor {
    pub page: u32,
    pub page_size: u32,
}

impl Cursor {
    pub const fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    pub const fn first(page_size: u32) -> Self {
        Self::new(1, page_size)
    }

    pub const fn next(self) -> Self {
        Self::new(self.page.saturating_add(1), self.page_size)
    }

    /// Number of messages newer than the first entry of this page.
    pub fn offset(self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.page_size as usize)
    }
}

/// One fetched batch, newest-first as delivered on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Page {
    pub messages: Vec<Message>,
    pub has_next: bool,
}

impl Page {
    pub fn new(messages: Vec<Message>, has_next: bool) -> Self {
        Self { messages, has_next }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Rejects pages whose ids are not strictly decreasing, which also rules out duplicates.
    pub fn validate(&self, stage: &'static str) -> StoreResult<()> {
        if let Some(pair) = self
            .messages
            .windows(2)
            .find(|pair| pair[0].id <= pair[1].id)
        {
            return MalformedPageSnafu {
                stage,
                details: format!(
                    "expected newest-first ids, found {} before {}",
                    pair[0].id, pair[1].id
                ),
            }
            .fail();
        }

        Ok(())
    }

    /// Converts the wire order into ascending id order.
    pub fn into_ascending(self) -> Vec<Message> {
        let mut messages = self.messages;
        messages.reverse();
        messages
    }
}

/// The member the current session is authenticated as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: MemberId,
    #[serde(rename = "username")]
    pub display_name: String,
}

impl Identity {
    pub fn new(id: MemberId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }

    pub fn as_author(&self) -> Author {
        Author::new(self.id, self.display_name.clone())
    }
}
