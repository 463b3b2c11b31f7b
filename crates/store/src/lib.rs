use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod http;
pub mod ids;
pub mod memory;
pub mod types;

pub use error::{ErrorKind, StoreError, StoreResult};
pub use http::{HttpMessageStore, HttpStoreConfig};
pub use ids::{MemberId, MessageId};
pub use memory::MemoryMessageStore;
pub use types::{Author, Cursor, Identity, MAX_MESSAGE_CHARS, Message, Page};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Remote message source consumed by the sync engine.
///
/// Implementations must return pages newest-first and assign strictly
/// increasing ids to created messages.
pub trait MessageStore: Send + Sync {
    fn fetch_page(&self, cursor: Cursor) -> BoxFuture<'_, StoreResult<Page>>;
    fn send_message(&self, text: String) -> BoxFuture<'_, StoreResult<Message>>;
    fn current_identity(&self) -> BoxFuture<'_, StoreResult<Identity>>;
}
