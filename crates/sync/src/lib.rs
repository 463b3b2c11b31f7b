//! Client-side synchronization of a paginated chat message stream.
//!
//! [`SyncEngine`] keeps a [`MessageCache`] consistent across three fetch
//! kinds (initial, older, poll) that may overlap in time; [`PollScheduler`]
//! drives polling and [`Composer`] appends what the user sends.

pub mod cache;
pub mod composer;
pub mod config;
pub mod engine;
pub mod events;
pub mod scheduler;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{FetchKind, MergeReport, MessageCache, SkipReason};
pub use composer::{ComposeError, Composer};
pub use config::SyncConfig;
pub use engine::{AppendOutcome, SyncEngine, SyncOutcome};
pub use events::{CacheSnapshot, ScrollAnchor, SyncEvent, SyncEventStream};
pub use scheduler::{PollExit, PollScheduler};
pub use session::{ChatSession, SessionError};
