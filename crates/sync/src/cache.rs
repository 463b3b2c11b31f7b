use std::collections::HashSet;
use std::sync::Arc;

use murmur_store::{Cursor, Message, MessageId};

use crate::events::CacheSnapshot;

/// The three fetch kinds, each guarded by its own in-flight flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    Initial,
    Older,
    Poll,
}

impl FetchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "load-initial",
            Self::Older => "load-older",
            Self::Poll => "poll",
        }
    }
}

/// Why an operation returned without touching the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    AlreadyInFlight,
    NoMoreOlder,
    NotInitialized,
}

/// Where a merge placed the messages it accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub prepended: usize,
    pub appended: usize,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.inserted == 0
    }
}

/// Ticket returned by [`MessageCache::try_begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FetchTicket {
    pub(crate) epoch: u64,
    /// Generation of the cached window; bumped whenever it is replaced.
    pub(crate) window: u64,
    pub(crate) cursor: Cursor,
}

/// Ordered, duplicate-free window of messages plus pagination state.
///
/// Messages are kept ascending by id; `index` mirrors the ids for O(1) dedup.
#[derive(Debug)]
pub struct MessageCache {
    messages: Vec<Message>,
    index: HashSet<MessageId>,
    page_size: u32,
    has_more_older: bool,
    next_older_page: u32,
    initialized: bool,
    is_loading_initial: bool,
    is_fetching_older: bool,
    is_polling: bool,
    epoch: u64,
    window: u64,
}

impl MessageCache {
    pub fn new(page_size: u32) -> Self {
        Self {
            messages: Vec::new(),
            index: HashSet::new(),
            page_size,
            has_more_older: false,
            next_older_page: 2,
            initialized: false,
            is_loading_initial: false,
            is_fetching_older: false,
            is_polling: false,
            epoch: 0,
            window: 0,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.index.contains(&id)
    }

    /// Greatest cached id; the poll merge boundary.
    pub fn high_water_mark(&self) -> Option<MessageId> {
        self.messages.last().map(|message| message.id)
    }

    pub fn low_water_mark(&self) -> Option<MessageId> {
        self.messages.first().map(|message| message.id)
    }

    pub fn has_more_older(&self) -> bool {
        self.has_more_older
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_loading_initial(&self) -> bool {
        self.is_loading_initial
    }

    pub fn is_fetching_older(&self) -> bool {
        self.is_fetching_older
    }

    pub fn is_polling(&self) -> bool {
        self.is_polling
    }

    /// Page the next older fetch starts from.
    ///
    /// The window is a gap-free run back from the newest message, so the page
    /// holding position `len()` can only begin at or inside the cached range.
    /// Messages posted since then shift history deeper, never shallower.
    pub fn next_older_page(&self) -> u32 {
        let page_size = self.page_size.max(1) as usize;
        let by_length = u32::try_from(self.messages.len() / page_size)
            .unwrap_or(u32::MAX)
            .saturating_add(1);
        self.next_older_page.max(by_length)
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            messages: Arc::from(self.messages.as_slice()),
            has_more_older: self.has_more_older,
        }
    }

    /// Checks the preconditions for `kind` and raises its in-flight flag.
    pub(crate) fn try_begin(&mut self, kind: FetchKind) -> Result<FetchTicket, SkipReason> {
        let cursor = match kind {
            FetchKind::Initial => {
                if self.is_loading_initial {
                    return Err(SkipReason::AlreadyInFlight);
                }
                self.is_loading_initial = true;
                Cursor::first(self.page_size)
            }
            FetchKind::Older => {
                if !self.initialized {
                    return Err(SkipReason::NotInitialized);
                }
                if self.is_fetching_older {
                    return Err(SkipReason::AlreadyInFlight);
                }
                if !self.has_more_older {
                    return Err(SkipReason::NoMoreOlder);
                }
                self.is_fetching_older = true;
                Cursor::new(self.next_older_page(), self.page_size)
            }
            FetchKind::Poll => {
                if !self.initialized {
                    return Err(SkipReason::NotInitialized);
                }
                if self.is_polling {
                    return Err(SkipReason::AlreadyInFlight);
                }
                self.is_polling = true;
                Cursor::first(self.page_size)
            }
        };

        Ok(FetchTicket {
            epoch: self.epoch,
            window: self.window,
            cursor,
        })
    }

    /// Lowers the in-flight flag unless a reset already started a new epoch.
    pub(crate) fn finish(&mut self, kind: FetchKind, epoch: u64) {
        if epoch != self.epoch {
            return;
        }

        match kind {
            FetchKind::Initial => self.is_loading_initial = false,
            FetchKind::Older => self.is_fetching_older = false,
            FetchKind::Poll => self.is_polling = false,
        }
    }

    /// Replaces the whole window with the newest `pages_loaded` pages, already
    /// ascending. Older fetches begun against the previous window go stale.
    pub(crate) fn replace_with(
        &mut self,
        ascending: Vec<Message>,
        has_more_older: bool,
        pages_loaded: u32,
    ) -> MergeReport {
        self.messages.clear();
        self.index.clear();
        let report = self.merge(ascending);
        self.has_more_older = has_more_older;
        self.next_older_page = pages_loaded.saturating_add(1);
        self.initialized = true;
        self.window = self.window.wrapping_add(1);
        report
    }

    /// Records a successful older fetch that ended on `last_page`.
    pub(crate) fn record_older_page(&mut self, has_more_older: bool, last_page: u32) {
        self.has_more_older = has_more_older;
        self.next_older_page = self.next_older_page.max(last_page.saturating_add(1));
    }

    /// Drops known ids, then places the rest at the end they belong to.
    ///
    /// Each fetch kind contributes one contiguous block at one end, so the
    /// prepend/append paths are the normal case; anything straddling the
    /// current range falls back to ordered insertion.
    pub fn merge(&mut self, batch: Vec<Message>) -> MergeReport {
        let offered = batch.len();
        let mut fresh = Vec::with_capacity(offered);
        for message in batch {
            if self.index.insert(message.id) {
                fresh.push(message);
            }
        }

        let mut report = MergeReport {
            inserted: fresh.len(),
            duplicates: offered - fresh.len(),
            ..MergeReport::default()
        };
        if fresh.is_empty() {
            return report;
        }

        if !fresh.windows(2).all(|pair| pair[0].id < pair[1].id) {
            fresh.sort_unstable_by_key(|message| message.id);
        }

        let (Some(batch_first), Some(batch_last)) = (
            fresh.first().map(|message| message.id),
            fresh.last().map(|message| message.id),
        ) else {
            return report;
        };

        match (self.low_water_mark(), self.high_water_mark()) {
            (Some(low), _) if batch_last < low => {
                report.prepended = fresh.len();
                self.messages.splice(0..0, fresh);
            }
            (_, Some(high)) if batch_first > high => {
                report.appended = fresh.len();
                self.messages.extend(fresh);
            }
            (None, None) => {
                report.appended = fresh.len();
                self.messages = fresh;
            }
            _ => {
                for message in fresh {
                    let position = self
                        .messages
                        .partition_point(|existing| existing.id < message.id);
                    if position == 0 {
                        report.prepended += 1;
                    } else if position == self.messages.len() {
                        report.appended += 1;
                    }
                    self.messages.insert(position, message);
                }
            }
        }

        report
    }

    /// Drops every message and all pagination state, starting a new epoch.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.index.clear();
        self.has_more_older = false;
        self.next_older_page = 2;
        self.initialized = false;
        self.is_loading_initial = false;
        self.is_fetching_older = false;
        self.is_polling = false;
        self.epoch = self.epoch.wrapping_add(1);
        self.window = self.window.wrapping_add(1);
    }
}
