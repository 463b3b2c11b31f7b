use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use murmur_store::{Cursor, ErrorKind, Message, MessageStore, Page, StoreError, StoreResult};

use crate::cache::{FetchKind, FetchTicket, MergeReport, MessageCache, SkipReason};
use crate::config::SyncConfig;
use crate::events::{CacheSnapshot, EventSink, ScrollAnchor, SyncEvent, SyncEventStream, event_channel};

/// Result of one engine operation. Failures are reported here and as a
/// [`SyncEvent::Error`], never as a panic or an `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied(MergeReport),
    Unchanged,
    Skipped(SkipReason),
    /// The fetch resolved after a reset; its result was dropped.
    Discarded,
    Failed(ErrorKind),
}

impl SyncOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn failure(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed(kind) => Some(*kind),
            Self::Applied(_) | Self::Unchanged | Self::Skipped(_) | Self::Discarded => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// A poll already delivered the same id.
    AlreadyPresent,
    Discarded,
}

struct EngineInner {
    store: Arc<dyn MessageStore>,
    config: SyncConfig,
    cache: Mutex<MessageCache>,
    events: EventSink,
}

/// Merges initial, older and polled pages into one [`MessageCache`].
///
/// Cheap to clone; all clones share the same cache. The cache lock is only
/// taken between suspension points, so every resolved fetch applies its
/// writes in one step.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

/// Raised in-flight flag for one fetch kind; lowered on drop, including
/// when the owning task is cancelled.
struct InFlight<'a> {
    engine: &'a SyncEngine,
    kind: FetchKind,
    ticket: FetchTicket,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.engine.cache().finish(self.kind, self.ticket.epoch);
    }
}

impl SyncEngine {
    pub fn new(store: Arc<dyn MessageStore>, config: SyncConfig) -> (Self, SyncEventStream) {
        let config = config.normalized();
        let (events, stream) = event_channel();
        let engine = Self {
            inner: Arc::new(EngineInner {
                store,
                config,
                cache: Mutex::new(MessageCache::new(config.page_size)),
                events,
            }),
        };
        (engine, stream)
    }

    pub fn config(&self) -> SyncConfig {
        self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.inner.store
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.cache().snapshot()
    }

    pub fn epoch(&self) -> u64 {
        self.cache().epoch()
    }

    /// Runs `read` against the cache under its lock.
    pub fn inspect<R>(&self, read: impl FnOnce(&MessageCache) -> R) -> R {
        read(&self.cache())
    }

    /// Replaces the cache with the newest page.
    pub async fn load_initial(&self) -> SyncOutcome {
        let operation = FetchKind::Initial;
        let flight = match self.begin(operation) {
            Ok(flight) => flight,
            Err(reason) => return self.skipped(operation, reason),
        };
        let epoch = flight.ticket.epoch;

        let page = match self.fetch(flight.ticket.cursor).await {
            Ok(page) => page,
            Err(error) => return self.failed(operation, epoch, &error),
        };

        let applied = {
            let mut cache = self.cache();
            (cache.epoch() == epoch).then(|| {
                let has_more_older = page.has_next;
                let report = cache.replace_with(page.into_ascending(), has_more_older, 1);
                (report, cache.snapshot())
            })
        };
        let Some((report, snapshot)) = applied else {
            return self.discarded(operation, epoch);
        };

        tracing::info!(
            operation = operation.as_str(),
            epoch,
            loaded = report.inserted,
            has_more_older = snapshot.has_more_older,
            high_water_mark = ?snapshot.newest().map(|message| message.id),
            "initial page applied"
        );
        self.emit(SyncEvent::CacheChanged(snapshot));
        self.emit(SyncEvent::Ready);
        self.emit(SyncEvent::ScrollToBottomRequested);
        SyncOutcome::Applied(report)
    }

    /// Prepends the next older page.
    ///
    /// `anchor` must be measured before this call; it is echoed back in
    /// [`SyncEvent::ScrollAnchorCorrectionRequested`] once the prepend lands.
    /// Messages posted since the window was filled shift history deeper, so
    /// pages holding nothing older than the cache are walked past (up to
    /// `max_catch_up_pages`).
    pub async fn load_older(&self, anchor: ScrollAnchor) -> SyncOutcome {
        let operation = FetchKind::Older;
        let flight = match self.begin(operation) {
            Ok(flight) => flight,
            Err(reason) => return self.skipped(operation, reason),
        };
        let epoch = flight.ticket.epoch;
        let window = flight.ticket.window;
        let boundary = self.cache().low_water_mark();

        let mut cursor = flight.ticket.cursor;
        let mut older = Vec::new();
        let mut pages_walked = 0_u32;
        let has_more_older = loop {
            let page = match self.fetch(cursor).await {
                Ok(page) => page,
                Err(error) => return self.failed(operation, epoch, &error),
            };
            pages_walked += 1;

            let has_next = page.has_next;
            older.extend(
                page.messages
                    .into_iter()
                    .filter(|message| boundary.is_none_or(|low| message.id < low)),
            );

            if !older.is_empty() || !has_next {
                break has_next;
            }
            if pages_walked > self.inner.config.max_catch_up_pages {
                tracing::warn!(
                    operation = operation.as_str(),
                    epoch,
                    page = cursor.page,
                    low_water_mark = ?boundary,
                    "older pages hold only cached messages; stopping this walk"
                );
                break has_next;
            }
            cursor = cursor.next();
        };
        older.reverse();

        let applied = {
            let mut cache = self.cache();
            (cache.epoch() == epoch && cache.window() == window).then(|| {
                let had_more_older = cache.has_more_older();
                let report = cache.merge(older);
                cache.record_older_page(has_more_older, cursor.page);
                (report, had_more_older != has_more_older, cache.snapshot())
            })
        };
        let Some((report, continuation_changed, snapshot)) = applied else {
            return self.discarded(operation, epoch);
        };

        tracing::debug!(
            operation = operation.as_str(),
            epoch,
            page = cursor.page,
            pages_walked,
            inserted = report.inserted,
            has_more_older = snapshot.has_more_older,
            "older page merged"
        );

        if report.is_empty() {
            if continuation_changed {
                self.emit(SyncEvent::CacheChanged(snapshot));
            }
            return SyncOutcome::Unchanged;
        }

        self.emit(SyncEvent::CacheChanged(snapshot));
        self.emit(SyncEvent::ScrollAnchorCorrectionRequested {
            captured_height: anchor.captured_height,
        });
        SyncOutcome::Applied(report)
    }

    /// Appends messages newer than the cached high-water mark.
    ///
    /// When every message on a page is newer than the mark, older pages are
    /// walked (up to `max_catch_up_pages`) so a burst larger than one page
    /// does not leave a hole. A burst longer than that replaces the window
    /// with the pages walked; older history comes back through pagination.
    pub async fn poll(&self) -> SyncOutcome {
        let operation = FetchKind::Poll;
        let flight = match self.begin(operation) {
            Ok(flight) => flight,
            Err(reason) => return self.skipped(operation, reason),
        };
        let epoch = flight.ticket.epoch;
        let boundary = self.cache().high_water_mark();

        let mut cursor = flight.ticket.cursor;
        let mut newest_first = Vec::new();
        let mut pages_walked = 0_u32;
        let mut left_gap = false;
        loop {
            let page = match self.fetch(cursor).await {
                Ok(page) => page,
                Err(error) => return self.failed(operation, epoch, &error),
            };
            pages_walked += 1;

            let reached_boundary = match boundary {
                Some(boundary) => page
                    .messages
                    .last()
                    .is_none_or(|oldest| oldest.id <= boundary),
                None => true,
            };
            let has_next = page.has_next;
            newest_first.extend(page.messages);

            if reached_boundary || !has_next {
                break;
            }
            if pages_walked > self.inner.config.max_catch_up_pages {
                tracing::warn!(
                    operation = operation.as_str(),
                    epoch,
                    pages_walked,
                    high_water_mark = ?boundary,
                    "poll catch-up limit reached; replacing the cache with the newest pages"
                );
                left_gap = true;
                break;
            }
            cursor = cursor.next();
        }

        let mut ascending = newest_first;
        ascending.reverse();

        let applied = {
            let mut cache = self.cache();
            (cache.epoch() == epoch).then(|| {
                if left_gap {
                    let report = cache.replace_with(ascending, true, pages_walked);
                    return (report, Some(cache.snapshot()), cache.high_water_mark());
                }
                let high_water_mark = cache.high_water_mark();
                let newer = ascending
                    .into_iter()
                    .filter(|message| high_water_mark.is_none_or(|mark| message.id > mark))
                    .collect::<Vec<_>>();
                let report = cache.merge(newer);
                let snapshot = (!report.is_empty()).then(|| cache.snapshot());
                (report, snapshot, cache.high_water_mark())
            })
        };
        let Some((report, snapshot, high_water_mark)) = applied else {
            return self.discarded(operation, epoch);
        };

        let Some(snapshot) = snapshot else {
            tracing::trace!(operation = operation.as_str(), epoch, "poll found nothing new");
            return SyncOutcome::Unchanged;
        };

        tracing::debug!(
            operation = operation.as_str(),
            epoch,
            inserted = report.inserted,
            pages_walked,
            high_water_mark = ?high_water_mark,
            "new messages merged"
        );
        self.emit(SyncEvent::CacheChanged(snapshot));
        self.emit(SyncEvent::ScrollToBottomRequested);
        SyncOutcome::Applied(report)
    }

    /// Polls once initialized; otherwise retries the initial load.
    pub async fn refresh(&self) -> SyncOutcome {
        if self.cache().is_initialized() {
            self.poll().await
        } else {
            self.load_initial().await
        }
    }

    /// Clears the cache and pagination state; in-flight results become stale.
    pub fn reset(&self) {
        let (snapshot, epoch) = {
            let mut cache = self.cache();
            cache.clear();
            (cache.snapshot(), cache.epoch())
        };
        tracing::info!(epoch, "sync state reset");
        self.emit(SyncEvent::CacheChanged(snapshot));
    }

    /// Adds a message the composer got back from the store, unless a poll
    /// already delivered it or the cache was reset since `epoch`.
    pub fn append_confirmed(&self, epoch: u64, message: Message) -> AppendOutcome {
        let id = message.id;
        let applied = {
            let mut cache = self.cache();
            if cache.epoch() != epoch {
                None
            } else if cache.contains(id) {
                Some(None)
            } else {
                cache.merge(vec![message]);
                Some(Some(cache.snapshot()))
            }
        };

        match applied {
            None => {
                tracing::debug!(message_id = %id, epoch, "confirmed message arrived after reset");
                AppendOutcome::Discarded
            }
            Some(None) => {
                tracing::debug!(message_id = %id, "confirmed message already delivered by poll");
                AppendOutcome::AlreadyPresent
            }
            Some(Some(snapshot)) => {
                self.emit(SyncEvent::CacheChanged(snapshot));
                self.emit(SyncEvent::ScrollToBottomRequested);
                AppendOutcome::Appended
            }
        }
    }

    /// Logs a store failure and forwards its kind, unless it belongs to a
    /// previous epoch. Returns whether the error was surfaced.
    pub(crate) fn report_failure(
        &self,
        operation: &'static str,
        epoch: u64,
        error: &StoreError,
    ) -> bool {
        let current_epoch = self.epoch();
        if current_epoch != epoch {
            tracing::debug!(operation, epoch, current_epoch, error = %error, "stale failure ignored");
            return false;
        }

        let kind = error.kind();
        tracing::warn!(operation, epoch, error_kind = %kind, error = %error, "message store call failed");
        self.emit(SyncEvent::Error(kind));
        true
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        self.inner.events.emit(event);
    }

    fn cache(&self) -> MutexGuard<'_, MessageCache> {
        self.inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, kind: FetchKind) -> Result<InFlight<'_>, SkipReason> {
        let ticket = self.cache().try_begin(kind)?;
        Ok(InFlight {
            engine: self,
            kind,
            ticket,
        })
    }

    async fn fetch(&self, cursor: Cursor) -> StoreResult<Page> {
        let page = self.inner.store.fetch_page(cursor).await?;
        page.validate("sync-validate-page")?;
        Ok(page)
    }

    fn skipped(&self, kind: FetchKind, reason: SkipReason) -> SyncOutcome {
        tracing::debug!(operation = kind.as_str(), ?reason, "sync operation skipped");
        SyncOutcome::Skipped(reason)
    }

    fn failed(&self, kind: FetchKind, epoch: u64, error: &StoreError) -> SyncOutcome {
        if self.report_failure(kind.as_str(), epoch, error) {
            SyncOutcome::Failed(error.kind())
        } else {
            SyncOutcome::Discarded
        }
    }

    fn discarded(&self, kind: FetchKind, epoch: u64) -> SyncOutcome {
        tracing::debug!(
            operation = kind.as_str(),
            epoch,
            "fetch resolved after the cache was reset or replaced; result dropped"
        );
        SyncOutcome::Discarded
    }
}
