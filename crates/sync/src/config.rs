use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_MAX_CATCH_UP_PAGES: u32 = 5;
/// Prevent accidental zero/near-zero values from creating a busy-loop.
const MIN_POLL_INTERVAL_MS: u64 = 100;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_poll_interval_ms", alias = "pollIntervalMs")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_page_size", alias = "pageSize")]
    pub page_size: u32,
    /// Extra newest-first pages a poll may walk when a whole page is newer than the cache.
    #[serde(default = "default_max_catch_up_pages", alias = "maxCatchUpPages")]
    pub max_catch_up_pages: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            page_size: DEFAULT_PAGE_SIZE,
            max_catch_up_pages: DEFAULT_MAX_CATCH_UP_PAGES,
        }
    }
}

impl SyncConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_catch_up_pages(mut self, pages: u32) -> Self {
        self.max_catch_up_pages = pages;
        self
    }

    pub fn normalized(mut self) -> Self {
        self.poll_interval_ms = self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS);
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_max_catch_up_pages() -> u32 {
    DEFAULT_MAX_CATCH_UP_PAGES
}
