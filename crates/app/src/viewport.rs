use murmur_store::Message;
use murmur_sync::{ScrollAnchor, SyncEvent};

/// Near-bottom distance, in rows, used to resume follow mode.
const AUTO_FOLLOW_RESUME_THRESHOLD: f32 = 1.0;
/// Small delta used to ignore floating-point scroll jitter.
const SCROLL_DELTA_EPSILON: f32 = 0.01;
/// Header row carrying the timestamp and author.
const HEADER_ROWS: f32 = 1.0;

/// Scroll model for a transcript measured in terminal rows.
///
/// `offset` is the first visible row counted from the top, so prepending
/// older rows must shift it by the added height to keep the view still.
#[derive(Debug, Clone)]
pub struct Viewport {
    wrap_width: usize,
    visible_rows: f32,
    row_heights: Vec<f32>,
    offset: f32,
    follow_bottom: bool,
    pending_scroll_to_bottom: bool,
}

impl Viewport {
    pub fn new(wrap_width: usize, visible_rows: usize) -> Self {
        Self {
            wrap_width: wrap_width.max(1),
            visible_rows: visible_rows.max(1) as f32,
            row_heights: Vec::new(),
            offset: 0.0,
            follow_bottom: true,
            pending_scroll_to_bottom: false,
        }
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn is_following_bottom(&self) -> bool {
        self.follow_bottom
    }

    pub fn content_height(&self) -> f32 {
        self.row_heights.iter().sum()
    }

    pub fn max_offset(&self) -> f32 {
        (self.content_height() - self.visible_rows).max(0.0)
    }

    pub fn at_top(&self) -> bool {
        self.offset <= SCROLL_DELTA_EPSILON
    }

    /// Height to hand to `load_older`, measured before the fetch starts.
    pub fn capture_anchor(&self) -> ScrollAnchor {
        ScrollAnchor::new(self.content_height())
    }

    pub fn request_scroll_to_bottom(&mut self) {
        self.pending_scroll_to_bottom = true;
        self.follow_bottom = true;
    }

    pub fn request_scroll_to_bottom_if_following(&mut self) {
        if self.follow_bottom || self.is_near_bottom() {
            self.pending_scroll_to_bottom = true;
        }
    }

    pub fn reset(&mut self) {
        self.row_heights.clear();
        self.offset = 0.0;
        self.follow_bottom = true;
        self.pending_scroll_to_bottom = true;
    }

    pub fn apply(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::CacheChanged(snapshot) => {
                if snapshot.is_empty() {
                    self.reset();
                } else {
                    self.measure(&snapshot.messages);
                }
            }
            SyncEvent::Ready => self.request_scroll_to_bottom(),
            SyncEvent::ScrollToBottomRequested => self.request_scroll_to_bottom_if_following(),
            SyncEvent::ScrollAnchorCorrectionRequested { captured_height } => {
                let anchor = ScrollAnchor::new(*captured_height);
                let shifted = self.offset + anchor.correction(self.content_height());
                self.offset = shifted.clamp(0.0, self.max_offset());
            }
            SyncEvent::Error(_) => {}
        }
        self.apply_pending_scroll();
    }

    /// Moves by `rows` (negative scrolls up) and updates follow mode.
    pub fn scroll_by(&mut self, rows: f32) {
        let previous = self.offset;
        self.offset = (self.offset + rows).clamp(0.0, self.max_offset());
        let delta = self.offset - previous;

        if self.follow_bottom {
            // Pause follow mode only when the user scrolls away from the tail.
            if delta < -SCROLL_DELTA_EPSILON {
                self.follow_bottom = false;
            }
        } else if delta > SCROLL_DELTA_EPSILON && self.is_near_bottom() {
            self.follow_bottom = true;
        }
    }

    pub fn apply_pending_scroll(&mut self) -> bool {
        let should_scroll = self.follow_bottom || self.pending_scroll_to_bottom;
        if should_scroll {
            self.offset = self.max_offset();
        }

        self.pending_scroll_to_bottom = false;
        should_scroll
    }

    fn measure(&mut self, messages: &[Message]) {
        self.row_heights = messages
            .iter()
            .map(|message| estimate_message_height(message, self.wrap_width))
            .collect();
        self.offset = self.offset.min(self.max_offset());
    }

    fn is_near_bottom(&self) -> bool {
        (self.max_offset() - self.offset).abs() <= AUTO_FOLLOW_RESUME_THRESHOLD
    }
}

pub fn estimate_message_height(message: &Message, wrap_width: usize) -> f32 {
    HEADER_ROWS + estimate_text_height(&message.text, wrap_width)
}

fn estimate_text_height(content: &str, wrap_width: usize) -> f32 {
    if content.is_empty() {
        return 1.0;
    }

    let chars_per_line = wrap_width.max(1);
    let line_count: usize = content
        .lines()
        .map(|line| line.chars().count().max(1).div_ceil(chars_per_line))
        .sum();
    line_count.max(1) as f32
}
