use std::io::{self, Write};

use murmur_store::{MemberId, Message, MessageId};
use murmur_sync::{CacheSnapshot, ScrollAnchor, SyncEvent};

use crate::render::{OLDER_HISTORY_MARKER, format_error, format_message};
use crate::viewport::Viewport;

/// Append-only transcript of the cache on a line-oriented terminal.
///
/// Only messages outside the already printed id range are written, so
/// repeated snapshots never print a message twice.
pub struct Console<W> {
    out: W,
    viewport: Viewport,
    own_id: Option<MemberId>,
    oldest_printed: Option<MessageId>,
    newest_printed: Option<MessageId>,
}

impl<W: Write> Console<W> {
    pub fn new(out: W, viewport: Viewport) -> Self {
        Self {
            out,
            viewport,
            own_id: None,
            oldest_printed: None,
            newest_printed: None,
        }
    }

    pub fn set_identity(&mut self, own_id: Option<MemberId>) {
        self.own_id = own_id;
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn capture_anchor(&self) -> ScrollAnchor {
        self.viewport.capture_anchor()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn apply(&mut self, event: &SyncEvent) -> io::Result<()> {
        self.viewport.apply(event);
        match event {
            SyncEvent::CacheChanged(snapshot) => self.print_snapshot(snapshot),
            SyncEvent::Error(kind) => {
                writeln!(self.out, "{}", format_error(*kind))?;
                self.out.flush()
            }
            SyncEvent::Ready
            | SyncEvent::ScrollToBottomRequested
            | SyncEvent::ScrollAnchorCorrectionRequested { .. } => Ok(()),
        }
    }

    pub fn notice(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }

    fn print_snapshot(&mut self, snapshot: &CacheSnapshot) -> io::Result<()> {
        let (Some(first), Some(last)) = (snapshot.messages.first(), snapshot.messages.last()) else {
            self.oldest_printed = None;
            self.newest_printed = None;
            return Ok(());
        };
        let (first_id, last_id) = (first.id, last.id);

        match (self.oldest_printed, self.newest_printed) {
            (Some(oldest), Some(newest)) => {
                let older = snapshot
                    .messages
                    .iter()
                    .take_while(|message| message.id < oldest)
                    .collect::<Vec<_>>();
                if !older.is_empty() {
                    writeln!(self.out, "{OLDER_HISTORY_MARKER}")?;
                    for message in older {
                        self.print_message(message)?;
                    }
                    writeln!(self.out, "{}", "-".repeat(OLDER_HISTORY_MARKER.len()))?;
                }

                let newer = snapshot.messages.iter().filter(|message| message.id > newest);
                for message in newer {
                    self.print_message(message)?;
                }
            }
            _ => {
                for message in snapshot.messages.iter() {
                    self.print_message(message)?;
                }
            }
        }

        self.oldest_printed = Some(self.oldest_printed.map_or(first_id, |oldest| oldest.min(first_id)));
        self.newest_printed = Some(self.newest_printed.map_or(last_id, |newest| newest.max(last_id)));
        self.out.flush()
    }

    fn print_message(&mut self, message: &Message) -> io::Result<()> {
        let own = self.own_id == Some(message.author_id());
        writeln!(self.out, "{}", format_message(message, own))
    }
}
