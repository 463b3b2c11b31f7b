//! Offline chat room backed by [`MemoryMessageStore`].

use std::sync::Arc;
use std::time::Duration;

use murmur_store::{Author, Identity, MemberId, MemoryMessageStore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const SEEDED_HISTORY: usize = 45;
const STORE_LATENCY: Duration = Duration::from_millis(120);

const PARTICIPANTS: [(u64, &str); 3] = [(2, "mara"), (3, "ilya"), (4, "noor")];

const LINES: [&str; 8] = [
    "anyone around?",
    "pushed the fix, can someone take a look",
    "lunch in ten",
    "the build is green again",
    "did the release notes go out?",
    "brb",
    "I'll pick up the flaky test tomorrow",
    "sounds good",
];

pub fn demo_identity() -> Identity {
    Identity::new(MemberId::new(1), "you")
}

fn participant(turn: usize) -> Author {
    let (id, name) = PARTICIPANTS[turn % PARTICIPANTS.len()];
    Author::new(MemberId::new(id), name)
}

fn line(turn: usize) -> &'static str {
    LINES[turn % LINES.len()]
}

/// Store seeded with enough history to need a few older pages.
pub fn demo_store() -> Arc<MemoryMessageStore> {
    let store = MemoryMessageStore::new(demo_identity()).with_latency(STORE_LATENCY);
    for turn in 0..SEEDED_HISTORY {
        store.post_as(&participant(turn), format!("{} (#{})", line(turn), turn + 1));
    }
    Arc::new(store)
}

/// Background task posting as the other participants.
pub struct DemoParticipants {
    task: JoinHandle<()>,
}

impl DemoParticipants {
    pub fn start(store: Arc<MemoryMessageStore>, interval: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut turn = SEEDED_HISTORY;
            loop {
                ticker.tick().await;
                let message = store.post_as(&participant(turn), line(turn));
                tracing::debug!(message_id = %message.id, author = %message.author.display_name, "demo participant posted");
                turn += 1;
            }
        });
        Self { task }
    }
}

impl Drop for DemoParticipants {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_store_spans_several_pages() {
        let store = demo_store();

        assert_eq!(store.len(), SEEDED_HISTORY);
        assert!(store.messages().iter().all(|message| message.author.id != demo_identity().id));
    }

    #[tokio::test(start_paused = true)]
    async fn participants_post_on_each_interval_until_dropped() {
        let store = demo_store();
        let participants = DemoParticipants::start(store.clone(), Duration::from_secs(2));

        tokio::time::sleep(Duration::from_millis(4_100)).await;
        assert_eq!(store.len(), SEEDED_HISTORY + 2);

        drop(participants);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.len(), SEEDED_HISTORY + 2);
    }
}
