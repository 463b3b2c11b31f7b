use std::sync::Arc;

use murmur_store::{ErrorKind, Identity, Message, MessageStore, StoreError};
use snafu::{ResultExt, Snafu, ensure};

use crate::composer::Composer;
use crate::config::SyncConfig;
use crate::engine::{SyncEngine, SyncOutcome};
use crate::events::SyncEventStream;
use crate::scheduler::{PollExit, PollScheduler};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("session is not authorized on `{stage}`"))]
    Unauthorized { stage: &'static str },
    #[snafu(display("failed to resolve the current identity on `{stage}`: {source}"))]
    Identity {
        stage: &'static str,
        source: StoreError,
    },
    #[snafu(display("chat session already started on `{stage}`"))]
    AlreadyStarted { stage: &'static str },
}

impl SessionError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Unauthorized { .. } => Some(ErrorKind::Unauthorized),
            Self::Identity { source, .. } => Some(source.kind()),
            Self::AlreadyStarted { .. } => None,
        }
    }
}

/// One viewing session: identity, engine, composer and poll loop.
///
/// Nothing runs until [`ChatSession::start`]; [`ChatSession::stop`] tears the
/// loop down and resets the cache so late results are discarded.
pub struct ChatSession {
    engine: SyncEngine,
    composer: Composer,
    identity: Option<Identity>,
    scheduler: Option<PollScheduler>,
}

impl ChatSession {
    pub fn new(store: Arc<dyn MessageStore>, config: SyncConfig) -> (Self, SyncEventStream) {
        let (engine, events) = SyncEngine::new(store, config);
        let session = Self {
            composer: Composer::new(engine.clone()),
            engine,
            identity: None,
            scheduler: None,
        };
        (session, events)
    }

    /// Resolves the identity, loads the newest page and starts polling.
    ///
    /// A failed initial load still starts the loop; its ticks retry the load.
    pub async fn start(&mut self) -> Result<SyncOutcome, SessionError> {
        let stage = "session-start";
        ensure!(self.scheduler.is_none(), AlreadyStartedSnafu { stage });

        let epoch = self.engine.epoch();
        let identity = match self.engine.store().current_identity().await {
            Ok(identity) => identity,
            Err(source) => {
                self.engine.report_failure("session-identity", epoch, &source);
                if source.kind() == ErrorKind::Unauthorized {
                    return UnauthorizedSnafu { stage }.fail();
                }
                return Err(source).context(IdentitySnafu { stage });
            }
        };
        tracing::info!(
            member_id = %identity.id,
            display_name = %identity.display_name,
            "chat session starting"
        );
        self.identity = Some(identity);

        let outcome = self.engine.load_initial().await;
        if outcome.failure() == Some(ErrorKind::Unauthorized) {
            self.identity = None;
            return UnauthorizedSnafu {
                stage: "session-initial-load",
            }
            .fail();
        }

        let config = self.engine.config();
        self.scheduler = Some(PollScheduler::start(self.engine.clone(), config.poll_interval()));
        Ok(outcome)
    }

    /// Stops polling and clears the cache. Safe to call more than once.
    pub async fn stop(&mut self) -> Option<PollExit> {
        let exit = match self.scheduler.as_mut() {
            Some(scheduler) => scheduler.stop().await,
            None => None,
        };
        self.scheduler = None;
        self.identity = None;
        self.engine.reset();
        tracing::info!(?exit, "chat session stopped");
        exit
    }

    pub fn is_running(&self) -> bool {
        self.scheduler
            .as_ref()
            .is_some_and(PollScheduler::is_running)
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn is_own(&self, message: &Message) -> bool {
        self.identity
            .as_ref()
            .is_some_and(|identity| identity.id == message.author_id())
    }
}
