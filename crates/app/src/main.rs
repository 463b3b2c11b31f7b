use std::io::Stdout;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use murmur::cli::{CliArgs, CliError, Command, HELP, USAGE};
use murmur::console::Console;
use murmur::demo::{DemoParticipants, demo_store};
use murmur::settings::SettingsStore;
use murmur::viewport::Viewport;
use murmur_store::{ErrorKind, HttpMessageStore, Message, MessageStore};
use murmur_sync::{ChatSession, ComposeError, SkipReason, SyncEvent, SyncEventStream, SyncOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "murmur=info,murmur_sync=info,murmur_store=info";
const DEMO_POST_INTERVAL: Duration = Duration::from_secs(7);
const TRANSCRIPT_WIDTH: usize = 80;
const TRANSCRIPT_ROWS: usize = 24;

enum Background {
    Sent(Result<Message, ComposeError>),
    Older(SyncOutcome),
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so the transcript on stdout stays readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = match CliArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(CliError::HelpRequested { .. }) => {
            println!("{USAGE}\n{HELP}");
            return ExitCode::SUCCESS;
        }
        Err(error) => {
            eprintln!("{error}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    let settings_store = match args.config_path {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::load(),
    };
    if let Some(cookie) = args.session_cookie {
        match settings_store.remember_session(cookie) {
            Ok(()) => tracing::info!(path = %settings_store.config_path().display(), "session saved"),
            Err(error) => tracing::warn!(error = %error, "failed to save session"),
        }
    }
    let settings = settings_store.settings();

    let (store, _participants): (Arc<dyn MessageStore>, Option<DemoParticipants>) = if args.demo {
        let store = demo_store();
        let participants = DemoParticipants::start(store.clone(), DEMO_POST_INTERVAL);
        (store as Arc<dyn MessageStore>, Some(participants))
    } else {
        match HttpMessageStore::new(settings.server.to_store_config()) {
            Ok(store) => {
                tracing::info!(base_url = %store.base_url(), "using message store");
                (Arc::new(store) as Arc<dyn MessageStore>, None)
            }
            Err(error) => {
                tracing::error!(error = %error, "failed to build message store client");
                return ExitCode::FAILURE;
            }
        }
    };

    let (mut session, mut events) = ChatSession::new(store, settings.sync);
    let mut console = Console::new(
        std::io::stdout(),
        Viewport::new(TRANSCRIPT_WIDTH, TRANSCRIPT_ROWS),
    );

    if let Err(error) = session.start().await {
        for event in events.drain() {
            show(&mut console, &event);
        }
        tracing::error!(error = %error, "chat session failed to start");
        return ExitCode::FAILURE;
    }
    console.set_identity(session.identity().map(|identity| identity.id));

    let exit = run(&session, &mut events, &mut console).await;
    session.stop().await;
    exit
}

async fn run(
    session: &ChatSession,
    events: &mut SyncEventStream,
    console: &mut Console<Stdout>,
) -> ExitCode {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut background = JoinSet::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    return ExitCode::SUCCESS;
                };
                show(console, &event);
                if event == SyncEvent::Error(ErrorKind::Unauthorized) {
                    tracing::error!("session is no longer authorized");
                    return ExitCode::FAILURE;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => match Command::parse(&line) {
                    Command::Send(text) => {
                        let composer = session.composer().clone();
                        background.spawn(async move { Background::Sent(composer.send(text).await) });
                    }
                    Command::Older => {
                        let anchor = console.capture_anchor();
                        let engine = session.engine().clone();
                        background.spawn(async move { Background::Older(engine.load_older(anchor).await) });
                    }
                    Command::Help => notice(console, HELP),
                    Command::Quit => return ExitCode::SUCCESS,
                    Command::Empty => {}
                },
                Ok(None) => return ExitCode::SUCCESS,
                Err(error) => {
                    tracing::error!(error = %error, "failed to read from stdin");
                    return ExitCode::FAILURE;
                }
            },
            Some(joined) = background.join_next(), if !background.is_empty() => match joined {
                // Store failures already arrive as `SyncEvent::Error`.
                Ok(Background::Sent(Err(error))) if error.store_kind().is_none() => {
                    notice(console, &format!("! {error}"));
                }
                Ok(Background::Older(SyncOutcome::Skipped(SkipReason::NoMoreOlder))) => {
                    notice(console, "(no earlier messages)");
                }
                Ok(Background::Older(SyncOutcome::Skipped(SkipReason::AlreadyInFlight))) => {
                    notice(console, "(still loading earlier messages)");
                }
                Ok(_) => {}
                Err(error) => tracing::warn!(error = %error, "background task failed"),
            },
            _ = &mut ctrl_c => return ExitCode::SUCCESS,
        }
    }
}

fn show(console: &mut Console<Stdout>, event: &SyncEvent) {
    if let Err(error) = console.apply(event) {
        tracing::warn!(error = %error, "failed to write transcript");
    }
}

fn notice(console: &mut Console<Stdout>, line: &str) {
    if let Err(error) = console.notice(line) {
        tracing::warn!(error = %error, "failed to write transcript");
    }
}
