use std::path::PathBuf;

use snafu::{OptionExt, Snafu};

pub const USAGE: &str = "usage: murmur [--config PATH] [--session COOKIE] [--demo]";
pub const HELP: &str = "type a message and press enter to send; /older loads earlier history; /quit exits";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("help requested on `{stage}`"))]
    HelpRequested { stage: &'static str },
    #[snafu(display("unknown argument `{argument}` on `{stage}`"))]
    UnknownArgument {
        stage: &'static str,
        argument: String,
    },
    #[snafu(display("`{flag}` expects a value on `{stage}`"))]
    MissingValue {
        stage: &'static str,
        flag: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    /// Session cookie to save into the settings file before connecting.
    pub session_cookie: Option<String>,
    pub demo: bool,
}

impl CliArgs {
    /// Parses arguments after the program name.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, CliError> {
        let stage = "parse-cli-args";
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(argument) = args.next() {
            match argument.as_str() {
                "--demo" => parsed.demo = true,
                "--config" => {
                    let path = args.next().context(MissingValueSnafu {
                        stage,
                        flag: "--config",
                    })?;
                    parsed.config_path = Some(PathBuf::from(path));
                }
                "--session" => {
                    let cookie = args.next().context(MissingValueSnafu {
                        stage,
                        flag: "--session",
                    })?;
                    parsed.session_cookie = Some(cookie);
                }
                "-h" | "--help" => return HelpRequestedSnafu { stage }.fail(),
                _ => {
                    if let Some(path) = argument.strip_prefix("--config=").filter(|path| !path.is_empty()) {
                        parsed.config_path = Some(PathBuf::from(path));
                    } else if let Some(cookie) =
                        argument.strip_prefix("--session=").filter(|cookie| !cookie.is_empty())
                    {
                        parsed.session_cookie = Some(cookie.to_string());
                    } else {
                        return UnknownArgumentSnafu { stage, argument }.fail();
                    }
                }
            }
        }

        Ok(parsed)
    }
}

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Older,
    Help,
    Quit,
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed {
            "" => Self::Empty,
            "/older" => Self::Older,
            "/help" => Self::Help,
            "/quit" | "/exit" => Self::Quit,
            // A doubled slash escapes text that starts with one.
            _ => match trimmed.strip_prefix("//") {
                Some(rest) => Self::Send(format!("/{rest}")),
                None => Self::Send(line.to_string()),
            },
        }
    }
}
