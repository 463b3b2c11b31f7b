use std::fmt;
use std::num::ParseIntError;

use snafu::Snafu;

/// Coarse failure classes surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Session is invalid; the caller should re-authenticate instead of retrying.
    Unauthorized,
    /// Network, server or payload failure; safe to retry on the next gesture or tick.
    TransportFailure,
    /// Input was rejected; cache state is unaffected.
    ValidationError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::TransportFailure => "transport-failure",
            Self::ValidationError => "validation-error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("session is not authorized on `{stage}` (status {status})"))]
    Unauthorized { stage: &'static str, status: u16 },
    #[snafu(display("message store rejected the request on `{stage}`: {details}"))]
    Validation {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("message store request failed on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("message store returned status {status} on `{stage}`: {body}"))]
    UnexpectedStatus {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode message store response on `{stage}`: {source}"))]
    Decode {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("malformed page on `{stage}`: {details}"))]
    MalformedPage {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("message store is unavailable on `{stage}`: {details}"))]
    Unavailable {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("store id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
        source: ParseIntError,
    },
    #[snafu(display("message store base url '{base_url}' is invalid"))]
    InvalidBaseUrl {
        stage: &'static str,
        base_url: String,
        source: url::ParseError,
    },
    #[snafu(display("session cookie cannot be sent as a header on `{stage}`"))]
    InvalidSessionCookie {
        stage: &'static str,
        source: reqwest::header::InvalidHeaderValue,
    },
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::Transport { .. }
            | Self::UnexpectedStatus { .. }
            | Self::Decode { .. }
            | Self::MalformedPage { .. }
            | Self::Unavailable { .. }
            | Self::InvalidId { .. }
            | Self::InvalidBaseUrl { .. }
            | Self::InvalidSessionCookie { .. }
            | Self::BuildClient { .. } => ErrorKind::TransportFailure,
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::Unauthorized { stage, .. }
            | Self::Validation { stage, .. }
            | Self::Transport { stage, .. }
            | Self::UnexpectedStatus { stage, .. }
            | Self::Decode { stage, .. }
            | Self::MalformedPage { stage, .. }
            | Self::Unavailable { stage, .. }
            | Self::InvalidId { stage, .. }
            | Self::InvalidBaseUrl { stage, .. }
            | Self::InvalidSessionCookie { stage, .. }
            | Self::BuildClient { stage, .. } => stage,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_onto_presentation_error_kinds() {
        let unauthorized = StoreError::Unauthorized {
            stage: "test",
            status: 401,
        };
        let validation = StoreError::Validation {
            stage: "test",
            details: "blank".to_string(),
        };
        let server = StoreError::UnexpectedStatus {
            stage: "test",
            status: 502,
            body: String::new(),
        };

        assert_eq!(unauthorized.kind(), ErrorKind::Unauthorized);
        assert_eq!(validation.kind(), ErrorKind::ValidationError);
        assert_eq!(server.kind(), ErrorKind::TransportFailure);
        assert_eq!(server.stage(), "test");
    }
}
