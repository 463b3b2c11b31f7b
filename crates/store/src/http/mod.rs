use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use url::Url;

use super::error::{
    BuildClientSnafu, DecodeSnafu, InvalidBaseUrlSnafu, InvalidSessionCookieSnafu,
    StoreResult, TransportSnafu, UnauthorizedSnafu, UnexpectedStatusSnafu, ValidationSnafu,
};
use super::types::{Cursor, Identity, Message, Page};
use super::{BoxFuture, MessageStore};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SESSION_COOKIE_NAME: &str = "sessionid";
const MESSAGES_PATH: &str = "api/messages/";
const CURRENT_IDENTITY_PATH: &str = "api/auth/me/";
/// Longest response body kept in error details.
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStoreConfig {
    pub base_url: String,
    pub session_cookie: Option<String>,
    pub request_timeout: Duration,
}

impl HttpStoreConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim().to_string(),
            session_cookie: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_session_cookie(mut self, session_cookie: impl Into<String>) -> Self {
        let session_cookie = session_cookie.into().trim().to_string();
        self.session_cookie = (!session_cookie.is_empty()).then_some(session_cookie);
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

/// Paginated list envelope returned by the messages endpoint.
#[derive(Debug, Deserialize)]
struct PageEnvelope {
    #[serde(default)]
    next: Option<String>,
    results: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct HttpMessageStore {
    client: Client,
    base_url: Url,
}

impl HttpMessageStore {
    pub fn new(config: HttpStoreConfig) -> StoreResult<Self> {
        let base_url = normalize_base_url(&config.base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(cookie) = config.session_cookie.as_deref() {
            let value = HeaderValue::from_str(&format!("{SESSION_COOKIE_NAME}={cookie}"))
                .context(InvalidSessionCookieSnafu {
                    stage: "http-store-session-cookie",
                })?;
            headers.insert(header::COOKIE, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .context(BuildClientSnafu {
                stage: "http-store-build-client",
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> StoreResult<Url> {
        self.base_url.join(path).context(InvalidBaseUrlSnafu {
            stage: "http-store-join-endpoint",
            base_url: self.base_url.to_string(),
        })
    }

    async fn execute(
        &self,
        stage: &'static str,
        request: RequestBuilder,
    ) -> StoreResult<(StatusCode, String)> {
        let started_at = Instant::now();
        let response = request.send().await.context(TransportSnafu { stage })?;
        let status = response.status();
        let body = response.text().await.context(TransportSnafu { stage })?;

        tracing::debug!(
            stage,
            status = status.as_u16(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            body_bytes = body.len(),
            "message store request completed"
        );
        Ok((status, body))
    }

    async fn fetch_page_inner(&self, cursor: Cursor) -> StoreResult<Page> {
        let stage = "http-store-fetch-page";
        let url = self.endpoint(MESSAGES_PATH)?;
        let request = self.client.get(url).query(&[
            ("page", cursor.page.to_string()),
            ("page_size", cursor.page_size.to_string()),
        ]);
        let (status, body) = self.execute(stage, request).await?;

        // The paginator answers 404 once the requested page runs past the end of history.
        if status == StatusCode::NOT_FOUND && cursor.page > 1 {
            tracing::debug!(page = cursor.page, "page beyond end of history");
            return Ok(Page::empty());
        }

        let body = check_status(stage, status, body)?;
        let envelope: PageEnvelope = decode(stage, &body)?;
        let page = Page::new(envelope.results, envelope.next.is_some());
        page.validate(stage)?;
        Ok(page)
    }

    async fn send_message_inner(&self, text: String) -> StoreResult<Message> {
        let stage = "http-store-send-message";
        let url = self.endpoint(MESSAGES_PATH)?;
        let request = self
            .client
            .post(url)
            .json(&serde_json::json!({ "text": text }));
        let (status, body) = self.execute(stage, request).await?;
        let body = check_status(stage, status, body)?;
        decode(stage, &body)
    }

    async fn current_identity_inner(&self) -> StoreResult<Identity> {
        let stage = "http-store-current-identity";
        let url = self.endpoint(CURRENT_IDENTITY_PATH)?;
        let (status, body) = self.execute(stage, self.client.get(url)).await?;
        let body = check_status(stage, status, body)?;
        decode(stage, &body)
    }
}

impl MessageStore for HttpMessageStore {
    fn fetch_page(&self, cursor: Cursor) -> BoxFuture<'_, StoreResult<Page>> {
        Box::pin(self.fetch_page_inner(cursor))
    }

    fn send_message(&self, text: String) -> BoxFuture<'_, StoreResult<Message>> {
        Box::pin(self.send_message_inner(text))
    }

    fn current_identity(&self) -> BoxFuture<'_, StoreResult<Identity>> {
        Box::pin(self.current_identity_inner())
    }
}

fn normalize_base_url(raw: &str) -> StoreResult<Url> {
    let trimmed = raw.trim();
    // `Url::join` replaces the last path segment unless the base ends with a slash.
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };

    Url::parse(&with_slash).context(InvalidBaseUrlSnafu {
        stage: "http-store-parse-base-url",
        base_url: trimmed.to_string(),
    })
}

fn check_status(stage: &'static str, status: StatusCode, body: String) -> StoreResult<String> {
    match status.as_u16() {
        200..=299 => Ok(body),
        401 | 403 => UnauthorizedSnafu {
            stage,
            status: status.as_u16(),
        }
        .fail(),
        400 => ValidationSnafu {
            stage,
            details: validation_details(&body),
        }
        .fail(),
        code => UnexpectedStatusSnafu {
            stage,
            status: code,
            body: truncate_body(&body),
        }
        .fail(),
    }
}

fn decode<T: DeserializeOwned>(stage: &'static str, body: &str) -> StoreResult<T> {
    serde_json::from_str(body).context(DecodeSnafu { stage })
}

fn validation_details(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: Some(error),
            details: Some(details),
        }) => format!("{error}: {details}"),
        Ok(ErrorEnvelope {
            error: Some(error), ..
        }) => error,
        _ => truncate_body(body),
    }
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, StoreError};
    use crate::ids::MessageId;

    #[test]
    fn base_url_gains_trailing_slash_so_endpoints_nest() {
        let store = match HttpMessageStore::new(HttpStoreConfig::new("http://localhost:8000/chat")) {
            Ok(store) => store,
            Err(error) => panic!("store should build: {error}"),
        };

        let endpoint = match store.endpoint(MESSAGES_PATH) {
            Ok(endpoint) => endpoint,
            Err(error) => panic!("endpoint should join: {error}"),
        };
        assert_eq!(endpoint.as_str(), "http://localhost:8000/chat/api/messages/");
    }

    #[test]
    fn rejects_unparseable_base_url() {
        let result = HttpMessageStore::new(HttpStoreConfig::new("not a url"));
        assert!(matches!(result, Err(StoreError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn blank_session_cookie_is_ignored() {
        let config = HttpStoreConfig::new("http://localhost").with_session_cookie("   ");
        assert_eq!(config.session_cookie, None);
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        let unauthorized = check_status("test", StatusCode::UNAUTHORIZED, String::new());
        let forbidden = check_status("test", StatusCode::FORBIDDEN, String::new());
        let invalid = check_status(
            "test",
            StatusCode::BAD_REQUEST,
            r#"{"error": "Validation failed", "details": {"text": ["blank"]}}"#.to_string(),
        );
        let broken = check_status("test", StatusCode::BAD_GATEWAY, "upstream".to_string());

        assert_eq!(unauthorized.err().map(|e| e.kind()), Some(ErrorKind::Unauthorized));
        assert_eq!(forbidden.err().map(|e| e.kind()), Some(ErrorKind::Unauthorized));
        match invalid {
            Err(StoreError::Validation { details, .. }) => {
                assert!(details.starts_with("Validation failed"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(broken.err().map(|e| e.kind()), Some(ErrorKind::TransportFailure));
    }

    #[test]
    fn decodes_paginated_envelope_and_continuation_flag() {
        let body = r#"{
            "count": 3,
            "next": "http://localhost/api/messages/?page=2&page_size=2",
            "previous": null,
            "results": [
                {"id": 3, "author": {"id": 1, "username": "mara"}, "text": "c", "created_at": "2024-03-01T09:15:00Z"},
                {"id": 2, "author": {"id": 2, "username": "devin"}, "text": "b", "created_at": "2024-03-01T09:14:00Z"}
            ]
        }"#;

        let envelope: PageEnvelope = match decode("test", body) {
            Ok(envelope) => envelope,
            Err(error) => panic!("envelope should decode: {error}"),
        };
        let page = Page::new(envelope.results, envelope.next.is_some());
        assert!(page.has_next);
        assert_eq!(page.messages[0].id, MessageId::new(3));
        assert!(page.validate("test").is_ok());
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(ERROR_BODY_LIMIT * 2);
        let truncated = truncate_body(&body);
        assert_eq!(truncated.len(), ERROR_BODY_LIMIT + 3);
    }
}
