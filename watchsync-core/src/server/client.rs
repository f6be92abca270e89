//! Session server HTTP client

use std::future::Future;

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::types::*;
use crate::config::SyncConfig;

/// Errors that can occur when talking to the session server
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid server URL: {0}")]
    InvalidBaseUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} failed (HTTP {status})")]
    Status { operation: &'static str, status: u16 },

    #[error("Unexpected {operation} response: {reason}")]
    Protocol { operation: &'static str, reason: String },

    #[error("A join is already in progress")]
    JoinInProgress,

    #[error("Sync session has stopped")]
    Stopped,
}

impl SessionError {
    /// Transport failures are the ones where the server never answered
    pub fn is_transport(&self) -> bool {
        matches!(self, SessionError::Http(_))
    }
}

/// The remote operations of a session server.
///
/// Implementations are stateless request/response calls; callers own every
/// local state transition that follows a response.
pub trait SessionApi: Clone + Send + Sync + 'static {
    /// Join the session, returning the id the server issued
    fn join(&self, username: &str) -> impl Future<Output = Result<SessionId, SessionError>> + Send;

    /// Tell the server we are gone (best effort)
    fn leave(&self, id: &SessionId) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Declare ourselves paused at `video_time` and ready to play
    fn ready(
        &self,
        id: &SessionId,
        video_time: f64,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Declare a user-initiated pause
    fn pause(&self, id: &SessionId) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Report the current timeline position
    fn report_time(
        &self,
        id: &SessionId,
        video_time: f64,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Fetch the roster and the authoritative playback snapshot
    fn check(&self) -> impl Future<Output = Result<CheckSnapshot, SessionError>> + Send;
}

/// Client for a session server reachable over HTTP
#[derive(Debug, Clone)]
pub struct SessionClient {
    http: Client,
    base_url: String,
}

impl SessionClient {
    /// Create a client for `base_url` with default timeouts
    pub fn new(base_url: &str) -> Result<Self, SessionError> {
        Self::from_config(&SyncConfig::new(base_url))
    }

    /// Create a client from a full config
    pub fn from_config(config: &SyncConfig) -> Result<Self, SessionError> {
        let base_url = normalize_base_url(&config.server_url)?;
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(2)
            .build()?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, path: &str) -> RequestBuilder {
        self.http.get(format!("{}{}", self.base_url, path))
    }

    /// Send a request and require HTTP 200
    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, SessionError> {
        let resp = request.send().await.map_err(|e| {
            warn!("{} request error: {:?}", operation, e);
            SessionError::Http(e)
        })?;

        debug!("{} response status: {}", operation, resp.status());

        if resp.status() != StatusCode::OK {
            return Err(SessionError::Status {
                operation,
                status: resp.status().as_u16(),
            });
        }

        Ok(resp)
    }

    async fn decode<T: DeserializeOwned>(
        operation: &'static str,
        resp: Response,
    ) -> Result<T, SessionError> {
        let body = resp.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| SessionError::Protocol {
            operation,
            reason: e.to_string(),
        })
    }
}

impl SessionApi for SessionClient {
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn join(&self, username: &str) -> Result<SessionId, SessionError> {
        let resp = self
            .send("join", self.request("/join").query(&[("username", username)]))
            .await?;
        let joined: JoinResponse = Self::decode("join", resp).await?;
        Ok(joined.id)
    }

    #[instrument(skip(self))]
    async fn leave(&self, id: &SessionId) -> Result<(), SessionError> {
        self.send("leave", self.request("/leave").query(&[("id", id.as_str())]))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn ready(&self, id: &SessionId, video_time: f64) -> Result<(), SessionError> {
        let request = self
            .request("/ready")
            .query(&[("id", id.as_str())])
            .query(&[("videoTime", video_time)]);
        self.send("ready", request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn pause(&self, id: &SessionId) -> Result<(), SessionError> {
        self.send("pause", self.request("/pause").query(&[("id", id.as_str())]))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn report_time(&self, id: &SessionId, video_time: f64) -> Result<(), SessionError> {
        let request = self
            .request("/time")
            .query(&[("id", id.as_str())])
            .query(&[("videoTime", video_time)]);
        self.send("time", request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn check(&self) -> Result<CheckSnapshot, SessionError> {
        let resp = self.send("check", self.request("/check")).await?;
        let raw: CheckResponse = Self::decode("check", resp).await?;
        CheckSnapshot::try_from(raw).map_err(|reason| SessionError::Protocol {
            operation: "check",
            reason,
        })
    }
}

/// Trim the configured URL and make sure it is an absolute http(s) URL
fn normalize_base_url(raw: &str) -> Result<String, SessionError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(SessionError::InvalidBaseUrl("URL is empty".to_string()));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| SessionError::InvalidBaseUrl(format!("{} ({})", trimmed, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(SessionError::InvalidBaseUrl(format!(
            "unsupported scheme '{}'",
            other
        ))),
    }
}
