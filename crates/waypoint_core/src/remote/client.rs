//! Backend REST client contract and HTTP implementation.
//!
//! # Responsibility
//! - Define the async backend seam consumed by the poller and dispatcher.
//! - Implement the seam over HTTP/JSON with `reqwest`.
//!
//! # Invariants
//! - Non-2xx responses are errors; callers decide how to degrade.
//! - Every request is bounded by the client timeout.

use crate::remote::wire::{
    AnalyzeResponse, DispatchRequest, HeatmapResponse, JourneysResponse, StartJourneyRequest,
};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub type BackendResult<T> = Result<T, BackendError>;

/// Failure of one backend request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Connection, timeout or other transport failure.
    Transport(String),
    /// Backend answered with a non-success status.
    Status { status: u16, path: String },
    /// Response body did not match the expected shape.
    Decode(String),
    /// Client could not be constructed.
    InvalidConfig(String),
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "backend transport failed: {message}"),
            Self::Status { status, path } => {
                write!(f, "backend returned status {status} for `{path}`")
            }
            Self::Decode(message) => write!(f, "backend response malformed: {message}"),
            Self::InvalidConfig(message) => write!(f, "backend client misconfigured: {message}"),
        }
    }
}

impl Error for BackendError {}

impl BackendError {
    /// Stable short code for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::Decode(_) => "decode",
            Self::InvalidConfig(_) => "config",
        }
    }
}

/// Backend operations used by the tracking core.
#[async_trait]
pub trait TrackingBackend: Send + Sync {
    /// `GET /`; any JSON body means the backend is reachable.
    async fn health(&self) -> BackendResult<Value>;
    async fn heatmap(&self) -> BackendResult<HeatmapResponse>;
    async fn list_journeys(&self) -> BackendResult<JourneysResponse>;
    async fn start_journey(
        &self,
        journey_id: &str,
        request: &StartJourneyRequest,
    ) -> BackendResult<()>;
    async fn dispatch_panic(&self, request: &DispatchRequest) -> BackendResult<Value>;
    async fn cancel_alert(&self, journey_id: &str) -> BackendResult<()>;
    async fn end_journey(&self, journey_id: &str) -> BackendResult<()>;
    async fn analyze_journey(&self, journey_id: &str) -> BackendResult<AnalyzeResponse>;
}

/// `reqwest`-backed implementation of `TrackingBackend`.
#[derive(Debug, Clone)]
pub struct HttpTrackingBackend {
    base_url: String,
    http: Client,
}

impl HttpTrackingBackend {
    /// Builds a client rooted at `base_url` (trailing `/` ignored).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> BackendResult<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(BackendError::InvalidConfig(
                "base url cannot be empty".to_string(),
            ));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| BackendError::InvalidConfig(err.to_string()))?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Absolute URL for an API path starting with `/`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> BackendResult<T> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;
        decode(ensure_success(response, path)?).await
    }

    async fn post_empty(&self, path: &str) -> BackendResult<Response> {
        let response = self
            .http
            .post(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response, path)
    }
}

#[async_trait]
impl TrackingBackend for HttpTrackingBackend {
    async fn health(&self) -> BackendResult<Value> {
        self.get_json("/").await
    }

    async fn heatmap(&self) -> BackendResult<HeatmapResponse> {
        self.get_json("/intelligence/heatmap").await
    }

    async fn list_journeys(&self) -> BackendResult<JourneysResponse> {
        self.get_json("/journeys").await
    }

    async fn start_journey(
        &self,
        journey_id: &str,
        request: &StartJourneyRequest,
    ) -> BackendResult<()> {
        let path = format!("/journey/{journey_id}/start");
        let response = self
            .http
            .post(self.url(&path))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response, &path).map(|_| ())
    }

    async fn dispatch_panic(&self, request: &DispatchRequest) -> BackendResult<Value> {
        let path = "/alert/dispatch";
        let response = self
            .http
            .post(self.url(path))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        decode(ensure_success(response, path)?).await
    }

    async fn cancel_alert(&self, journey_id: &str) -> BackendResult<()> {
        self.post_empty(&format!("/alert/{journey_id}/cancel"))
            .await
            .map(|_| ())
    }

    async fn end_journey(&self, journey_id: &str) -> BackendResult<()> {
        self.post_empty(&format!("/journey/{journey_id}/end"))
            .await
            .map(|_| ())
    }

    async fn analyze_journey(&self, journey_id: &str) -> BackendResult<AnalyzeResponse> {
        let response = self
            .post_empty(&format!("/journey/{journey_id}/analyze"))
            .await?;
        decode(response).await
    }
}

fn transport_error(err: reqwest::Error) -> BackendError {
    BackendError::Transport(err.to_string())
}

fn ensure_success(response: Response, path: &str) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(BackendError::Status {
            status: status.as_u16(),
            path: path.to_string(),
        })
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> BackendResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|err| BackendError::Decode(err.to_string()))
}
