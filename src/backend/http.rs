use crate::session::TurnRequest;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend answered {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TurnResponse {
    pub thread_id: String,
}

/// POSTs user turns to the chat backend. The reply only carries the thread
/// id; the assistant's answer arrives on the push channel.
#[derive(Debug, Clone)]
pub struct TurnClient {
    http: reqwest::Client,
    endpoint: String,
}

impl TurnClient {
    /// `request_timeout` bounds the whole exchange and is usually `None`: the
    /// backend only answers once the turn's generation run has finished.
    pub fn new(
        endpoint: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Option<Duration>,
    ) -> Result<Self, BackendError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("codeloom/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn start_turn(&self, request: &TurnRequest) -> Result<TurnResponse, BackendError> {
        let response = self.http.post(&self.endpoint).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }
        Ok(response.json().await?)
    }
}
