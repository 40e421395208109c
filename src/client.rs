//! HTTP client for a running meterlog server.
//!
//! The CLI triggers sync through the server so that every cycle runs under the
//! server's sync lock.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::sync::{SyncReport, SyncStatus};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not reach meterlog server at {url} (is meterlog-server running?): {source}")]
    Unreachable { url: String, source: reqwest::Error },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    message: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
}

pub struct ServerClient {
    http: reqwest::Client,
    base_url: String,
}

impl ServerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Runs one manual sync cycle on the server.
    pub async fn trigger_sync(&self) -> Result<SyncReport, ClientError> {
        self.send(self.http.post(self.url("/api/sync/sheets"))).await
    }

    pub async fn sync_status(&self) -> Result<SyncStatus, ClientError> {
        self.send(self.http.get(self.url("/api/sync/status"))).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                ClientError::Unreachable {
                    url: self.base_url.clone(),
                    source: e,
                }
            } else {
                ClientError::Http(e)
            }
        })?;

        let status = response.status();
        let body = response.text().await?;
        let envelope = serde_json::from_str::<Envelope<T>>(&body).ok();

        match envelope {
            Some(Envelope {
                success: true,
                data: Some(data),
                ..
            }) if status.is_success() => Ok(data),
            Some(envelope) => {
                let mut message = envelope
                    .message
                    .unwrap_or_else(|| status.to_string());
                if !envelope.errors.is_empty() {
                    message = format!("{} ({})", message, envelope.errors.join("; "));
                }
                Err(ClientError::Server {
                    status: status.as_u16(),
                    message,
                })
            }
            None => Err(ClientError::Server {
                status: status.as_u16(),
                message: format!("unexpected response: {}", body.chars().take(200).collect::<String>()),
            }),
        }
    }
}
