//! Client for talking to a running daemon

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Lambda Debugger daemon is not running. Start it with: lambda-debugger start")]
    DaemonNotRunning,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },
}

/// Body returned by `POST /invoke`, on success or failure
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub stack: Option<String>,
}

/// Client for the invocation endpoint
pub struct DaemonClient {
    base_url: String,
    client: Client,
}

impl DaemonClient {
    pub fn new(base_url: String) -> Result<Self, ClientError> {
        let client = Client::builder().build()?;
        Ok(Self { base_url, client })
    }

    /// Client for a daemon on localhost
    pub fn local(port: u16) -> Result<Self, ClientError> {
        Self::new(format!("http://localhost:{port}"))
    }

    /// POST /invoke
    ///
    /// Failed invocations still return `Ok`; check `success`.
    pub async fn invoke(
        &self,
        handler_path: &str,
        event: &Value,
    ) -> Result<InvokeResponse, ClientError> {
        let url = format!("{}/invoke", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "handlerPath": handler_path, "event": event }))
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|_| ClientError::UnexpectedResponse { status, body })
    }

    /// GET /health, true when the daemon answers 200
    pub async fn health(&self, timeout: Duration) -> Result<bool, ClientError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_send_error)?;
        Ok(response.status().is_success())
    }
}

fn map_send_error(err: reqwest::Error) -> ClientError {
    if err.is_connect() {
        ClientError::DaemonNotRunning
    } else {
        ClientError::Http(err)
    }
}
