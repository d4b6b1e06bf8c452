//! HTTP handlers for the invocation endpoint
//!
//! - `POST /invoke` with `{handlerPath, event}`
//! - `GET /health`

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;
use lambda_debugger_core::{ErrorCode, InvocationFailure};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::context::ContextOptions;
use crate::service::InvokerService;

/// Shared state for the invocation handlers
pub struct InvokerState {
    pub service: InvokerService,
}

impl InvokerState {
    pub fn new() -> Self {
        Self {
            service: InvokerService::new(),
        }
    }

    pub fn with_options(options: ContextOptions) -> Self {
        Self {
            service: InvokerService::with_options(options),
        }
    }
}

impl Default for InvokerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Invoke request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    /// Any JSON value; only a non-empty string names a handler
    #[serde(default)]
    pub handler_path: Value,
    #[serde(default)]
    pub event: Value,
}

fn json_response(status: StatusCode, body: &Value) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

fn failure_response(failure: &InvocationFailure) -> Response {
    let status =
        StatusCode::from_u16(failure.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(status, &failure.to_json())
}

fn invalid_request(message: impl Into<String>) -> Response {
    failure_response(&InvocationFailure::new(ErrorCode::InvalidRequest, message))
}

/// POST /invoke
/// Load the handler named by `handlerPath` and call it with `event`
pub async fn invoke(State(state): State<Arc<InvokerState>>, body: Bytes) -> Response {
    // An empty body is treated like `{}`
    let request: InvokeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        InvokeRequest {
            handler_path: Value::Null,
            event: Value::Null,
        }
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => return invalid_request(format!("Invalid request body: {e}")),
        }
    };

    let handler_path = match request.handler_path {
        Value::String(path) if !path.is_empty() => path,
        // Falsy values count as missing
        Value::Null | Value::Bool(false) | Value::String(_) => {
            return invalid_request("handlerPath is required");
        }
        Value::Number(n) if n.as_f64() == Some(0.0) => {
            return invalid_request("handlerPath is required");
        }
        _ => {
            return failure_response(&InvocationFailure::new(
                ErrorCode::InvalidSpec,
                "handlerPath must be a string",
            ));
        }
    };

    debug!(handler = %handler_path, payload_size = body.len(), "Invoke request");

    match state.service.invoke_to_failure(&handler_path, request.event).await {
        Ok(result) => json_response(
            StatusCode::OK,
            &serde_json::json!({ "success": true, "result": result }),
        ),
        Err(failure) => failure_response(&failure),
    }
}

/// GET /health
pub async fn health_check() -> Response {
    json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::json;

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn state() -> State<Arc<InvokerState>> {
        State(Arc::new(InvokerState::new()))
    }

    #[tokio::test]
    async fn test_missing_handler_path() {
        let response = invoke(state(), Bytes::from_static(b"{}")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({"error": "handlerPath is required"}));
    }

    #[tokio::test]
    async fn test_empty_body_is_missing_handler_path() {
        let response = invoke(state(), Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let response = invoke(state(), Bytes::from_static(b"{not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
    }

    #[tokio::test]
    async fn test_invalid_spec_is_server_error() {
        let response = invoke(state(), Bytes::from_static(br#"{"handlerPath":"bad-spec"}"#)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["errorType"], json!("InvalidSpec"));
        assert!(body["error"].as_str().unwrap().contains("no ':' delimiter found"));
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_falsy_handler_path_is_missing() {
        let bodies = [
            r#"{"handlerPath":""}"#,
            r#"{"handlerPath":null}"#,
            r#"{"handlerPath":0}"#,
        ];
        for body in bodies {
            let response = invoke(state(), Bytes::from_static(body.as_bytes())).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_non_string_handler_path() {
        let response = invoke(state(), Bytes::from_static(br#"{"handlerPath":5}"#)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["errorType"], json!("InvalidSpec"));
        assert_eq!(body["error"], json!("handlerPath must be a string"));
    }
}
