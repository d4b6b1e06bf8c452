//! Invocation service

use lambda_debugger_core::InvocationFailure;
use serde_json::Value;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::context::{ContextOptions, InvocationContext};
use crate::invocation::{InvocationError, InvocationOutput};
use crate::loader::HandlerLoader;

/// Loads and runs handlers on the blocking thread pool
///
/// Holds no per-handler state: each call resolves the handler from scratch, so
/// concurrent calls never share a module or an engine context.
#[derive(Debug, Clone, Default)]
pub struct InvokerService {
    loader: HandlerLoader,
    options: ContextOptions,
}

impl InvokerService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ContextOptions) -> Self {
        Self {
            loader: HandlerLoader::new(),
            options,
        }
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// Resolve `handler_path` fresh and invoke it with `event`
    pub async fn invoke(&self, handler_path: &str, event: Value) -> InvocationOutput {
        let context = InvocationContext::build(handler_path, &self.options);
        let request_id = context.request_id().to_string();
        let loader = self.loader;
        let spec = handler_path.to_string();

        info!(request_id = %request_id, handler = %handler_path, "Invoke");
        let started = Instant::now();

        let joined = tokio::task::spawn_blocking(move || {
            loader.load(&spec)?.invoke(&event, &context)
        })
        .await;

        let result = match joined {
            Ok(result) => result,
            Err(e) => {
                error!(request_id = %request_id, error = %e, "Handler task aborted");
                Err(InvocationError::Internal(e.to_string()))
            }
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &result {
            Ok(_) => info!(request_id = %request_id, duration_ms, "Invocation succeeded"),
            Err(e) => warn!(
                request_id = %request_id,
                duration_ms,
                error_type = %e.code(),
                error = %e,
                "Invocation failed"
            ),
        }

        InvocationOutput { request_id, result }
    }

    /// Same as [`InvokerService::invoke`], with the error already in wire form
    pub async fn invoke_to_failure(
        &self,
        handler_path: &str,
        event: Value,
    ) -> Result<Value, InvocationFailure> {
        self.invoke(handler_path, event)
            .await
            .result
            .map_err(InvocationFailure::from)
    }
}
