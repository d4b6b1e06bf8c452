//! Synthetic invocation context passed to handlers

use boa_engine::{Context, JsValue, Source};
use lambda_debugger_core::RequestId;
use serde::{Deserialize, Serialize};

use crate::conversions::{json_to_js_value, ConversionError};

/// Placeholder ARN reported to every handler
pub const LOCAL_FUNCTION_ARN: &str = "arn:aws:lambda:local:0:function:debug";

/// Remaining time reported by `getRemainingTimeInMillis()` unless configured
pub const DEFAULT_REMAINING_TIME_MS: u64 = 30_000;

/// Tunables for the context builder
#[derive(Debug, Clone, Deserialize)]
pub struct ContextOptions {
    #[serde(default = "default_remaining_time_ms")]
    pub remaining_time_ms: u64,

    #[serde(default = "default_function_arn")]
    pub function_arn: String,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            remaining_time_ms: default_remaining_time_ms(),
            function_arn: default_function_arn(),
        }
    }
}

fn default_remaining_time_ms() -> u64 {
    DEFAULT_REMAINING_TIME_MS
}

fn default_function_arn() -> String {
    LOCAL_FUNCTION_ARN.to_string()
}

/// Context record handed to a handler as its second argument
///
/// Serialized fields become plain properties on the JS object. The
/// remaining-time accessor and the `done`/`succeed`/`fail` callbacks are
/// attached by [`InvocationContext::to_js_value`]; the callbacks are inert and
/// completion is signalled only by the handler's return value.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationContext {
    pub function_name: String,
    pub function_version: String,
    pub aws_request_id: String,
    pub invoked_function_arn: String,
    #[serde(rename = "memoryLimitInMB")]
    pub memory_limit_in_mb: String,
    pub log_group_name: String,
    pub log_stream_name: String,
    pub callback_waits_for_empty_event_loop: bool,
    #[serde(skip)]
    pub remaining_time_ms: u64,
}

const ATTACH_METHODS: &str = r"(function (context, remaining) {
    context.getRemainingTimeInMillis = function () { return remaining; };
    context.done = function () {};
    context.succeed = function () {};
    context.fail = function () {};
    return context;
})";

impl InvocationContext {
    /// Build a fresh context for one invocation of `spec`
    pub fn build(spec: &str, options: &ContextOptions) -> Self {
        let request_id = RequestId::new();
        let date = chrono::Utc::now().format("%Y/%m/%d");
        Self {
            function_name: spec.to_string(),
            function_version: "$LATEST".to_string(),
            log_stream_name: format!("{}/[$LATEST]{}", date, request_id),
            aws_request_id: request_id.into(),
            invoked_function_arn: options.function_arn.clone(),
            memory_limit_in_mb: "128".to_string(),
            log_group_name: "/aws/lambda/local-debug".to_string(),
            callback_waits_for_empty_event_loop: true,
            remaining_time_ms: options.remaining_time_ms,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.aws_request_id
    }

    /// Remaining execution time; a fixed value, the clock is never consulted
    pub fn get_remaining_time_in_millis(&self) -> u64 {
        self.remaining_time_ms
    }

    /// Materialize the context as a JS object inside `ctx`
    pub fn to_js_value(&self, ctx: &mut Context) -> Result<JsValue, ConversionError> {
        let fields = serde_json::to_value(self)?;
        let object = json_to_js_value(&fields, ctx)?;

        let attach = ctx
            .eval(Source::from_bytes(ATTACH_METHODS))
            .map_err(ConversionError::Thrown)?;
        let attach = attach.as_callable().map(|f| f.clone()).ok_or_else(|| {
            ConversionError::Thrown(
                boa_engine::JsNativeError::typ()
                    .with_message("context initializer is not callable")
                    .into(),
            )
        })?;

        #[allow(clippy::cast_precision_loss)]
        let remaining = JsValue::new(self.remaining_time_ms as f64);
        attach
            .call(&JsValue::undefined(), &[object, remaining], ctx)
            .map_err(ConversionError::Thrown)
    }
}
