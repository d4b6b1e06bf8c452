//! Handler invocation

use boa_engine::{builtins::promise::PromiseState, object::builtins::JsPromise, JsValue};
use lambda_debugger_core::{ErrorCode, InvocationFailure};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

use crate::context::InvocationContext;
use crate::conversions::{js_value_to_json, json_to_js_value, ConversionError};
use crate::loader::{LoadError, LoadedHandler, ThrownValue};

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("{message}")]
    Handler {
        message: String,
        stack: Option<String>,
    },

    #[error("Handler returned a promise that never settled")]
    NeverSettled,

    #[error("Invalid event payload: {0}")]
    InvalidEvent(String),

    #[error("Handler result is not JSON-serializable: {0}")]
    ResultSerialization(String),

    #[error("Invocation aborted: {0}")]
    Internal(String),
}

impl InvocationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Load(LoadError::InvalidSpec(_)) => ErrorCode::InvalidSpec,
            Self::Load(LoadError::FileNotFound(_)) => ErrorCode::FileNotFound,
            Self::Load(LoadError::FileRead { .. }) => ErrorCode::FileRead,
            Self::Load(LoadError::Evaluation { .. }) => ErrorCode::ModuleEvaluation,
            Self::Load(LoadError::ExportNotFound(_)) => ErrorCode::ExportNotFound,
            Self::Load(LoadError::ExportNotCallable(_)) => ErrorCode::ExportNotCallable,
            Self::Handler { .. } => ErrorCode::HandlerRuntimeError,
            Self::NeverSettled => ErrorCode::HandlerNeverSettled,
            // The event came in as valid JSON, so a failure here is ours
            Self::InvalidEvent(_) | Self::Internal(_) => ErrorCode::InternalError,
            Self::ResultSerialization(_) => ErrorCode::ResultSerialization,
        }
    }

    fn stack(&self) -> Option<&str> {
        match self {
            Self::Handler { stack, .. } | Self::Load(LoadError::Evaluation { stack, .. }) => {
                stack.as_deref()
            }
            _ => None,
        }
    }
}

impl From<InvocationError> for InvocationFailure {
    fn from(err: InvocationError) -> Self {
        let failure = InvocationFailure::new(err.code(), err.to_string());
        match err.stack() {
            Some(stack) => failure.with_stack(stack),
            None => failure,
        }
    }
}

fn handler_error(thrown: ThrownValue, path: &Path) -> InvocationError {
    let thrown = thrown.located(path);
    InvocationError::Handler {
        message: thrown.message,
        stack: thrown.stack,
    }
}

/// Outcome of a completed invocation
#[derive(Debug)]
pub struct InvocationOutput {
    pub request_id: String,
    pub result: Result<Value, InvocationError>,
}

impl LoadedHandler {
    /// Call the handler with `(event, context)` and wait for its result
    ///
    /// A returned promise is driven by running the context's job queue until
    /// it settles. The context's `done`/`succeed`/`fail` callbacks are inert,
    /// so a handler that only reports through them ends up `NeverSettled`.
    pub fn invoke(
        mut self,
        event: &Value,
        context: &InvocationContext,
    ) -> Result<Value, InvocationError> {
        let path = self.path().to_path_buf();
        let (function, ctx) = self.parts();

        let event = json_to_js_value(event, ctx)
            .map_err(|e| InvocationError::InvalidEvent(e.to_string()))?;
        let context = context
            .to_js_value(ctx)
            .map_err(|e| InvocationError::Internal(format!("failed to build context: {e}")))?;

        let returned = function
            .call(&JsValue::undefined(), &[event, context], ctx)
            .map_err(|e| handler_error(ThrownValue::from_error(&e, ctx), &path))?;

        let promise = returned
            .as_object()
            .and_then(|o| JsPromise::from_object(o.clone()).ok());
        let settled = match promise {
            Some(promise) => {
                if let Err(e) = ctx.run_jobs() {
                    return Err(handler_error(ThrownValue::from_error(&e, ctx), &path));
                }
                match promise.state() {
                    PromiseState::Fulfilled(value) => value,
                    PromiseState::Rejected(reason) => {
                        return Err(handler_error(ThrownValue::from_value(&reason, ctx), &path));
                    }
                    PromiseState::Pending => return Err(InvocationError::NeverSettled),
                }
            }
            None => returned,
        };

        js_value_to_json(&settled, ctx).map_err(|e| match e {
            ConversionError::Thrown(err) => {
                InvocationError::ResultSerialization(ThrownValue::from_error(&err, ctx).message)
            }
            other => InvocationError::ResultSerialization(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextOptions;
    use crate::loader::HandlerLoader;
    use serde_json::json;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn handler_file(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn run(file: &NamedTempFile, export: &str, event: Value) -> Result<Value, InvocationError> {
        let spec = format!("{}:{}", file.path().display(), export);
        let context = InvocationContext::build(&spec, &ContextOptions::default());
        HandlerLoader::new().load(&spec)?.invoke(&event, &context)
    }

    #[test]
    fn test_sync_handler_echo() {
        let file = handler_file(".js", "exports.main = (event, ctx) => ({ echo: event.key });");
        let result = run(&file, "main", json!({"key": "value"})).unwrap();
        assert_eq!(result, json!({"echo": "value"}));
    }

    #[test]
    fn test_async_handler() {
        let file = handler_file(
            ".js",
            "exports.main = async (event) => { const n = await Promise.resolve(event.n); return n * 2; };",
        );
        let result = run(&file, "main", json!({"n": 21})).unwrap();
        assert_eq!(result, json!(42));
    }

    #[test]
    fn test_es_module_async_handler() {
        let file = handler_file(
            ".mjs",
            "export async function handler(event) { return { ok: event.ok }; }",
        );
        let result = run(&file, "handler", json!({"ok": true})).unwrap();
        assert_eq!(result, json!({"ok": true}));
    }

    #[test]
    fn test_handler_receives_context() {
        let file = handler_file(
            ".js",
            "exports.main = (event, context) => ({\n\
               name: context.functionName,\n\
               remaining: context.getRemainingTimeInMillis(),\n\
               id: context.awsRequestId,\n\
               arn: context.invokedFunctionArn,\n\
               callbacks: [context.done(), context.succeed(1), context.fail(new Error('x'))].length,\n\
             });",
        );
        let spec = format!("{}:main", file.path().display());

        let result = run(&file, "main", Value::Null).unwrap();
        assert_eq!(result["name"], json!(spec));
        assert_eq!(result["remaining"], json!(30000));
        assert!(result["id"].as_str().unwrap().starts_with("local-"));
        assert_eq!(result["arn"], json!(crate::context::LOCAL_FUNCTION_ARN));
        assert_eq!(result["callbacks"], json!(3));
    }

    #[test]
    fn test_sync_throw() {
        let file = handler_file(".js", "exports.main = () => { throw new Error('boom'); };");
        let err = run(&file, "main", json!({})).unwrap_err();

        assert_eq!(err.code(), ErrorCode::HandlerRuntimeError);
        let failure = InvocationFailure::from(err);
        assert_eq!(failure.message, "boom");
        let stack = failure.stack.unwrap();
        assert!(stack.starts_with("Error: boom"));
        assert!(stack.contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_rejected_promise() {
        let file = handler_file(
            ".js",
            "exports.main = async () => { throw new TypeError('nope'); };",
        );
        let err = run(&file, "main", json!({})).unwrap_err();

        match err {
            InvocationError::Handler { message, .. } => assert_eq!(message, "nope"),
            other => panic!("expected Handler error, got {other:?}"),
        }
    }

    #[test]
    fn test_callback_only_handler_never_settles() {
        let file = handler_file(
            ".js",
            "exports.main = (event, context) => new Promise(() => { context.succeed('ignored'); });",
        );
        let err = run(&file, "main", json!({})).unwrap_err();
        assert!(matches!(err, InvocationError::NeverSettled));
        assert_eq!(err.code(), ErrorCode::HandlerNeverSettled);
    }

    #[test]
    fn test_undefined_result_is_null() {
        let file = handler_file(".js", "exports.main = () => {};");
        assert_eq!(run(&file, "main", json!({})).unwrap(), Value::Null);
    }

    #[test]
    fn test_deeply_nested_result_is_serialization_error() {
        let file = handler_file(
            ".js",
            "exports.main = () => { let a = []; for (let i = 0; i < 10000; i++) a = [a]; return a; };",
        );
        let err = run(&file, "main", json!({})).unwrap_err();

        assert_eq!(err.code(), ErrorCode::ResultSerialization);
        assert!(err.to_string().contains("nested more than 128 levels"));
    }

    #[test]
    fn test_logging_deeply_nested_value() {
        let file = handler_file(
            ".js",
            "exports.main = () => { let a = []; for (let i = 0; i < 10000; i++) a = [a]; console.log(a); return 'logged'; };",
        );
        assert_eq!(run(&file, "main", json!({})).unwrap(), json!("logged"));
    }

    #[test]
    fn test_cyclic_result_is_serialization_error() {
        let file = handler_file(
            ".js",
            "exports.main = () => { const o = {}; o.o = o; return o; };",
        );
        let err = run(&file, "main", json!({})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ResultSerialization);
    }

    #[test]
    fn test_console_output_does_not_fail() {
        let file = handler_file(
            ".js",
            "exports.main = (event) => { console.log('received', event); console.warn('careful'); return 'ok'; };",
        );
        assert_eq!(run(&file, "main", json!({"a": 1})).unwrap(), json!("ok"));
    }

    #[test]
    fn test_load_errors_map_to_codes() {
        let err = InvocationError::from(LoadError::ExportNotFound("main".into()));
        assert_eq!(err.code(), ErrorCode::ExportNotFound);
        assert_eq!(err.to_string(), "Export \"main\" not found");

        let err = InvocationError::from(LoadError::InvalidSpec("bad".into()));
        assert_eq!(InvocationFailure::from(err).code, ErrorCode::InvalidSpec);
    }
}
