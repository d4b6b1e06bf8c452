//! Handler resolution
//!
//! Every load builds a brand new engine [`Context`], reads the handler file
//! from disk and evaluates it. Nothing is cached between loads, so an edited
//! file is picked up by the very next invocation.
//!
//! Files ending in `.mjs` are evaluated as ES modules and their exports read
//! from the module namespace. Everything else is wrapped CommonJS-style and
//! exports are read from `module.exports` once the body has run.

use std::path::{Path, PathBuf};

use boa_engine::{
    builtins::promise::PromiseState, js_string, Context, JsError, JsObject, JsString, JsValue,
    Module, Source,
};
use thiserror::Error;
use tracing::debug;

use crate::console::install_console;
use crate::spec::HandlerSpec;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{0}")]
    InvalidSpec(String),

    #[error("Handler file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read handler file {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to evaluate {}: {message}", path.display())]
    Evaluation {
        path: PathBuf,
        message: String,
        stack: Option<String>,
    },

    #[error("Export \"{0}\" not found")]
    ExportNotFound(String),

    #[error("Export \"{0}\" is not a function")]
    ExportNotCallable(String),
}

/// Message and best-effort stack text of a thrown JS value
///
/// The engine does not record `stack` on Error objects, so for errors the
/// stack is normally synthesized as `Name: message` with no frames; use
/// [`ThrownValue::located`] to attach the file it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrownValue {
    pub message: String,
    pub stack: Option<String>,
}

impl ThrownValue {
    /// Describe a thrown error the way `err.message` / `err.stack` would
    pub fn from_error(err: &JsError, ctx: &mut Context) -> Self {
        let value = err.to_opaque(ctx);
        Self::from_value(&value, ctx)
    }

    /// Describe a thrown or rejected value
    pub fn from_value(value: &JsValue, ctx: &mut Context) -> Self {
        let Some(object) = value.as_object().map(|o| o.clone()) else {
            let message = value
                .to_string(ctx)
                .map_or_else(|_| value.display().to_string(), |s| s.to_std_string_escaped());
            return Self { message, stack: None };
        };

        let message = string_property(&object, js_string!("message"), ctx)
            .unwrap_or_else(|| value.display().to_string());
        let name = string_property(&object, js_string!("name"), ctx)
            .unwrap_or_else(|| "Error".to_string());
        let stack = string_property(&object, js_string!("stack"), ctx)
            .or_else(|| Some(format!("{name}: {message}")));

        Self { message, stack }
    }

    /// Append `at <path>` unless the stack already names the file
    #[must_use]
    pub fn located(mut self, path: &Path) -> Self {
        let location = path.display().to_string();
        if let Some(stack) = &mut self.stack {
            if !stack.contains(&location) {
                stack.push_str("\n    at ");
                stack.push_str(&location);
            }
        }
        self
    }
}

fn string_property(object: &JsObject, key: JsString, ctx: &mut Context) -> Option<String> {
    object
        .get(key, ctx)
        .ok()
        .and_then(|v| v.as_string().map(|s| s.to_std_string_escaped()))
}

/// A freshly evaluated handler, bound to the context it was loaded into
pub struct LoadedHandler {
    function: JsObject,
    spec: HandlerSpec,
    path: PathBuf,
    context: Context,
}

impl std::fmt::Debug for LoadedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedHandler")
            .field("spec", &self.spec)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LoadedHandler {
    pub fn spec(&self) -> &HandlerSpec {
        &self.spec
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The exported function together with the context that owns it
    pub(crate) fn parts(&mut self) -> (&JsObject, &mut Context) {
        (&self.function, &mut self.context)
    }
}

/// Resolves handler specs into callable functions
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerLoader;

impl HandlerLoader {
    pub fn new() -> Self {
        Self
    }

    /// Parse `spec`, load the file fresh and return the named export
    pub fn load(&self, spec: &str) -> Result<LoadedHandler, LoadError> {
        let spec = HandlerSpec::parse(spec)?;
        self.load_spec(spec)
    }

    pub fn load_spec(&self, spec: HandlerSpec) -> Result<LoadedHandler, LoadError> {
        let path = spec.resolve_path()?;
        if !path.exists() {
            return Err(LoadError::FileNotFound(path));
        }

        let source = std::fs::read_to_string(&path).map_err(|source| LoadError::FileRead {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), bytes = source.len(), "Evaluating handler module");

        let mut context = Context::default();
        install_console(&mut context).map_err(|e| evaluation_error(&path, &e, &mut context))?;

        let exports = if is_es_module(&path) {
            evaluate_es_module(&path, &source, &mut context)?
        } else {
            evaluate_commonjs(&path, &source, &mut context)?
        };

        let function = lookup_export(&exports, spec.export_name(), &mut context)?;

        Ok(LoadedHandler {
            function,
            spec,
            path,
            context,
        })
    }
}

fn is_es_module(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "mjs")
}

fn evaluation_error(path: &Path, err: &JsError, ctx: &mut Context) -> LoadError {
    let thrown = ThrownValue::from_error(err, ctx).located(path);
    LoadError::Evaluation {
        path: path.to_path_buf(),
        message: thrown.message,
        stack: thrown.stack,
    }
}

/// Wrapper header kept on the first source line so reported line numbers
/// match the file on disk.
const COMMONJS_HEADER: &str = "(function (exports, require, module, __filename, __dirname) {";
const COMMONJS_FOOTER: &str = "\n})";

const REQUIRE_STUB: &str = r"(function (name) {
    throw new TypeError('require(' + JSON.stringify(name) + ') is not supported; handlers must be self-contained');
})";

fn evaluate_commonjs(path: &Path, source: &str, ctx: &mut Context) -> Result<JsValue, LoadError> {
    let wrapped = format!("{COMMONJS_HEADER}{source}{COMMONJS_FOOTER}");

    let wrapper = ctx
        .eval(Source::from_bytes(&wrapped).with_path(path))
        .map_err(|e| evaluation_error(path, &e, ctx))?;
    let wrapper = wrapper
        .as_callable()
        .map(|f| f.clone())
        .ok_or_else(|| LoadError::Evaluation {
            path: path.to_path_buf(),
            message: "module wrapper did not evaluate to a function".to_string(),
            stack: None,
        })?;

    let require = ctx
        .eval(Source::from_bytes(REQUIRE_STUB))
        .map_err(|e| evaluation_error(path, &e, ctx))?;

    let exports = JsObject::default(ctx.intrinsics());
    let module = JsObject::default(ctx.intrinsics());
    module
        .set(js_string!("exports"), exports.clone(), false, ctx)
        .map_err(|e| evaluation_error(path, &e, ctx))?;

    let filename = path.to_string_lossy();
    let dirname = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    let args = [
        JsValue::from(exports),
        require,
        JsValue::from(module.clone()),
        JsValue::from(JsString::from(filename.as_ref())),
        JsValue::from(JsString::from(dirname.as_str())),
    ];
    wrapper
        .call(&JsValue::undefined(), &args, ctx)
        .map_err(|e| evaluation_error(path, &e, ctx))?;

    // `module.exports` may have been reassigned by the body
    module
        .get(js_string!("exports"), ctx)
        .map_err(|e| evaluation_error(path, &e, ctx))
}

fn evaluate_es_module(path: &Path, source: &str, ctx: &mut Context) -> Result<JsValue, LoadError> {
    let module = Module::parse(Source::from_bytes(source).with_path(path), None, ctx)
        .map_err(|e| evaluation_error(path, &e, ctx))?;

    let promise = module.load_link_evaluate(ctx);
    ctx.run_jobs().map_err(|e| evaluation_error(path, &e, ctx))?;

    match promise.state() {
        PromiseState::Fulfilled(_) => Ok(module.namespace(ctx).into()),
        PromiseState::Rejected(reason) => {
            let thrown = ThrownValue::from_value(&reason, ctx).located(path);
            Err(LoadError::Evaluation {
                path: path.to_path_buf(),
                message: thrown.message,
                stack: thrown.stack,
            })
        }
        PromiseState::Pending => Err(LoadError::Evaluation {
            path: path.to_path_buf(),
            message: "module evaluation did not complete (top-level await never settled)".to_string(),
            stack: None,
        }),
    }
}

fn lookup_export(exports: &JsValue, name: &str, ctx: &mut Context) -> Result<JsObject, LoadError> {
    let Some(exports) = exports.as_object().map(|o| o.clone()) else {
        return Err(LoadError::ExportNotFound(name.to_string()));
    };

    let export = exports
        .get(JsString::from(name), ctx)
        .map_err(|_| LoadError::ExportNotFound(name.to_string()))?;

    if export.is_undefined() || export.is_null() {
        return Err(LoadError::ExportNotFound(name.to_string()));
    }

    export
        .as_callable()
        .map(|f| f.clone())
        .ok_or_else(|| LoadError::ExportNotCallable(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn handler_file(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn spec_for(file: &NamedTempFile, export: &str) -> String {
        format!("{}:{}", file.path().display(), export)
    }

    #[test]
    fn test_load_commonjs_export() {
        let file = handler_file(".js", "exports.main = function (event) { return event; };");
        let handler = HandlerLoader::new().load(&spec_for(&file, "main")).unwrap();

        assert_eq!(handler.spec().export_name(), "main");
        assert_eq!(handler.path(), file.path());
    }

    #[test]
    fn test_load_reassigned_module_exports() {
        let file = handler_file(".js", "module.exports = { handler: async () => 1 };");
        assert!(HandlerLoader::new().load(&spec_for(&file, "handler")).is_ok());
    }

    #[test]
    fn test_load_es_module_export() {
        let file = handler_file(".mjs", "export const handler = async (event) => event;");
        assert!(HandlerLoader::new().load(&spec_for(&file, "handler")).is_ok());
    }

    #[test]
    fn test_invalid_spec() {
        let err = HandlerLoader::new().load("bad-spec").unwrap_err();
        assert!(matches!(err, LoadError::InvalidSpec(_)));
    }

    #[test]
    fn test_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.js");
        let err = HandlerLoader::new()
            .load(&format!("{}:main", missing.display()))
            .unwrap_err();

        match err {
            LoadError::FileNotFound(path) => assert_eq!(path, missing),
            other => panic!("expected FileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_export_not_found() {
        let file = handler_file(".js", "exports.other = () => 1;");
        let err = HandlerLoader::new().load(&spec_for(&file, "main")).unwrap_err();
        assert!(matches!(err, LoadError::ExportNotFound(name) if name == "main"));
    }

    #[test]
    fn test_export_not_callable() {
        let file = handler_file(".js", "exports.main = 42;");
        let err = HandlerLoader::new().load(&spec_for(&file, "main")).unwrap_err();
        assert!(matches!(err, LoadError::ExportNotCallable(name) if name == "main"));
    }

    #[test]
    fn test_es_module_export_not_found() {
        let file = handler_file(".mjs", "export const other = () => 1;");
        let err = HandlerLoader::new().load(&spec_for(&file, "handler")).unwrap_err();
        assert!(matches!(err, LoadError::ExportNotFound(_)));
    }

    #[test]
    fn test_syntax_error_is_evaluation_error() {
        let file = handler_file(".js", "this is not valid javascript ))");
        let err = HandlerLoader::new().load(&spec_for(&file, "main")).unwrap_err();
        assert!(matches!(err, LoadError::Evaluation { .. }));
    }

    #[test]
    fn test_top_level_throw_is_evaluation_error() {
        let file = handler_file(".js", "throw new Error('init failed');");
        let err = HandlerLoader::new().load(&spec_for(&file, "main")).unwrap_err();

        match err {
            LoadError::Evaluation { message, .. } => assert_eq!(message, "init failed"),
            other => panic!("expected Evaluation, got {other:?}"),
        }
    }

    #[test]
    fn test_require_is_rejected() {
        let file = handler_file(".js", "const fs = require('fs'); exports.main = () => 1;");
        let err = HandlerLoader::new().load(&spec_for(&file, "main")).unwrap_err();

        match err {
            LoadError::Evaluation { message, .. } => assert!(message.contains("require(\"fs\")")),
            other => panic!("expected Evaluation, got {other:?}"),
        }
    }

    #[test]
    fn test_module_globals_are_available() {
        let file = handler_file(
            ".js",
            "if (typeof __filename !== 'string' || typeof __dirname !== 'string') { throw new Error('missing'); }\n\
             exports.main = () => __filename;",
        );
        assert!(HandlerLoader::new().load(&spec_for(&file, "main")).is_ok());
    }

    #[test]
    fn test_thrown_primitive_description() {
        let mut ctx = Context::default();
        let thrown = ThrownValue::from_value(&JsValue::from(js_string!("plain failure")), &mut ctx);
        assert_eq!(thrown.message, "plain failure");
        assert!(thrown.stack.is_none());
    }

    #[test]
    fn test_located_stack_names_file() {
        let mut ctx = Context::default();
        let error = ctx.eval(Source::from_bytes("new RangeError('out')")).unwrap();
        let path = Path::new("/srv/handlers/app.js");

        let thrown = ThrownValue::from_value(&error, &mut ctx).located(path);
        let stack = thrown.stack.unwrap();
        assert!(stack.starts_with("RangeError: out"));
        assert!(stack.ends_with("\n    at /srv/handlers/app.js"));

        // Already located stacks are left alone
        let again = ThrownValue {
            message: "out".into(),
            stack: Some(stack.clone()),
        }
        .located(path);
        assert_eq!(again.stack.unwrap(), stack);
    }
}
