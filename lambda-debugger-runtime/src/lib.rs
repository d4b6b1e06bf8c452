//! Handler loading and invocation for lambda-debugger
//!
//! Resolves `path:exportName` handler specs to JavaScript functions, builds a
//! synthetic invocation context and runs the handler with `(event, context)`.

pub mod context;
pub mod conversions;
pub mod handlers;
pub mod invocation;
pub mod loader;
pub mod service;
pub mod spec;

mod console;

pub use context::{ContextOptions, InvocationContext};
pub use handlers::InvokerState;
pub use invocation::{InvocationError, InvocationOutput};
pub use loader::{HandlerLoader, LoadError, LoadedHandler};
pub use service::InvokerService;
pub use spec::HandlerSpec;
