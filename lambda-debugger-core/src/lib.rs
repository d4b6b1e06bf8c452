//! Core types for lambda-debugger
//!
//! This crate provides the error kinds and request ids shared by the
//! invocation runtime and the CLI.

pub mod error;
pub mod request_id;

pub use error::{ErrorCode, InvocationFailure};
pub use request_id::RequestId;
