// src/utils/mod.rs
//! Common utilities and error types

pub mod errors;

pub use errors::{InterceptError, ResolveError, Result};
