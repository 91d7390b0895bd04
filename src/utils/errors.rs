// src/utils/errors.rs
//! Error types for the interception engine
//!
//! Two layers of errors exist on purpose:
//!
//! - [`InterceptError`]: misuse of the engine itself (bad configuration,
//!   activating twice, reverting a dead state). Never produced by the
//!   resolution hooks.
//! - [`ResolveError`]: the resolution pipeline's own error type. Both real
//!   load failures and injected failures are `ResolveError`s, so from the
//!   caller's perspective an injected failure is indistinguishable from a
//!   genuine one.

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, InterceptError>;

/// Errors raised by the engine's own API surface
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InterceptError {
    /// Session construction rejected (e.g. no fail/substitute rules supplied)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A name or failure specification could not be normalized
    #[error("invalid specification: {0}")]
    InvalidSpec(String),

    /// `activate` called on a session that is already bound to a live state
    #[error("session already active")]
    AlreadyActive,

    /// `deactivate` called on a session with no live state
    #[error("session not active")]
    NotActive,

    /// `revert` called on an intercept state that was already reverted
    #[error("intercept state already reverted: {0}")]
    Revert(String),
}

/// Errors surfaced by the resolution pipeline's hooks
///
/// Injected failures default to [`ResolveError::NotFound`] carrying the
/// requested name, matching what a real missing module produces.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// No module under the requested qualified name
    #[error("module '{0}' not found")]
    NotFound(String),

    /// Any other resolution failure, including custom injected ones
    #[error("{0}")]
    Failed(String),
}
