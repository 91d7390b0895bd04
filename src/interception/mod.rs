// src/interception/mod.rs
//! Policy-driven interception of module resolution
//!
//! This module provides the rule layer that sits between test code and the
//! resolution pipeline:
//!
//! - **Matcher**: wildcard/regex name specs compiled to anchored matchers
//! - **Policy**: immutable rule set (fail, substitute, hide) plus live knobs
//! - **Session**: binds a policy to the pipeline for a reversible span
//!
//! # Architecture
//!
//! ```text
//! Code Under Test (Unmodified)
//!     │
//!     ├─ resolve(name) ────────→ Session Wrapper → Policy → Prior Hook
//!     └─ resolveMembers(names) → Session Wrapper → Policy → Prior Hook
//! ```

pub mod matcher;
pub mod policy;
pub mod session;

// Re-export commonly used types
pub use matcher::{Matcher, NameSpec};
pub use policy::{FailureSpec, InterceptPolicy, PolicyConfig, SubstituteTarget};
pub use session::{
    fail_resolution, substitute_resolution, FailOptions, InterceptContext, InterceptSession,
    SessionGuard, SubstituteOptions,
};
