// src/lib.rs
//! Mock Resolve Library
//!
//! This library intercepts a module-resolution pipeline so tests can force
//! resolution failures and module substitutions without touching the code
//! under test, and then undo everything.
//!
//! # Architecture
//!
//! The crate is structured into several key modules:
//!
//! - **pipeline**: Module handles, the registry, hook points, stock loader
//! - **interception**: Name matching, policies, and interception sessions
//! - **state**: Reversible snapshots and the LIFO stack tracking them
//! - **utils**: Error types and common helpers

// Public module exports
pub mod interception;
pub mod pipeline;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use interception::matcher::{Matcher, NameSpec};
pub use interception::policy::{FailureSpec, InterceptPolicy, PolicyConfig, SubstituteTarget};
pub use interception::session::{
    fail_resolution, substitute_resolution, FailOptions, InterceptContext, InterceptSession,
    SessionGuard, SubstituteOptions,
};
pub use pipeline::hooks::{HookPair, Importer, Pipeline};
pub use pipeline::loader::{ModuleCatalog, ModuleDefinition};
pub use pipeline::module::{Attribute, ModuleHandle};
pub use pipeline::registry::ModuleRegistry;
pub use utils::errors::{InterceptError, ResolveError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
