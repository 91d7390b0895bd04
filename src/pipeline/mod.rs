// src/pipeline/mod.rs
//! The module world the engine wraps
//!
//! - **module**: shared module handles with identity, attributes, and origin
//! - **registry**: the qualified-name to handle map
//! - **hooks**: the pipeline capability object and its two hook slots
//! - **loader**: stock catalog-backed hooks for sandbox pipelines

pub mod hooks;
pub mod loader;
pub mod module;
pub mod registry;

// Re-export commonly used types
pub use hooks::{HookPair, Importer, Pipeline, ResolveHook, ResolveMembersHook};
pub use loader::{ModuleCatalog, ModuleDefinition};
pub use module::{split_leaf, Attribute, ModuleData, ModuleHandle, ModuleOrigin};
pub use registry::ModuleRegistry;
