// src/pipeline/hooks.rs
//! The resolution pipeline and its two replaceable hook slots
//!
//! The pipeline exposes exactly two hook points:
//!
//! - `resolve(name, importer)` turns a qualified name into a module handle
//! - `resolve_members(module, names, importer, recursive)` satisfies a
//!   from-list request against an already resolved module
//!
//! Interception replaces both slots with wrappers and must preserve the
//! signatures exactly; unrelated code keeps calling through [`Pipeline`]
//! unaware of the swap. The pipeline is an explicit capability object passed
//! to every component that reads or replaces the active hooks, so ownership
//! is visible and tests can build as many isolated pipelines as they like.

use crate::pipeline::module::ModuleHandle;
use crate::utils::errors::ResolveError;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Opaque context token threaded through the hooks untouched
///
/// Stands in for whatever loading context the surrounding system carries;
/// wrappers pass it verbatim to the prior hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Importer {
    label: String,
}

impl Importer {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// The name-resolution hook
pub type ResolveHook =
    Arc<dyn Fn(&str, &Importer) -> Result<ModuleHandle, ResolveError> + Send + Sync>;

/// The from-list hook
pub type ResolveMembersHook = Arc<
    dyn Fn(&ModuleHandle, &[String], &Importer, bool) -> Result<ModuleHandle, ResolveError>
        + Send
        + Sync,
>;

/// The pair of hooks installed in a pipeline at one point in time
#[derive(Clone)]
pub struct HookPair {
    pub resolve: ResolveHook,
    pub resolve_members: ResolveMembersHook,
}

impl fmt::Debug for HookPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HookPair(resolve at {:p}, resolve_members at {:p})",
            Arc::as_ptr(&self.resolve),
            Arc::as_ptr(&self.resolve_members)
        )
    }
}

impl HookPair {
    /// `true` when both slots hold the same hook objects as `other`
    pub fn same(&self, other: &HookPair) -> bool {
        // Compare data pointers only; vtable pointers are not stable.
        std::ptr::eq(
            Arc::as_ptr(&self.resolve) as *const (),
            Arc::as_ptr(&other.resolve) as *const (),
        ) && std::ptr::eq(
            Arc::as_ptr(&self.resolve_members) as *const (),
            Arc::as_ptr(&other.resolve_members) as *const (),
        )
    }
}

/// The resolution pipeline: two hook slots behind one capability object
pub struct Pipeline {
    hooks: RwLock<HookPair>,
}

impl Pipeline {
    /// Create a pipeline with `hooks` as its base behavior
    pub fn new(hooks: HookPair) -> Self {
        Self {
            hooks: RwLock::new(hooks),
        }
    }

    /// Clone of the currently installed hook pair
    pub fn current(&self) -> HookPair {
        self.hooks.read().clone()
    }

    /// Replace both hook slots
    pub fn install(&self, hooks: HookPair) {
        *self.hooks.write() = hooks;
    }

    /// Resolve `name` through the currently installed hook
    ///
    /// The slot lock is released before the hook runs, so hooks are free to
    /// call back into the pipeline (alias-parent resolution does).
    pub fn resolve(&self, name: &str, importer: &Importer) -> Result<ModuleHandle, ResolveError> {
        let hook = self.hooks.read().resolve.clone();
        hook(name, importer)
    }

    /// Satisfy a from-list request through the currently installed hook
    pub fn resolve_members(
        &self,
        module: &ModuleHandle,
        names: &[String],
        importer: &Importer,
        recursive: bool,
    ) -> Result<ModuleHandle, ResolveError> {
        let hook = self.hooks.read().resolve_members.clone();
        hook(module, names, importer, recursive)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pipeline({:?})", self.hooks.read())
    }
}
