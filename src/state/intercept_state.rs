// src/state/intercept_state.rs
//! One session's snapshot of the pipeline and registry
//!
//! An intercept state captures the hook pair that was installed at
//! activation time (which may belong to an outer session, not the absolute
//! original) and stashes every registry entry the session's hide set
//! matches. Its one-shot [`revert`](InterceptState::revert) puts both back.

use crate::interception::matcher::Matcher;
use crate::pipeline::hooks::{HookPair, Pipeline, ResolveHook, ResolveMembersHook};
use crate::pipeline::module::ModuleHandle;
use crate::pipeline::registry::ModuleRegistry;
use crate::utils::errors::{InterceptError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Snapshot-and-undo record for one active interception session
pub struct InterceptState {
    pipeline: Arc<Pipeline>,
    registry: Arc<ModuleRegistry>,

    /// Hooks installed when this state was captured
    prior: HookPair,

    /// Patterns whose matching registry entries are hidden for the session
    hide_matchers: Vec<Matcher>,

    /// Entries removed from the registry at capture time, keyed by name
    stashed: RwLock<HashMap<String, ModuleHandle>>,

    /// Cleared by revert; a state reverts at most once
    active: AtomicBool,
}

impl InterceptState {
    /// Capture the current hooks and hide every matching registry entry
    pub fn capture(
        pipeline: Arc<Pipeline>,
        registry: Arc<ModuleRegistry>,
        hide_matchers: Vec<Matcher>,
    ) -> Self {
        let prior = pipeline.current();
        let state = Self {
            pipeline,
            registry,
            prior,
            hide_matchers,
            stashed: RwLock::new(HashMap::new()),
            active: AtomicBool::new(true),
        };
        state.hide_matching();
        state
    }

    /// Names currently in the registry that match the hide set
    fn matching_names(&self) -> Vec<String> {
        self.registry
            .keys()
            .into_iter()
            .filter(|name| {
                self.hide_matchers
                    .iter()
                    .any(|matcher| matcher.matches(name))
            })
            .collect()
    }

    fn hide_matching(&self) {
        let mut stashed = self.stashed.write();
        for name in self.matching_names() {
            if let Some(module) = self.registry.remove(&name) {
                debug!("hiding module '{}'", name);
                stashed.insert(name, module);
            }
        }
    }

    /// `true` while this state has not been reverted
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// `true` if `name` was stashed away at capture time
    pub fn is_hidden(&self, name: &str) -> bool {
        self.stashed.read().contains_key(name)
    }

    /// The resolve hook that was installed when this state was captured
    pub fn prior_resolve(&self) -> ResolveHook {
        self.prior.resolve.clone()
    }

    /// The from-list hook that was installed when this state was captured
    pub fn prior_resolve_members(&self) -> ResolveMembersHook {
        self.prior.resolve_members.clone()
    }

    /// Undo everything this state did to the registry and the pipeline
    ///
    /// Matching entries currently in the registry are discarded first (they
    /// were loaded or reloaded during the session and must not leak past its
    /// end), then every stashed entry is reinserted unconditionally, then the
    /// prior hooks are reinstalled. The state is marked inactive up front, so
    /// a second call fails with [`InterceptError::Revert`] and changes
    /// nothing.
    pub fn revert(&self) -> Result<()> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Err(InterceptError::Revert(format!("{self:?}")));
        }
        for name in self.matching_names() {
            self.registry.remove(&name);
        }
        for (name, module) in self.stashed.write().drain() {
            self.registry.set(name, module);
        }
        self.pipeline.install(self.prior.clone());
        debug!("intercept state reverted");
        Ok(())
    }
}

impl fmt::Debug for InterceptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hidden: Vec<String> = self.stashed.read().keys().cloned().collect();
        hidden.sort();
        write!(
            f,
            "InterceptState(active={}, hidden=[{}])",
            self.is_active(),
            hidden.join(", ")
        )
    }
}
