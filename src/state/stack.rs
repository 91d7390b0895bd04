// src/state/stack.rs
//! LIFO stack of active intercept states
//!
//! Sessions nest strictly LIFO. Unwinding from a given state reverts that
//! state and every state pushed after it, in reverse order, so deactivating
//! an outer session while an inner one is still active forces the inner one
//! to revert first. The stack also keeps the absolute original hook pair,
//! captured once at construction, as the safety net for [`clear`].
//!
//! [`clear`]: InterceptStack::clear

use crate::pipeline::hooks::{HookPair, Pipeline};
use crate::state::intercept_state::InterceptState;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ordered collection of intercept states for one pipeline
pub struct InterceptStack {
    pipeline: Arc<Pipeline>,

    /// Hook pair installed when this stack was created; only `clear` uses it
    original: HookPair,

    entries: Mutex<Vec<Arc<InterceptState>>>,
}

impl InterceptStack {
    /// Create a stack for `pipeline`, capturing its current hooks as the
    /// absolute original
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let original = pipeline.current();
        Self {
            pipeline,
            original,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Append a freshly captured state
    pub fn push(&self, state: Arc<InterceptState>) {
        self.entries.lock().push(state);
    }

    /// Number of states currently tracked
    pub fn depth(&self) -> usize {
        self.entries.lock().len()
    }

    /// Revert `from` and everything pushed after it, in LIFO order
    ///
    /// `None` unwinds everything. A `from` that is not in the stack is a
    /// silent no-op: a more deeply nested unwind may have legitimately
    /// removed it already. Already-inactive states in the suffix are
    /// skipped, and a revert failure does not stop the sweep.
    pub fn unwind(&self, from: Option<&Arc<InterceptState>>) {
        let mut entries = self.entries.lock();
        let index = match from {
            None => 0,
            Some(state) => match entries.iter().position(|entry| Arc::ptr_eq(entry, state)) {
                Some(index) => index,
                None => return,
            },
        };
        for state in entries[index..].iter().rev() {
            if state.is_active() {
                if let Err(err) = state.revert() {
                    warn!("revert during unwind failed: {}", err);
                }
            }
        }
        debug!("unwound {} intercept state(s)", entries.len() - index);
        entries.truncate(index);
    }

    /// Unwind everything, then force-restore the absolute original hooks
    ///
    /// Covers a leaked wrapper if an individual revert's hook-restore step
    /// was itself skipped by an earlier failure.
    pub fn clear(&self) {
        self.unwind(None);
        self.pipeline.install(self.original.clone());
    }
}
