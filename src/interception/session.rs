// src/interception/session.rs
//! Interception sessions: wiring a policy into a pipeline
//!
//! An [`InterceptSession`] binds one [`InterceptPolicy`] to at most one live
//! [`InterceptState`]. Activation captures a state (snapshotting the current
//! hooks and hiding matching registry entries) and installs the session's
//! two wrapper functions as the pipeline's hooks; deactivation unwinds the
//! stack from the bound state, which reverts it and every state pushed after
//! it. [`SessionGuard`] gives the scoped form: deactivation runs on every
//! exit path, panics included.
//!
//! The wrappers delegate to the *state's* captured prior hooks, not to the
//! absolute originals. That is what makes nesting compose: an inner
//! session's wrapper falls through to the outer session's wrapper, and so on
//! down to the base hooks.

use crate::interception::matcher::NameSpec;
use crate::interception::policy::{
    FailureSpec, InterceptPolicy, PolicyConfig, SubstituteTarget,
};
use crate::pipeline::hooks::{HookPair, Importer, Pipeline};
use crate::pipeline::loader::ModuleCatalog;
use crate::pipeline::module::{split_leaf, Attribute, ModuleHandle};
use crate::pipeline::registry::ModuleRegistry;
use crate::state::intercept_state::InterceptState;
use crate::state::stack::InterceptStack;
use crate::utils::errors::{InterceptError, ResolveError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// The capability bundle sessions operate on
///
/// One pipeline, its registry, and the stack tracking intercept states for
/// it. Cloning shares all three.
#[derive(Clone)]
pub struct InterceptContext {
    pipeline: Arc<Pipeline>,
    registry: Arc<ModuleRegistry>,
    stack: Arc<InterceptStack>,
}

impl InterceptContext {
    /// Wrap an existing pipeline and registry
    ///
    /// The stack captures the pipeline's current hooks as the absolute
    /// original, so build the context before activating anything.
    pub fn new(pipeline: Arc<Pipeline>, registry: Arc<ModuleRegistry>) -> Self {
        let stack = Arc::new(InterceptStack::new(Arc::clone(&pipeline)));
        Self {
            pipeline,
            registry,
            stack,
        }
    }

    /// Fresh sandbox world: empty registry, stock hooks over `catalog`
    pub fn sandbox(catalog: ModuleCatalog) -> Self {
        let catalog = Arc::new(catalog);
        let registry = Arc::new(ModuleRegistry::new());
        let pipeline = Arc::new_cyclic(|weak| {
            Pipeline::new(ModuleCatalog::hooks(&catalog, &registry, weak))
        });
        Self::new(pipeline, registry)
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn stack(&self) -> &Arc<InterceptStack> {
        &self.stack
    }

    /// Resolve `name` through the current hooks (the "import statement")
    pub fn resolve(&self, name: &str) -> std::result::Result<ModuleHandle, ResolveError> {
        self.pipeline.resolve(name, &Importer::default())
    }

    /// From-list resolution through the current hooks (`from module import ...`)
    pub fn resolve_members(
        &self,
        module: &ModuleHandle,
        names: &[&str],
    ) -> std::result::Result<ModuleHandle, ResolveError> {
        let names: Vec<String> = names.iter().map(|name| name.to_string()).collect();
        self.pipeline
            .resolve_members(module, &names, &Importer::default(), false)
    }
}

/// A session binding one policy to one intercept state
pub struct InterceptSession {
    context: InterceptContext,
    policy: Arc<InterceptPolicy>,
    state: Mutex<Option<Arc<InterceptState>>>,
}

impl std::fmt::Debug for InterceptSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptSession").finish_non_exhaustive()
    }
}

impl InterceptSession {
    /// Create an inactive session over `context`
    pub fn new(context: InterceptContext, policy: InterceptPolicy) -> Arc<Self> {
        Arc::new(Self {
            context,
            policy: Arc::new(policy),
            state: Mutex::new(None),
        })
    }

    pub fn policy(&self) -> &InterceptPolicy {
        &self.policy
    }

    pub fn context(&self) -> &InterceptContext {
        &self.context
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().is_some()
    }

    fn bound_state(&self) -> Option<Arc<InterceptState>> {
        self.state.lock().clone()
    }

    /// Install this session's wrappers as the pipeline's hooks
    ///
    /// Strict mode fails with [`InterceptError::AlreadyActive`] when the
    /// session is already bound to a live state; non-strict returns
    /// `Ok(false)` instead, for idempotent setup code.
    pub fn activate(self: &Arc<Self>, strict: bool) -> Result<bool> {
        let mut binding = self.state.lock();
        if binding.is_some() {
            if strict {
                return Err(InterceptError::AlreadyActive);
            }
            return Ok(false);
        }
        let state = Arc::new(InterceptState::capture(
            Arc::clone(&self.context.pipeline),
            Arc::clone(&self.context.registry),
            self.policy.hide_matchers(),
        ));
        self.context.stack.push(Arc::clone(&state));
        self.context.pipeline.install(self.wrapper_hooks());
        if self.policy.debug_enabled() {
            debug!("activated: {:?}", state);
        }
        *binding = Some(state);
        Ok(true)
    }

    /// Unwind the stack from this session's state and clear the binding
    ///
    /// Unwinding also reverts every state pushed after this session's, so
    /// deactivating an outer session closes any inner ones first. Strict
    /// mode fails with [`InterceptError::NotActive`] when no state is bound;
    /// non-strict returns `Ok(false)`, for idempotent cleanup code.
    pub fn deactivate(&self, strict: bool) -> Result<bool> {
        let mut binding = self.state.lock();
        match binding.take() {
            None => {
                if strict {
                    Err(InterceptError::NotActive)
                } else {
                    Ok(false)
                }
            }
            Some(state) => {
                self.context.stack.unwind(Some(&state));
                Ok(true)
            }
        }
    }

    /// Activate and return a guard that deactivates on drop
    ///
    /// The guard releases on every exit path, panics included. This is the
    /// scoped-resource form and the recommended way to use a session.
    pub fn scoped(self: &Arc<Self>) -> Result<SessionGuard> {
        self.activate(true)?;
        Ok(SessionGuard {
            session: Arc::clone(self),
        })
    }

    /// Adjust the debug flag between pipeline events
    pub fn set_debug(&self, enabled: bool) {
        self.policy.set_debug(enabled);
    }

    /// Adjust the reload flag between pipeline events
    pub fn set_reload_on_substitute(&self, reload: bool) {
        self.policy.set_reload_on_substitute(reload);
    }

    /// Adjust the injected failure between pipeline events
    pub fn set_failure(&self, failure: FailureSpec) {
        self.policy.set_failure(failure);
    }

    /// Both wrapper functions, capturing this session
    fn wrapper_hooks(self: &Arc<Self>) -> HookPair {
        let for_resolve = Arc::clone(self);
        let for_members = Arc::clone(self);
        HookPair {
            resolve: Arc::new(move |name, importer| {
                for_resolve.resolve_interposed(name, importer)
            }),
            resolve_members: Arc::new(move |module, names, importer, recursive| {
                for_members.resolve_members_interposed(module, names, importer, recursive)
            }),
        }
    }

    /// Wrapper for the `resolve` hook: the fail/substitute/alias engine
    fn resolve_interposed(
        &self,
        name: &str,
        importer: &Importer,
    ) -> std::result::Result<ModuleHandle, ResolveError> {
        if self.policy.debug_enabled() {
            debug!("InterceptSession.resolve({:?}, {:?})", name, importer);
        }
        let state = self.bound_state().ok_or_else(|| {
            ResolveError::Failed("interception session is not active".to_string())
        })?;

        if self.policy.is_fail_match(name) {
            return Err(self.policy.failure_for(name));
        }

        let target = self.policy.substitute_for(name);
        let attrib_value = if target != name {
            self.parent_attribute(&target, importer, &state)?
        } else {
            None
        };
        let saved_registry = self.context.registry.get(&target);

        // Pop the target to force the underlying pipeline into a fresh load.
        let existing = if self.policy.reload_on_substitute() || state.is_hidden(&target) {
            self.context.registry.remove(&target)
        } else {
            None
        };

        let result = (state.prior_resolve())(&target, importer)?;

        // Undo the forced-reload probe, then put the target's registry slot
        // back exactly as it was before this call.
        if let Some(module) = existing {
            self.context.registry.set(target.clone(), module);
        }
        match saved_registry {
            Some(module) => self.context.registry.set(target.clone(), module),
            None => {
                self.context.registry.remove(&target);
            }
        }

        self.install_alias(&result, name, attrib_value, importer)?;
        Ok(result)
    }

    /// Wrapper for the `resolve_members` hook: failure injection only
    fn resolve_members_interposed(
        &self,
        module: &ModuleHandle,
        names: &[String],
        importer: &Importer,
        recursive: bool,
    ) -> std::result::Result<ModuleHandle, ResolveError> {
        if self.policy.debug_enabled() {
            debug!(
                "InterceptSession.resolve_members({:?}, {:?}, {:?}, recursive={})",
                module, names, importer, recursive
            );
        }
        let state = self.bound_state().ok_or_else(|| {
            ResolveError::Failed("interception session is not active".to_string())
        })?;

        if let Some(candidate) = self.policy.first_fail_member(module, names) {
            return Err(self.policy.failure_for(&candidate));
        }

        (state.prior_resolve_members())(module, names, importer, recursive)
    }

    /// Current value of the attribute `target`'s parent exposes it under
    ///
    /// Loading `target` overwrites that attribute on its parent; grabbing it
    /// beforehand lets the alias step put the original back. Resolved via
    /// the prior hook so this probe does not itself re-trigger interception.
    fn parent_attribute(
        &self,
        target: &str,
        importer: &Importer,
        state: &InterceptState,
    ) -> std::result::Result<Option<Attribute>, ResolveError> {
        let (parent_name, leaf) = split_leaf(target);
        if parent_name.is_empty() {
            return Ok(None);
        }
        let parent = (state.prior_resolve())(parent_name, importer)?;
        Ok(parent.get_attr(leaf))
    }

    /// Make `loaded` appear under the requested `name`
    ///
    /// Installs the registry alias, detaches the fresh load from its true
    /// parent (restoring `attrib_value`), attaches it to the alias parent
    /// (resolving that parent through this same wrapper), and rewrites the
    /// module's identity to `name`.
    fn install_alias(
        &self,
        loaded: &ModuleHandle,
        name: &str,
        attrib_value: Option<Attribute>,
        importer: &Importer,
    ) -> std::result::Result<(), ResolveError> {
        self.context.registry.set(name.to_string(), loaded.clone());
        if loaded.name() == name {
            // Nothing to disguise.
            return Ok(());
        }

        if let Some(parent_name) = loaded.origin_parent() {
            if let Some(true_parent) = self.context.registry.get(&parent_name) {
                let loaded_name = loaded.name();
                let (_, leaf) = split_leaf(&loaded_name);
                match attrib_value {
                    Some(value) => true_parent.set_attr(leaf, value),
                    None => {
                        true_parent.remove_attr(leaf);
                    }
                }
            }
        }

        let (alias_parent_name, alias_leaf) = split_leaf(name);
        if !alias_parent_name.is_empty() {
            let alias_parent = self.resolve_interposed(alias_parent_name, importer)?;
            alias_parent.set_attr(alias_leaf, Attribute::Module(loaded.clone()));
        }

        loaded.set_name(name);
        loaded.set_origin_name(name);
        Ok(())
    }
}

/// Scoped activation: deactivates its session on drop
pub struct SessionGuard {
    session: Arc<InterceptSession>,
}

impl SessionGuard {
    pub fn session(&self) -> &Arc<InterceptSession> {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let _ = self.session.deactivate(false);
    }
}

/// Options for [`fail_resolution`]
#[derive(Default)]
pub struct FailOptions {
    /// Extra names to hide for the session's duration
    pub hide: Vec<NameSpec>,

    /// The exception injected for matching names
    pub failure: FailureSpec,

    /// Emit one debug event per wrapper invocation
    pub debug: bool,
}

/// Options for [`substitute_resolution`]
#[derive(Default)]
pub struct SubstituteOptions {
    /// Extra names to hide for the session's duration
    pub hide: Vec<NameSpec>,

    /// Force a fresh load of substitution targets on every resolve
    pub reload: bool,

    /// Emit one debug event per wrapper invocation
    pub debug: bool,
}

/// Session that fails resolution of the given names
///
/// At least one name is required; an empty set is a configuration error.
pub fn fail_resolution<I, S>(
    context: &InterceptContext,
    names: I,
    options: FailOptions,
) -> Result<Arc<InterceptSession>>
where
    I: IntoIterator<Item = S>,
    S: Into<NameSpec>,
{
    let policy = InterceptPolicy::new(PolicyConfig {
        fail: names.into_iter().map(Into::into).collect(),
        hide: options.hide,
        failure: options.failure,
        debug: options.debug,
        ..PolicyConfig::default()
    })?;
    Ok(InterceptSession::new(context.clone(), policy))
}

/// Session that loads a different module in place of matching names
///
/// Rules are ordered; the first matching source wins. At least one rule is
/// required; an empty mapping is a configuration error.
pub fn substitute_resolution<I, S, T>(
    context: &InterceptContext,
    mapping: I,
    options: SubstituteOptions,
) -> Result<Arc<InterceptSession>>
where
    I: IntoIterator<Item = (S, T)>,
    S: Into<NameSpec>,
    T: Into<SubstituteTarget>,
{
    let policy = InterceptPolicy::new(PolicyConfig {
        substitute: mapping
            .into_iter()
            .map(|(spec, target)| (spec.into(), target.into()))
            .collect(),
        hide: options.hide,
        reload_on_substitute: options.reload,
        debug: options.debug,
        ..PolicyConfig::default()
    })?;
    Ok(InterceptSession::new(context.clone(), policy))
}
