// src/interception/policy.rs
//! Interception policy: one session's matching rules
//!
//! A policy owns three rule sets (fail, substitute, hide) plus the
//! configured failure and a couple of behavior knobs. Rule sets are frozen
//! at construction; the failure spec, the reload flag, and the debug flag
//! may be adjusted live by the owning session between pipeline events.

use crate::interception::matcher::{Matcher, NameSpec};
use crate::pipeline::module::ModuleHandle;
use crate::utils::errors::{InterceptError, ResolveError, Result};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What to load in place of a matched name
#[derive(Debug, Clone)]
pub enum SubstituteTarget {
    /// A qualified name to load instead
    Name(String),

    /// An already resolved module; its own name is used at match time
    Module(ModuleHandle),
}

impl SubstituteTarget {
    /// The qualified name to load, resolved at use time
    pub fn qualified_name(&self) -> String {
        match self {
            SubstituteTarget::Name(name) => name.clone(),
            SubstituteTarget::Module(module) => module.name(),
        }
    }
}

impl From<&str> for SubstituteTarget {
    fn from(value: &str) -> Self {
        SubstituteTarget::Name(value.to_string())
    }
}

impl From<String> for SubstituteTarget {
    fn from(value: String) -> Self {
        SubstituteTarget::Name(value)
    }
}

impl From<ModuleHandle> for SubstituteTarget {
    fn from(value: ModuleHandle) -> Self {
        SubstituteTarget::Module(value)
    }
}

impl From<&ModuleHandle> for SubstituteTarget {
    fn from(value: &ModuleHandle) -> Self {
        SubstituteTarget::Module(value.clone())
    }
}

/// The exception a fail rule injects
///
/// A factory plays the role of an exception class (instantiated with the
/// failing name); an instance is returned as-is.
#[derive(Clone, Default)]
pub enum FailureSpec {
    /// Default: `ResolveError::NotFound` carrying the failing name
    #[default]
    NotFound,

    /// Build the error from the failing name
    Factory(Arc<dyn Fn(&str) -> ResolveError + Send + Sync>),

    /// A fixed error returned for every failing name
    Instance(ResolveError),
}

impl FailureSpec {
    /// The error to inject for `name`
    pub fn build(&self, name: &str) -> ResolveError {
        match self {
            FailureSpec::NotFound => ResolveError::NotFound(name.to_string()),
            FailureSpec::Factory(factory) => factory(name),
            FailureSpec::Instance(error) => error.clone(),
        }
    }
}

impl fmt::Debug for FailureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureSpec::NotFound => f.write_str("FailureSpec::NotFound"),
            FailureSpec::Factory(_) => f.write_str("FailureSpec::Factory(..)"),
            FailureSpec::Instance(error) => write!(f, "FailureSpec::Instance({error:?})"),
        }
    }
}

/// Configuration a policy is built from
#[derive(Default)]
pub struct PolicyConfig {
    /// Names whose resolution must fail
    pub fail: Vec<NameSpec>,

    /// Ordered substitution rules; first matching source wins
    pub substitute: Vec<(NameSpec, SubstituteTarget)>,

    /// Extra names to hide for the session's duration
    pub hide: Vec<NameSpec>,

    /// The exception injected by fail rules
    pub failure: FailureSpec,

    /// Force a fresh load of substitution targets on every resolve
    pub reload_on_substitute: bool,

    /// Emit one debug event per wrapper invocation
    pub debug: bool,
}

/// One session's matching rules and wrapper behavior knobs
pub struct InterceptPolicy {
    fail: Vec<Matcher>,
    substitutions: Vec<(Matcher, SubstituteTarget)>,
    extra_hide: Vec<Matcher>,
    failure: RwLock<FailureSpec>,
    reload_on_substitute: AtomicBool,
    debug: AtomicBool,
}

impl std::fmt::Debug for InterceptPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptPolicy").finish_non_exhaustive()
    }
}

impl InterceptPolicy {
    /// Build a policy, normalizing every specification
    ///
    /// At least one fail or substitute rule is required; a policy with
    /// neither would intercept nothing and is rejected as a configuration
    /// error.
    pub fn new(config: PolicyConfig) -> Result<Self> {
        if config.fail.is_empty() && config.substitute.is_empty() {
            return Err(InterceptError::Configuration(
                "missing the names of the modules to fail or substitute".to_string(),
            ));
        }
        let fail = Matcher::compile_all(config.fail)?;
        let substitutions = config
            .substitute
            .into_iter()
            .map(|(spec, target)| Ok((Matcher::compile(spec)?, target)))
            .collect::<Result<Vec<_>>>()?;
        let extra_hide = Matcher::compile_all(config.hide)?;
        Ok(Self {
            fail,
            substitutions,
            extra_hide,
            failure: RwLock::new(config.failure),
            reload_on_substitute: AtomicBool::new(config.reload_on_substitute),
            debug: AtomicBool::new(config.debug),
        })
    }

    /// `true` when `name` matches any fail rule
    pub fn is_fail_match(&self, name: &str) -> bool {
        self.fail.iter().any(|matcher| matcher.matches(name))
    }

    /// The qualified name to load for `name`
    ///
    /// First substitution whose source matches wins, in declared order (not
    /// "most specific"); with no match, `name` itself.
    pub fn substitute_for(&self, name: &str) -> String {
        self.substitutions
            .iter()
            .find(|(matcher, _)| matcher.matches(name))
            .map(|(_, target)| target.qualified_name())
            .unwrap_or_else(|| name.to_string())
    }

    /// The hide set: fail rules, substitution sources, and explicit hides
    pub fn hide_matchers(&self) -> Vec<Matcher> {
        self.fail
            .iter()
            .cloned()
            .chain(self.substitutions.iter().map(|(matcher, _)| matcher.clone()))
            .chain(self.extra_hide.iter().cloned())
            .collect()
    }

    /// The error to inject for a failing `name`
    pub fn failure_for(&self, name: &str) -> ResolveError {
        self.failure.read().build(name)
    }

    pub fn set_failure(&self, failure: FailureSpec) {
        *self.failure.write() = failure;
    }

    pub fn reload_on_substitute(&self) -> bool {
        self.reload_on_substitute.load(Ordering::Relaxed)
    }

    pub fn set_reload_on_substitute(&self, reload: bool) {
        self.reload_on_substitute.store(reload, Ordering::Relaxed);
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn set_debug(&self, debug: bool) {
        self.debug.store(debug, Ordering::Relaxed);
    }

    /// Expand a from-list into fully qualified candidate names
    ///
    /// `*` expands to the module's explicit export list when present, else
    /// to every non-private visible attribute name; any other entry expands
    /// to `module.entry`.
    pub fn expand_fromlist(&self, module: &ModuleHandle, names: &[String]) -> Vec<String> {
        let module_name = module.name();
        let mut expanded = Vec::new();
        for entry in names {
            if entry == "*" {
                let exported = module
                    .exports()
                    .unwrap_or_else(|| module.visible_attr_names());
                expanded.extend(
                    exported
                        .iter()
                        .map(|export| format!("{module_name}.{export}")),
                );
            } else {
                expanded.push(format!("{module_name}.{entry}"));
            }
        }
        expanded
    }

    /// First expanded from-list candidate matching the fail set
    pub fn first_fail_member(&self, module: &ModuleHandle, names: &[String]) -> Option<String> {
        self.expand_fromlist(module, names)
            .into_iter()
            .find(|candidate| self.is_fail_match(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::module::Attribute;

    fn fail_policy(names: &[&str]) -> InterceptPolicy {
        InterceptPolicy::new(PolicyConfig {
            fail: names.iter().map(|name| NameSpec::from(*name)).collect(),
            ..PolicyConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_empty_config_rejected() {
        let err = InterceptPolicy::new(PolicyConfig::default()).unwrap_err();
        assert!(matches!(err, InterceptError::Configuration(_)));
    }

    #[test]
    fn test_fail_match() {
        let policy = fail_policy(&["pkg.mod", "other.*"]);
        assert!(policy.is_fail_match("pkg.mod"));
        assert!(policy.is_fail_match("other.thing"));
        assert!(!policy.is_fail_match("pkg.mod2"));
    }

    #[test]
    fn test_substitute_first_match_wins() {
        let policy = InterceptPolicy::new(PolicyConfig {
            substitute: vec![
                (NameSpec::from("pkg.*"), SubstituteTarget::from("broad")),
                (NameSpec::from("pkg.mod"), SubstituteTarget::from("narrow")),
            ],
            ..PolicyConfig::default()
        })
        .unwrap();

        // Declared order decides, not specificity.
        assert_eq!(policy.substitute_for("pkg.mod"), "broad");
        assert_eq!(policy.substitute_for("unrelated"), "unrelated");
    }

    #[test]
    fn test_substitute_module_target_resolved_at_use_time() {
        let module = ModuleHandle::new("mock.impl");
        let policy = InterceptPolicy::new(PolicyConfig {
            substitute: vec![(NameSpec::from("real"), SubstituteTarget::from(&module))],
            ..PolicyConfig::default()
        })
        .unwrap();

        assert_eq!(policy.substitute_for("real"), "mock.impl");
        module.set_name("mock.renamed");
        assert_eq!(policy.substitute_for("real"), "mock.renamed");
    }

    #[test]
    fn test_hide_set_union() {
        let policy = InterceptPolicy::new(PolicyConfig {
            fail: vec![NameSpec::from("failed")],
            substitute: vec![(NameSpec::from("subbed"), SubstituteTarget::from("target"))],
            hide: vec![NameSpec::from("hidden.*")],
            ..PolicyConfig::default()
        })
        .unwrap();

        let hide = policy.hide_matchers();
        assert_eq!(hide.len(), 3);
        assert!(hide.iter().any(|m| m.matches("failed")));
        assert!(hide.iter().any(|m| m.matches("subbed")));
        assert!(hide.iter().any(|m| m.matches("hidden.thing")));
        // The substitution *target* is not hidden.
        assert!(!hide.iter().any(|m| m.matches("target")));
    }

    #[test]
    fn test_failure_specs() {
        let policy = fail_policy(&["x"]);
        assert_eq!(policy.failure_for("x"), ResolveError::NotFound("x".to_string()));

        policy.set_failure(FailureSpec::Factory(Arc::new(|name| {
            ResolveError::Failed(format!("blocked: {name}"))
        })));
        assert_eq!(
            policy.failure_for("x"),
            ResolveError::Failed("blocked: x".to_string())
        );

        policy.set_failure(FailureSpec::Instance(ResolveError::Failed(
            "fixed message".to_string(),
        )));
        assert_eq!(
            policy.failure_for("anything"),
            ResolveError::Failed("fixed message".to_string())
        );
    }

    #[test]
    fn test_expand_fromlist_plain_entries() {
        let policy = fail_policy(&["x"]);
        let module = ModuleHandle::new("pkg");
        let names = vec!["thing".to_string(), "other".to_string()];
        assert_eq!(
            policy.expand_fromlist(&module, &names),
            vec!["pkg.thing", "pkg.other"]
        );
    }

    #[test]
    fn test_expand_fromlist_star_prefers_exports() {
        let policy = fail_policy(&["x"]);
        let module = ModuleHandle::new("pkg");
        module.set_attr("visible", Attribute::Value(serde_json::json!(1)));
        module.set_attr("_private", Attribute::Value(serde_json::json!(2)));

        // No export list: every non-private attribute, sorted.
        assert_eq!(
            policy.expand_fromlist(&module, &["*".to_string()]),
            vec!["pkg.visible"]
        );

        module.set_exports(vec!["chosen".to_string()]);
        assert_eq!(
            policy.expand_fromlist(&module, &["*".to_string()]),
            vec!["pkg.chosen"]
        );
    }

    #[test]
    fn test_first_fail_member() {
        let policy = fail_policy(&["pkg.thing"]);
        let module = ModuleHandle::new("pkg");
        assert_eq!(
            policy.first_fail_member(&module, &["thing".to_string()]),
            Some("pkg.thing".to_string())
        );
        assert_eq!(policy.first_fail_member(&module, &["other".to_string()]), None);
    }

    #[test]
    fn test_live_knobs() {
        let policy = fail_policy(&["x"]);
        assert!(!policy.debug_enabled());
        policy.set_debug(true);
        assert!(policy.debug_enabled());

        assert!(!policy.reload_on_substitute());
        policy.set_reload_on_substitute(true);
        assert!(policy.reload_on_substitute());
    }
}
