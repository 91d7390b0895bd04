// src/pipeline/loader.rs
//! Stock module loader backing a sandbox pipeline
//!
//! The interception engine wraps whatever hooks a pipeline already has; this
//! module provides the stock pair. Modules are loaded out of a
//! [`ModuleCatalog`]: a definition table mapping qualified names to export
//! lists and plain value attributes. Load semantics mirror a real module
//! system:
//!
//! - a registry hit returns the cached handle (forced-reload popping by the
//!   interception layer relies on exactly this),
//! - a miss creates a fresh handle, loads the parent chain through the
//!   *currently installed* resolve hook, registers the module, and exposes
//!   it as an attribute on its parent,
//! - from-list requests load missing submodules through the current resolve
//!   hook and expand `*` against the explicit export list.

use crate::pipeline::hooks::{HookPair, Importer, Pipeline};
use crate::pipeline::module::{split_leaf, Attribute, ModuleHandle, ModuleOrigin};
use crate::pipeline::registry::ModuleRegistry;
use crate::utils::errors::{InterceptError, ResolveError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Definition a module is loaded from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleDefinition {
    /// Explicit export list (`*` in a from-list expands to this)
    #[serde(default)]
    pub exports: Option<Vec<String>>,

    /// Plain value attributes installed at load time
    #[serde(default)]
    pub values: BTreeMap<String, serde_json::Value>,
}

impl ModuleDefinition {
    pub fn with_value(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn with_exports(mut self, exports: Vec<String>) -> Self {
        self.exports = Some(exports);
        self
    }
}

/// Table of loadable module definitions
#[derive(Default)]
pub struct ModuleCatalog {
    definitions: RwLock<HashMap<String, ModuleDefinition>>,
}

impl std::fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCatalog").finish_non_exhaustive()
    }
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the definition for `name`
    pub fn define(&self, name: impl Into<String>, definition: ModuleDefinition) -> &Self {
        self.definitions.write().insert(name.into(), definition);
        self
    }

    /// Add an empty definition for `name`
    pub fn define_module(&self, name: impl Into<String>) -> &Self {
        self.define(name, ModuleDefinition::default())
    }

    /// Build a catalog from a JSON object of `name -> definition`
    pub fn from_json(text: &str) -> Result<Self> {
        let definitions: HashMap<String, ModuleDefinition> = serde_json::from_str(text)
            .map_err(|err| InterceptError::Configuration(format!("invalid catalog JSON: {err}")))?;
        Ok(Self {
            definitions: RwLock::new(definitions),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<ModuleDefinition> {
        self.definitions.read().get(name).cloned()
    }

    /// Stock hook pair loading out of this catalog
    ///
    /// `pipeline` is weak because the pipeline ends up owning these hooks;
    /// parent-chain and from-list loads go back through the currently
    /// installed hooks, exactly like the real machinery, so an active
    /// interception session sees them too.
    pub fn hooks(
        catalog: &Arc<Self>,
        registry: &Arc<ModuleRegistry>,
        pipeline: &Weak<Pipeline>,
    ) -> HookPair {
        let resolve: crate::pipeline::hooks::ResolveHook = {
            let catalog = Arc::clone(catalog);
            let registry = Arc::clone(registry);
            let pipeline = Weak::clone(pipeline);
            Arc::new(move |name: &str, importer: &Importer| {
                load(&catalog, &registry, &pipeline, name, importer)
            })
        };
        let resolve_members: crate::pipeline::hooks::ResolveMembersHook = {
            let pipeline = Weak::clone(pipeline);
            Arc::new(
                move |module: &ModuleHandle,
                      names: &[String],
                      importer: &Importer,
                      recursive: bool| {
                    handle_members(&pipeline, module, names, importer, recursive)
                },
            )
        };
        HookPair {
            resolve,
            resolve_members,
        }
    }
}

fn upgrade(pipeline: &Weak<Pipeline>) -> std::result::Result<Arc<Pipeline>, ResolveError> {
    pipeline
        .upgrade()
        .ok_or_else(|| ResolveError::Failed("resolution pipeline dropped".to_string()))
}

fn load(
    catalog: &ModuleCatalog,
    registry: &ModuleRegistry,
    pipeline: &Weak<Pipeline>,
    name: &str,
    importer: &Importer,
) -> std::result::Result<ModuleHandle, ResolveError> {
    if let Some(existing) = registry.get(name) {
        return Ok(existing);
    }
    let definition = catalog
        .lookup(name)
        .ok_or_else(|| ResolveError::NotFound(name.to_string()))?;

    let (parent_name, leaf) = split_leaf(name);
    let parent = if parent_name.is_empty() {
        None
    } else {
        Some(upgrade(pipeline)?.resolve(parent_name, importer)?)
    };

    let module = ModuleHandle::new(name);
    module.set_origin(ModuleOrigin {
        name: name.to_string(),
        parent: parent_name.to_string(),
    });
    for (attr, value) in definition.values {
        module.set_attr(attr, Attribute::Value(value));
    }
    if let Some(exports) = definition.exports {
        module.set_exports(exports);
    }

    registry.set(name, module.clone());
    if let Some(parent) = parent {
        parent.set_attr(leaf, Attribute::Module(module.clone()));
    }
    debug!("loaded module '{}'", name);
    Ok(module)
}

fn handle_members(
    pipeline: &Weak<Pipeline>,
    module: &ModuleHandle,
    names: &[String],
    importer: &Importer,
    recursive: bool,
) -> std::result::Result<ModuleHandle, ResolveError> {
    for entry in names {
        if entry == "*" {
            // One level of export expansion; the recursive flag is a loop
            // guard against exports that contain `*` themselves.
            if !recursive {
                if let Some(exports) = module.exports() {
                    handle_members(pipeline, module, &exports, importer, true)?;
                }
            }
            continue;
        }
        if module.has_attr(entry) {
            continue;
        }
        let full_name = format!("{}.{}", module.name(), entry);
        upgrade(pipeline)?.resolve(&full_name, importer)?;
    }
    Ok(module.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox(catalog: ModuleCatalog) -> (Arc<Pipeline>, Arc<ModuleRegistry>) {
        let catalog = Arc::new(catalog);
        let registry = Arc::new(ModuleRegistry::new());
        let pipeline = Arc::new_cyclic(|weak| {
            Pipeline::new(ModuleCatalog::hooks(&catalog, &registry, weak))
        });
        (pipeline, registry)
    }

    fn fixture_catalog() -> ModuleCatalog {
        let catalog = ModuleCatalog::new();
        catalog.define_module("pkg");
        catalog.define(
            "pkg.mod",
            ModuleDefinition::default().with_value("answer", serde_json::json!(42)),
        );
        catalog.define(
            "pkg.extra",
            ModuleDefinition::default().with_exports(vec!["helper".to_string()]),
        );
        catalog.define_module("pkg.extra.helper");
        catalog
    }

    #[test]
    fn test_load_registers_and_wires_parent() {
        let (pipeline, registry) = sandbox(fixture_catalog());
        let importer = Importer::default();

        let module = pipeline.resolve("pkg.mod", &importer).unwrap();
        assert_eq!(module.name(), "pkg.mod");
        assert_eq!(module.origin_parent().as_deref(), Some("pkg"));
        assert_eq!(
            module.get_attr("answer"),
            Some(Attribute::Value(serde_json::json!(42)))
        );

        // Parent chain is loaded and the leaf attribute is wired up.
        let parent = registry.get("pkg").unwrap();
        match parent.get_attr("mod") {
            Some(Attribute::Module(child)) => assert!(child.same(&module)),
            other => panic!("unexpected attribute: {:?}", other),
        }
        assert!(registry.contains("pkg.mod"));
    }

    #[test]
    fn test_registry_hit_returns_cached_handle() {
        let (pipeline, _registry) = sandbox(fixture_catalog());
        let importer = Importer::default();

        let first = pipeline.resolve("pkg.mod", &importer).unwrap();
        let second = pipeline.resolve("pkg.mod", &importer).unwrap();
        assert!(first.same(&second));
    }

    #[test]
    fn test_unknown_name_fails() {
        let (pipeline, _registry) = sandbox(fixture_catalog());
        let err = pipeline
            .resolve("no.such.module", &Importer::default())
            .unwrap_err();
        assert_eq!(err, ResolveError::NotFound("no.such.module".to_string()));
    }

    #[test]
    fn test_members_loads_missing_submodule() {
        let (pipeline, registry) = sandbox(fixture_catalog());
        let importer = Importer::default();

        let pkg = pipeline.resolve("pkg", &importer).unwrap();
        assert!(!pkg.has_attr("mod"));

        let result = pipeline
            .resolve_members(&pkg, &["mod".to_string()], &importer, false)
            .unwrap();
        assert!(result.same(&pkg));
        assert!(pkg.has_attr("mod"));
        assert!(registry.contains("pkg.mod"));
    }

    #[test]
    fn test_members_star_expands_exports() {
        let (pipeline, registry) = sandbox(fixture_catalog());
        let importer = Importer::default();

        let extra = pipeline.resolve("pkg.extra", &importer).unwrap();
        pipeline
            .resolve_members(&extra, &["*".to_string()], &importer, false)
            .unwrap();
        assert!(extra.has_attr("helper"));
        assert!(registry.contains("pkg.extra.helper"));
    }

    #[test]
    fn test_from_json_catalog() {
        let catalog = ModuleCatalog::from_json(
            r#"{
                "pkg": {},
                "pkg.mod": {"values": {"answer": 42}, "exports": ["answer"]}
            }"#,
        )
        .unwrap();
        let definition = catalog.lookup("pkg.mod").unwrap();
        assert_eq!(definition.exports, Some(vec!["answer".to_string()]));
        assert_eq!(definition.values["answer"], serde_json::json!(42));

        let err = ModuleCatalog::from_json("not json").unwrap_err();
        assert!(matches!(err, InterceptError::Configuration(_)));
    }
}
