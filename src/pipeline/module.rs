// src/pipeline/module.rs
//! Module handles and their runtime state
//!
//! A [`ModuleHandle`] is a shared reference to a loaded module's mutable
//! state. Identity is reference identity: two handles are "the same module"
//! only if they point at the same allocation, which is what lets tests
//! observe whether a resolve call returned a cached module or a fresh load.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Split a qualified name into `(parent, leaf)` at the last dot
///
/// `"pkg.sub.mod"` splits into `("pkg.sub", "mod")`; a top-level name splits
/// into `("", name)`.
pub fn split_leaf(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) => (&name[..index], &name[index + 1..]),
        None => ("", name),
    }
}

/// The load specification embedded in a module at load time
///
/// `name` is the qualified name the module was loaded under; `parent` is the
/// qualified name of the package that exposed it (empty for top-level
/// modules). Aliasing rewrites `name` but leaves `parent` pointing at the
/// true package the module came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOrigin {
    /// Qualified name recorded at load time
    pub name: String,

    /// Qualified name of the loading package, empty for top-level modules
    pub parent: String,
}

/// A value exposed as a module attribute
///
/// Submodules hang off their package as `Module` attributes; everything else
/// (functions, constants, re-exports) is carried as an opaque JSON value.
#[derive(Debug, Clone)]
pub enum Attribute {
    /// Another module exposed under this name
    Module(ModuleHandle),

    /// Any non-module value
    Value(serde_json::Value),
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Attribute::Module(a), Attribute::Module(b)) => a.same(b),
            (Attribute::Value(a), Attribute::Value(b)) => a == b,
            _ => false,
        }
    }
}

/// Mutable state of a loaded module
#[derive(Debug)]
pub struct ModuleData {
    /// The module's own identity; rewritten when the module is aliased
    pub name: String,

    /// Load specification, if the module went through a loader
    pub origin: Option<ModuleOrigin>,

    /// Attributes, sorted by name so visible-name iteration is deterministic
    pub attrs: BTreeMap<String, Attribute>,

    /// Explicit export list, when the module declares one
    pub exports: Option<Vec<String>>,
}

/// Shared, identity-comparable handle to a loaded module
#[derive(Clone)]
pub struct ModuleHandle {
    inner: Arc<RwLock<ModuleData>>,
}

impl ModuleHandle {
    /// Create a module with the given identity and no attributes
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ModuleData {
                name: name.into(),
                origin: None,
                attrs: BTreeMap::new(),
                exports: None,
            })),
        }
    }

    /// `true` when both handles refer to the same module state
    pub fn same(&self, other: &ModuleHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The module's current identity
    pub fn name(&self) -> String {
        self.inner.read().name.clone()
    }

    /// Rewrite the module's identity
    pub fn set_name(&self, name: impl Into<String>) {
        self.inner.write().name = name.into();
    }

    /// The embedded load specification, if any
    pub fn origin(&self) -> Option<ModuleOrigin> {
        self.inner.read().origin.clone()
    }

    pub fn set_origin(&self, origin: ModuleOrigin) {
        self.inner.write().origin = Some(origin);
    }

    /// Rewrite the name recorded in the load specification, if one exists
    pub fn set_origin_name(&self, name: impl Into<String>) {
        if let Some(origin) = self.inner.write().origin.as_mut() {
            origin.name = name.into();
        }
    }

    /// Qualified name of the true parent package, when the module has one
    pub fn origin_parent(&self) -> Option<String> {
        self.inner
            .read()
            .origin
            .as_ref()
            .filter(|origin| !origin.parent.is_empty())
            .map(|origin| origin.parent.clone())
    }

    pub fn get_attr(&self, name: &str) -> Option<Attribute> {
        self.inner.read().attrs.get(name).cloned()
    }

    pub fn set_attr(&self, name: impl Into<String>, value: Attribute) {
        self.inner.write().attrs.insert(name.into(), value);
    }

    pub fn remove_attr(&self, name: &str) -> Option<Attribute> {
        self.inner.write().attrs.remove(name)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.inner.read().attrs.contains_key(name)
    }

    /// Attribute names not starting with an underscore, in sorted order
    pub fn visible_attr_names(&self) -> Vec<String> {
        self.inner
            .read()
            .attrs
            .keys()
            .filter(|name| !name.starts_with('_'))
            .cloned()
            .collect()
    }

    /// The explicit export list, if the module declares one
    pub fn exports(&self) -> Option<Vec<String>> {
        self.inner.read().exports.clone()
    }

    pub fn set_exports(&self, exports: Vec<String>) {
        self.inner.write().exports = Some(exports);
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<module '{}' at {:p}>",
            self.inner.read().name,
            Arc::as_ptr(&self.inner)
        )
    }
}
