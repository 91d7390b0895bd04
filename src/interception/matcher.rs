// src/interception/matcher.rs
//! Name matchers and specification normalization
//!
//! Rule sets accept several spellings of "which names": a literal string
//! with `*` wildcards, a raw regex pattern, an already compiled matcher, or
//! a resolved module (standing in for its own name). All of them normalize
//! to a [`Matcher`] with these rules for literals:
//!
//! 1. Everything except `*` matches itself literally (dots included).
//! 2. `*` matches any substring, separators included.
//! 3. An end anchor is always added; end the literal with `*` to avoid
//!    anchoring at the end. Anchoring at the start is always applied, which
//!    is what the surrounding resolution machinery's prefix-matching
//!    semantics expect.

use crate::pipeline::module::ModuleHandle;
use crate::utils::errors::{InterceptError, Result};
use regex::Regex;
use std::fmt;

/// A name specification accepted by the rule sets
#[derive(Debug, Clone)]
pub enum NameSpec {
    /// Literal text; `*` matches any substring
    Literal(String),

    /// Raw regex source, compiled anchored at the start only
    Pattern(String),

    /// Already compiled matcher, passed through unchanged
    Compiled(Matcher),

    /// A resolved module, normalized to its own qualified name
    Module(ModuleHandle),
}

impl From<&str> for NameSpec {
    fn from(value: &str) -> Self {
        NameSpec::Literal(value.to_string())
    }
}

impl From<String> for NameSpec {
    fn from(value: String) -> Self {
        NameSpec::Literal(value)
    }
}

impl From<Matcher> for NameSpec {
    fn from(value: Matcher) -> Self {
        NameSpec::Compiled(value)
    }
}

impl From<ModuleHandle> for NameSpec {
    fn from(value: ModuleHandle) -> Self {
        NameSpec::Module(value)
    }
}

impl From<&ModuleHandle> for NameSpec {
    fn from(value: &ModuleHandle) -> Self {
        NameSpec::Module(value.clone())
    }
}

/// Compiled, immutable matcher over qualified names
#[derive(Clone)]
pub struct Matcher {
    regex: Regex,
}

impl Matcher {
    /// Normalize and compile a name specification
    ///
    /// Compiling the same textual input twice yields matchers with identical
    /// match sets. Already compiled matchers pass through unchanged.
    pub fn compile(spec: impl Into<NameSpec>) -> Result<Matcher> {
        match spec.into() {
            NameSpec::Compiled(matcher) => Ok(matcher),
            NameSpec::Module(module) => Self::from_literal(&module.name()),
            NameSpec::Literal(text) => Self::from_literal(&text),
            NameSpec::Pattern(source) => {
                let regex = Regex::new(&format!(r"\A(?:{source})")).map_err(|err| {
                    InterceptError::InvalidSpec(format!("bad pattern '{source}': {err}"))
                })?;
                Ok(Matcher { regex })
            }
        }
    }

    fn from_literal(text: &str) -> Result<Matcher> {
        let fragments: Vec<String> = text.split('*').map(|s| regex::escape(s)).collect();
        let source = format!(r"\A{}$", fragments.join(".*"));
        let regex = Regex::new(&source)
            .map_err(|err| InterceptError::InvalidSpec(format!("bad literal '{text}': {err}")))?;
        Ok(Matcher { regex })
    }

    /// Compile a whole list of specifications
    pub fn compile_all<I, S>(specs: I) -> Result<Vec<Matcher>>
    where
        I: IntoIterator<Item = S>,
        S: Into<NameSpec>,
    {
        specs.into_iter().map(Matcher::compile).collect()
    }

    /// `true` when `name` matches, anchored at the start
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// The compiled regex source
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Matcher({})", self.regex.as_str())
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.regex.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_literal_is_exact() {
        let matcher = Matcher::compile("pkg.mod").unwrap();
        assert!(matcher.matches("pkg.mod"));
        assert!(!matcher.matches("pkg.mod2"), "end anchored");
        assert!(!matcher.matches("pkg.module"), "end anchored");
        assert!(!matcher.matches("xpkg.mod"), "start anchored");
        assert!(!matcher.matches("pkg_mod"), "dot is literal");
    }

    #[test]
    fn test_wildcard_spans_separators() {
        let matcher = Matcher::compile("a*b").unwrap();
        assert!(matcher.matches("axyzb"));
        assert!(matcher.matches("ab"));
        assert!(matcher.matches("a.b"), "wildcard spans separators");
    }

    #[test]
    fn test_literal_separators_outside_wildcard() {
        let matcher = Matcher::compile("foo.b*r").unwrap();
        assert!(matcher.matches("foo.bar"));
        assert!(matcher.matches("foo.beer"));
        assert!(!matcher.matches("foodbar"), "dot outside the wildcard is literal");
    }

    #[test]
    fn test_trailing_wildcard_drops_end_anchor() {
        let matcher = Matcher::compile("pkg.mod*").unwrap();
        assert!(matcher.matches("pkg.mod"));
        assert!(matcher.matches("pkg.mod.sub"));
        assert!(matcher.matches("pkg.module9"));
        assert!(!matcher.matches("other.pkg.mod"));
    }

    #[test]
    fn test_module_spec_uses_module_name() {
        let module = ModuleHandle::new("tests.module5");
        let matcher = Matcher::compile(&module).unwrap();
        assert_eq!(matcher.as_str(), r"\Atests\.module5$");
        assert!(matcher.matches("tests.module5"));
        assert!(!matcher.matches("tests.module5x"));
    }

    #[test]
    fn test_compiled_passthrough_is_idempotent() {
        let matcher = Matcher::compile("pkg.*").unwrap();
        let source = matcher.as_str().to_string();
        let again = Matcher::compile(matcher).unwrap();
        assert_eq!(again.as_str(), source);
    }

    #[test]
    fn test_raw_pattern_not_end_anchored() {
        let matcher = Matcher::compile(NameSpec::Pattern(r"tests\.module\d".to_string())).unwrap();
        assert!(matcher.matches("tests.module1"));
        assert!(matcher.matches("tests.module12"), "no added end anchor");
        assert!(!matcher.matches("xtests.module1"), "anchored at the start");
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = Matcher::compile(NameSpec::Pattern("(unclosed".to_string())).unwrap_err();
        assert!(matches!(err, InterceptError::InvalidSpec(_)));
    }

    #[test]
    fn test_compile_all() {
        let matchers = Matcher::compile_all(["a", "b.*"]).unwrap();
        assert_eq!(matchers.len(), 2);
        assert!(matchers[0].matches("a"));
        assert!(matchers[1].matches("b.c"));
    }

    proptest! {
        /// A literal without `*` matches exactly itself, nothing else.
        #[test]
        fn prop_literal_exactness(name in "[a-zA-Z_][a-zA-Z0-9_.]{0,24}") {
            let matcher = Matcher::compile(name.as_str()).unwrap();
            prop_assert!(matcher.matches(&name));
            prop_assert!(!matcher.matches(&format!("{name}x")), "suffix must not match");
            prop_assert!(!matcher.matches(&format!("x{name}")), "prefix must not match");
        }

        /// Compiling the same input twice yields identical match sets.
        #[test]
        fn prop_compile_is_deterministic(
            spec in "[a-z][a-z0-9_.*]{0,16}",
            probe in "[a-z0-9_.]{0,20}",
        ) {
            let first = Matcher::compile(spec.as_str()).unwrap();
            let second = Matcher::compile(spec.as_str()).unwrap();
            prop_assert_eq!(first.matches(&probe), second.matches(&probe));
        }
    }
}
