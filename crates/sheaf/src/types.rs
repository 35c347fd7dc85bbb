//! Shared type definitions for the sheaf crate
//!
//! This module contains common types that are used across multiple components
//! of the bundler, ensuring consistency and avoiding circular dependencies.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxBuildHasher;
use serde::Serialize;

/// Type alias for FxHasher-based IndexMap
pub type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Type alias for FxHasher-based IndexSet
pub type FxIndexSet<T> = IndexSet<T, FxBuildHasher>;

/// Canonical identity of a module that takes part in the bundle
///
/// Two specifiers that resolve to the same identity always map to a single
/// node in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleIdentity {
    /// A file on disk, stored as a canonical absolute path
    Path(PathBuf),
    /// A module injected by a transform (shims, stubs)
    Virtual(String),
}

impl ModuleIdentity {
    /// Directory used as the base for relative specifiers issued by this module
    pub fn directory(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => path.parent(),
            Self::Virtual(_) => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Virtual(_) => None,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual(_))
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Virtual(id) => write!(f, "virtual:{id}"),
        }
    }
}

/// Outcome of resolving a specifier from an importer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolvedTarget {
    /// A module that is loaded, transformed and inlined into the bundle
    Internal(ModuleIdentity),
    /// A module supplied by the host at load time; never loaded
    External(String),
}

impl ResolvedTarget {
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

/// Source syntax of a module, derived from its file extension
///
/// The dialect says nothing about the packaging format (ES module versus
/// CommonJS); see [`ModuleFormat`] for that.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dialect {
    JavaScript,
    Json,
    /// Any other extension, e.g. `coffee`; only bundleable through a transform
    Custom(String),
}

impl Dialect {
    /// Derive the dialect from a file extension (with or without the leading dot)
    pub fn from_extension(extension: &str) -> Self {
        let extension = extension.trim_start_matches('.');
        match extension {
            "js" | "mjs" | "cjs" | "jsx" => Self::JavaScript,
            "json" => Self::Json,
            other => Self::Custom(other.to_owned()),
        }
    }

    /// Derive the dialect from a path; extensionless files are JavaScript
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(Self::JavaScript, Self::from_extension)
    }

    pub fn is_javascript(&self) -> bool {
        matches!(self, Self::JavaScript)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JavaScript => write!(f, "javascript"),
            Self::Json => write!(f, "json"),
            Self::Custom(ext) => write!(f, "{ext}"),
        }
    }
}

/// Packaging format of a JavaScript module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    /// Uses `import`/`export` declarations
    Esm,
    /// Uses `require`/`module.exports`, or is a plain script
    CommonJs,
}

impl ModuleFormat {
    pub fn is_esm(&self) -> bool {
        matches!(self, Self::Esm)
    }
}

/// Names a module makes available to its importers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExportSurface {
    /// Statically known export names, in declaration order
    Named(Vec<String>),
    /// Only known at runtime (CommonJS, `export *`)
    #[default]
    Dynamic,
}

impl ExportSurface {
    /// Whether the only statically known export is `default`
    pub fn is_default_only(&self) -> bool {
        matches!(self, Self::Named(names) if names.len() == 1 && names[0] == "default")
    }

    pub fn contains(&self, name: &str) -> bool {
        match self {
            Self::Named(names) => names.iter().any(|n| n == name),
            Self::Dynamic => true,
        }
    }
}
