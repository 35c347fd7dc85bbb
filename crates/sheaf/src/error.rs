//! Error taxonomy for a bundle build
//!
//! Every error is fatal to the build that raised it. Errors that concern a
//! particular module carry the [`ImportChain`] leading from an entry point to
//! that module, so diagnostics can point at the exact edge that failed.

use std::{fmt, io, path::PathBuf};

use serde::Serialize;

use crate::types::{Dialect, ModuleIdentity};

/// One hop of an import chain: `importer` wrote `specifier`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainLink {
    pub importer: String,
    pub specifier: String,
}

/// Sequence of import edges from an entry point to a module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ImportChain(Vec<ChainLink>);

impl ImportChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, importer: &ModuleIdentity, specifier: &str) {
        self.0.push(ChainLink {
            importer: importer.to_string(),
            specifier: specifier.to_owned(),
        });
    }

    pub fn links(&self) -> &[ChainLink] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ImportChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(entry point)");
        }
        for (i, link) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{} imports '{}'", link.importer, link.specifier)?;
        }
        Ok(())
    }
}

/// Coarse classification of a [`BundleError`], stable for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Resolution,
    Load,
    Transform,
    Parse,
    Generation,
    PostProcess,
    Output,
    Config,
}

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("cannot resolve '{specifier}' from {importer} (via {chain})")]
    Resolution {
        specifier: String,
        importer: String,
        chain: ImportChain,
    },

    #[error("cannot load {identity} (via {chain}): {source}")]
    Load {
        identity: ModuleIdentity,
        #[source]
        source: io::Error,
        chain: ImportChain,
    },

    #[error(
        "transform '{transform}' (#{index}) failed on {identity} [{dialect}] (via {chain}): {message}"
    )]
    Transform {
        transform: String,
        index: usize,
        identity: ModuleIdentity,
        dialect: Dialect,
        message: String,
        chain: ImportChain,
    },

    #[error("cannot parse {identity} (via {chain}): {message}")]
    Parse {
        identity: ModuleIdentity,
        message: String,
        chain: ImportChain,
    },

    #[error("cannot generate code for {identity}: {message}")]
    Generation {
        identity: ModuleIdentity,
        message: String,
    },

    #[error("post-processing step '{step}' failed: {message}")]
    PostProcess { step: String, message: String },

    #[error("cannot write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BundleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Resolution { .. } => ErrorKind::Resolution,
            Self::Load { .. } => ErrorKind::Load,
            Self::Transform { .. } => ErrorKind::Transform,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Generation { .. } => ErrorKind::Generation,
            Self::PostProcess { .. } => ErrorKind::PostProcess,
            Self::Output { .. } => ErrorKind::Output,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Module the error is attributed to, if any
    pub fn identity(&self) -> Option<String> {
        match self {
            Self::Resolution { importer, .. } => Some(importer.clone()),
            Self::Load { identity, .. }
            | Self::Transform { identity, .. }
            | Self::Parse { identity, .. }
            | Self::Generation { identity, .. } => Some(identity.to_string()),
            Self::Output { path, .. } => Some(path.display().to_string()),
            Self::PostProcess { .. } | Self::Config(_) => None,
        }
    }

    pub fn chain(&self) -> Option<&ImportChain> {
        match self {
            Self::Resolution { chain, .. }
            | Self::Load { chain, .. }
            | Self::Transform { chain, .. }
            | Self::Parse { chain, .. } => Some(chain),
            _ => None,
        }
    }

    /// Replace the import chain of a module-scoped error
    #[must_use]
    pub fn with_chain(mut self, new_chain: ImportChain) -> Self {
        match &mut self {
            Self::Resolution { chain, .. }
            | Self::Load { chain, .. }
            | Self::Transform { chain, .. }
            | Self::Parse { chain, .. } => *chain = new_chain,
            _ => {}
        }
        self
    }
}

pub type BundleResult<T> = Result<T, BundleError>;
