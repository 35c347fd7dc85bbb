//! Per-module state carried through the pipeline

use anyhow::Result;

use crate::{
    analyzer::{self, ModuleAnalysis},
    types::{Dialect, ExportSurface, FxIndexMap, ModuleFormat, ModuleIdentity},
};

/// Replacement for a specifier, installed by a transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// Resolve this specifier instead, from the same importer
    Specifier(String),
    /// An injected module whose exports are an empty object
    Empty,
    /// An injected module with the given id and source
    Virtual { id: String, source: String },
}

/// Id of the shared virtual module standing in for [`Redirect::Empty`]
pub const EMPTY_MODULE_ID: &str = "empty";

/// Source of the shared empty virtual module
pub const EMPTY_MODULE_SOURCE: &str = "module.exports = {};\n";

/// A module as discovered, transformed and analyzed
///
/// Records are created by the graph builder on first encounter of an
/// identity, mutated by the transform chain during its single pass, and
/// read-only once the graph owns them.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    pub identity: ModuleIdentity,
    pub dialect: Dialect,
    pub raw_source: String,
    /// Source after the transform chain
    pub source: String,
    /// Written specifier to its replacement
    pub redirects: FxIndexMap<String, Redirect>,
    analysis: ModuleAnalysis,
}

impl ModuleRecord {
    pub fn new(identity: ModuleIdentity, dialect: Dialect, raw_source: String) -> Self {
        Self {
            identity,
            dialect,
            source: raw_source.clone(),
            raw_source,
            redirects: FxIndexMap::default(),
            analysis: ModuleAnalysis::default(),
        }
    }

    /// Outgoing specifiers as written, in source order
    ///
    /// Empty until the record's source has been analyzed as JavaScript.
    pub fn specifiers(&self) -> &[String] {
        &self.analysis.specifiers
    }

    pub fn analysis(&self) -> &ModuleAnalysis {
        &self.analysis
    }

    pub fn format(&self) -> ModuleFormat {
        self.analysis.format()
    }

    pub fn export_surface(&self) -> ExportSurface {
        self.analysis.export_surface()
    }

    /// Re-derive specifiers, bindings and edits from the current source
    pub(crate) fn reanalyze(&mut self) -> Result<()> {
        self.analysis = analyzer::analyze(&self.source)?;
        Ok(())
    }

    /// The redirect installed for a written specifier, if any
    pub fn redirect(&self, specifier: &str) -> Option<&Redirect> {
        self.redirects.get(specifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_starts_untransformed() {
        let record = ModuleRecord::new(
            ModuleIdentity::Virtual("x".to_owned()),
            Dialect::JavaScript,
            "import './a';".to_owned(),
        );
        assert_eq!(record.source, record.raw_source);
        assert!(record.specifiers().is_empty());
        assert!(record.redirect("./a").is_none());
    }

    #[test]
    fn test_reanalyze_discovers_specifiers() -> Result<()> {
        let mut record = ModuleRecord::new(
            ModuleIdentity::Virtual("x".to_owned()),
            Dialect::JavaScript,
            "import './a'; const b = require('b');".to_owned(),
        );
        record.reanalyze()?;
        assert_eq!(record.specifiers(), ["./a".to_owned(), "b".to_owned()]);
        assert_eq!(record.format(), ModuleFormat::Esm);
        assert_eq!(record.export_surface(), ExportSurface::Named(Vec::new()));
        Ok(())
    }
}
