//! Pluggable per-module transforms
//!
//! A [`TransformChain`] applies its transforms to each module in declared
//! order. Every transform states which dialects it acts on; the chain never
//! hands a module to a transform that does not handle its dialect, so a
//! transform cannot touch modules it does not recognize.

use std::fmt;

use anyhow::Result;
use log::{debug, trace};
use serde::de::DeserializeOwned;

use crate::{
    config::TransformDescriptor,
    error::{BundleError, BundleResult, ImportChain},
    external::ExternalSet,
    module_record::ModuleRecord,
    types::Dialect,
};

pub mod builtins;
pub mod json;

pub use builtins::BuiltinsTransform;
pub use json::JsonTransform;

/// Read-only build state visible to transforms
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub externals: &'a ExternalSet,
}

pub trait Transform: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Whether the transform acts on modules of this dialect
    fn handles(&self, dialect: &Dialect) -> bool;

    /// Rewrite the module's source, dialect or redirects
    ///
    /// Specifier rewrites go through [`ModuleRecord::redirects`]; the
    /// specifier list itself is re-derived whenever the source changes.
    fn apply(&self, record: &mut ModuleRecord, context: &TransformContext<'_>) -> Result<()>;
}

const KNOWN_TRANSFORMS: &[&str] = &["json", "builtins"];

pub fn is_known(name: &str) -> bool {
    KNOWN_TRANSFORMS.contains(&name)
}

fn parse_options<T: DeserializeOwned>(descriptor: &TransformDescriptor) -> BundleResult<T> {
    toml::Value::Table(descriptor.options.clone())
        .try_into()
        .map_err(|e| {
            BundleError::Config(format!(
                "invalid options for transform '{}': {e}",
                descriptor.name
            ))
        })
}

/// Instantiate a built-in transform from its configuration
pub fn create(descriptor: &TransformDescriptor) -> BundleResult<Box<dyn Transform>> {
    match descriptor.name.as_str() {
        "json" => Ok(Box::new(JsonTransform::new(parse_options(descriptor)?))),
        "builtins" => Ok(Box::new(BuiltinsTransform::new(parse_options(descriptor)?))),
        other => Err(BundleError::Config(format!("unknown transform '{other}'"))),
    }
}

#[derive(Debug, Default)]
pub struct TransformChain {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptors(descriptors: &[TransformDescriptor]) -> BundleResult<Self> {
        let transforms = descriptors.iter().map(create).collect::<BundleResult<_>>()?;
        Ok(Self { transforms })
    }

    /// Append a transform to the end of the chain
    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.transforms.iter().map(|t| t.name())
    }

    /// Run every transform over `record` and leave it analyzed as JavaScript
    pub fn run(
        &self,
        record: &mut ModuleRecord,
        context: &TransformContext<'_>,
        chain: &ImportChain,
    ) -> BundleResult<()> {
        if record.dialect.is_javascript() {
            reanalyze(record, chain)?;
        }

        for (index, transform) in self.transforms.iter().enumerate() {
            if !transform.handles(&record.dialect) {
                trace!(
                    "Transform '{}' skips {} [{}]",
                    transform.name(),
                    record.identity,
                    record.dialect
                );
                continue;
            }

            let dialect_before = record.dialect.clone();
            let source_before = record.source.clone();

            transform
                .apply(record, context)
                .map_err(|e| BundleError::Transform {
                    transform: transform.name().to_owned(),
                    index,
                    identity: record.identity.clone(),
                    dialect: dialect_before.clone(),
                    message: format!("{e:#}"),
                    chain: chain.clone(),
                })?;
            debug!(
                "Applied transform '{}' (#{index}) to {}",
                transform.name(),
                record.identity
            );

            let changed = record.dialect != dialect_before || record.source != source_before;
            if changed && record.dialect.is_javascript() {
                reanalyze(record, chain)?;
            }
        }

        if !record.dialect.is_javascript() {
            return Err(BundleError::Transform {
                transform: "(chain)".to_owned(),
                index: self.transforms.len(),
                identity: record.identity.clone(),
                dialect: record.dialect.clone(),
                message: format!(
                    "no transform converts {} modules to JavaScript",
                    record.dialect
                ),
                chain: chain.clone(),
            });
        }
        Ok(())
    }
}

fn reanalyze(record: &mut ModuleRecord, chain: &ImportChain) -> BundleResult<()> {
    record.reanalyze().map_err(|e| BundleError::Parse {
        identity: record.identity.clone(),
        message: format!("{e:#}"),
        chain: chain.clone(),
    })
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{error::ErrorKind, module_record::Redirect, types::ModuleIdentity};

    /// Compiles `.upper` modules by lowercasing them, to exercise custom dialects
    #[derive(Debug)]
    struct Lowercase;

    impl Transform for Lowercase {
        fn name(&self) -> &str {
            "lowercase"
        }

        fn handles(&self, dialect: &Dialect) -> bool {
            matches!(dialect, Dialect::Custom(ext) if ext == "upper")
        }

        fn apply(&self, record: &mut ModuleRecord, _: &TransformContext<'_>) -> Result<()> {
            record.source = record.source.to_lowercase();
            record.dialect = Dialect::JavaScript;
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl Transform for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn handles(&self, _: &Dialect) -> bool {
            true
        }

        fn apply(&self, _: &mut ModuleRecord, _: &TransformContext<'_>) -> Result<()> {
            Err(anyhow!("boom"))
        }
    }

    fn record(dialect: Dialect, source: &str) -> ModuleRecord {
        ModuleRecord::new(
            ModuleIdentity::Virtual("test".to_owned()),
            dialect,
            source.to_owned(),
        )
    }

    #[test]
    fn test_custom_dialect_is_compiled_and_reanalyzed() -> BundleResult<()> {
        let externals = ExternalSet::none();
        let context = TransformContext {
            externals: &externals,
        };
        let mut chain = TransformChain::new();
        chain.push(Box::new(Lowercase));

        let mut module = record(
            Dialect::Custom("upper".to_owned()),
            "IMPORT X FROM './DEP';",
        );
        chain.run(&mut module, &context, &ImportChain::new())?;

        assert_eq!(module.dialect, Dialect::JavaScript);
        assert_eq!(module.source, "import x from './dep';");
        assert_eq!(module.specifiers(), ["./dep".to_owned()]);
        Ok(())
    }

    #[test]
    fn test_unconverted_dialect_fails() {
        let externals = ExternalSet::none();
        let context = TransformContext {
            externals: &externals,
        };
        let chain = TransformChain::new();

        let mut module = record(Dialect::Custom("coffee".to_owned()), "x = 1");
        let err = chain
            .run(&mut module, &context, &ImportChain::new())
            .expect_err("coffee is not JavaScript");
        assert_eq!(err.kind(), ErrorKind::Transform);
    }

    #[test]
    fn test_pass_through_for_unhandled_dialects() -> BundleResult<()> {
        let externals = ExternalSet::none();
        let context = TransformContext {
            externals: &externals,
        };
        let mut chain = TransformChain::new();
        chain.push(Box::new(Lowercase));
        chain.push(Box::new(JsonTransform::default()));

        let source = "import A from './B'; export default A;";
        let mut module = record(Dialect::JavaScript, source);
        chain.run(&mut module, &context, &ImportChain::new())?;

        assert_eq!(module.source, source);
        assert_eq!(module.specifiers(), ["./B".to_owned()]);
        assert!(module.redirects.is_empty());
        Ok(())
    }

    #[test]
    fn test_failure_carries_transform_identity() {
        let externals = ExternalSet::none();
        let context = TransformContext {
            externals: &externals,
        };
        let mut chain = TransformChain::new();
        chain.push(Box::new(Lowercase));
        chain.push(Box::new(Failing));

        let mut module = record(Dialect::JavaScript, "export const a = 1;");
        match chain.run(&mut module, &context, &ImportChain::new()) {
            Err(BundleError::Transform {
                transform,
                index,
                dialect,
                message,
                ..
            }) => {
                assert_eq!(transform, "failing");
                assert_eq!(index, 1);
                assert_eq!(dialect, Dialect::JavaScript);
                assert_eq!(message, "boom");
            }
            other => panic!("expected a transform error, got {other:?}"),
        }
    }

    #[test]
    fn test_redirects_survive_reanalysis() -> BundleResult<()> {
        let externals = ExternalSet::none();
        let context = TransformContext {
            externals: &externals,
        };
        let chain = TransformChain::from_descriptors(&[TransformDescriptor::named("builtins")])?;
        assert_eq!(chain.names().collect::<Vec<_>>(), vec!["builtins"]);

        let mut module = record(Dialect::JavaScript, "import fs from 'fs';");
        chain.run(&mut module, &context, &ImportChain::new())?;
        assert_eq!(module.redirect("fs"), Some(&Redirect::Empty));
        Ok(())
    }

    #[test]
    fn test_unknown_transform_and_bad_options() {
        assert!(TransformChain::from_descriptors(&[TransformDescriptor::named("coffee")]).is_err());

        let mut descriptor = TransformDescriptor::named("json");
        descriptor
            .options
            .insert("named_exports".to_owned(), toml::Value::String("yes".to_owned()));
        let err = create(&descriptor).expect_err("named_exports must be a bool");
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
