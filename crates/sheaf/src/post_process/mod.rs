//! Steps that run over a fully generated artifact
//!
//! Rewriting steps (minification) run in declared order and may replace the
//! artifact text. Reporting steps run after every rewriting step and only
//! ever see a shared reference to the artifact, so their position cannot
//! change the emitted bytes.

mod minify;
mod report;

use std::fmt;

use anyhow::Result;
use log::debug;

pub use minify::Minify;
pub use report::{BuildReport, ContentReport, GraphReport};

use crate::{
    code_generator::GeneratedBundle,
    error::{BundleError, BundleResult},
};

pub trait Rewriter: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Produce a behaviorally equivalent replacement for `code`
    fn rewrite(&self, code: &str) -> Result<String>;
}

pub trait Reporter: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn report(&self, bundle: &GeneratedBundle, report: &mut BuildReport);
}

#[derive(Debug, Default)]
pub struct PostProcessors {
    rewriters: Vec<Box<dyn Rewriter>>,
    reporters: Vec<Box<dyn Reporter>>,
}

impl PostProcessors {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in steps: optional minification, then the build report
    pub fn standard(minify: bool) -> Self {
        let mut steps = Self::new();
        if minify {
            steps.add_rewriter(Box::new(Minify));
        }
        steps.add_reporter(Box::new(GraphReport));
        steps.add_reporter(Box::new(ContentReport));
        steps
    }

    pub fn add_rewriter(&mut self, rewriter: Box<dyn Rewriter>) {
        self.rewriters.push(rewriter);
    }

    pub fn add_reporter(&mut self, reporter: Box<dyn Reporter>) {
        self.reporters.push(reporter);
    }

    pub fn run(&self, mut bundle: GeneratedBundle) -> BundleResult<(GeneratedBundle, BuildReport)> {
        for rewriter in &self.rewriters {
            let before = bundle.code.len();
            bundle.code = rewriter
                .rewrite(&bundle.code)
                .map_err(|e| BundleError::PostProcess {
                    step: rewriter.name().to_owned(),
                    message: format!("{e:#}"),
                })?;
            debug!(
                "Post-processor '{}' rewrote the artifact: {before} -> {} bytes",
                rewriter.name(),
                bundle.code.len()
            );
        }

        let mut report = BuildReport {
            minified: self.rewriters.iter().any(|r| r.name() == "minify"),
            ..BuildReport::default()
        };
        for reporter in &self.reporters {
            reporter.report(&bundle, &mut report);
        }
        Ok((bundle, report))
    }
}
