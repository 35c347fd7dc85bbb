//! Drives a whole build: one graph, one generated artifact and one report per
//! configured output
//!
//! Output groups are built independently, each with its own resolver and
//! external set, so externals of one output never leak into another. Nothing
//! is written to disk unless every group succeeded.

use std::{
    fs,
    path::{Path, PathBuf},
    thread,
};

use log::{debug, info};

use crate::{
    code_generator::CodeGenerator,
    config::{OutputOptions, PipelineConfig},
    error::{BundleError, BundleResult},
    graph_builder::GraphBuilder,
    loader::{FsLoader, SourceLoader},
    post_process::{BuildReport, PostProcessors},
    resolver::ModuleResolver,
    transforms::{Transform, TransformChain},
};

/// An artifact built in memory, not yet written
#[derive(Debug, Clone)]
pub struct BuiltOutput {
    pub file: PathBuf,
    pub code: String,
    pub report: BuildReport,
}

#[derive(Debug)]
pub struct BundleOrchestrator<L = FsLoader> {
    config: PipelineConfig,
    chain: TransformChain,
    post_processors: PostProcessors,
    loader: L,
}

impl BundleOrchestrator<FsLoader> {
    /// Validate `config` and set up the configured transforms and post-processors
    pub fn new(config: PipelineConfig) -> BundleResult<Self> {
        config.validate()?;
        let chain = TransformChain::from_descriptors(&config.transforms)?;
        debug!(
            "Transform chain: [{}]",
            chain.names().collect::<Vec<_>>().join(", ")
        );
        let post_processors = PostProcessors::standard(config.minify);
        Ok(Self {
            config,
            chain,
            post_processors,
            loader: FsLoader,
        })
    }
}

impl<L: SourceLoader + Sync> BundleOrchestrator<L> {
    /// Read module sources through `loader` instead of the filesystem
    pub fn with_loader<M: SourceLoader + Sync>(self, loader: M) -> BundleOrchestrator<M> {
        BundleOrchestrator {
            config: self.config,
            chain: self.chain,
            post_processors: self.post_processors,
            loader,
        }
    }

    /// Append a transform after the configured ones
    #[must_use]
    pub fn with_transform(mut self, transform: Box<dyn Transform>) -> Self {
        self.chain.push(transform);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build one output group in memory
    pub fn build_output(&self, output: &OutputOptions) -> BundleResult<BuiltOutput> {
        let externals = self.config.externals_for(output)?;
        let resolver = ModuleResolver::new(&self.config, externals);
        let root = resolver.root().to_path_buf();

        let graph = GraphBuilder::new(resolver, &self.loader, &self.chain).build(&output.entries)?;
        debug!(
            "Graph for {} has {} modules and {} externals",
            output.file.display(),
            graph.len(),
            graph.externals().count()
        );

        let bundle = CodeGenerator::new(&graph, output, &root).generate()?;
        let (bundle, mut report) = self.post_processors.run(bundle)?;

        let file = self.config.root.join(&output.file);
        report.file = Some(file.clone());
        Ok(BuiltOutput {
            file,
            code: bundle.code,
            report,
        })
    }

    /// Build every output group; the first failure in declared order wins
    pub fn build(&self) -> BundleResult<Vec<BuiltOutput>> {
        let outputs = &self.config.outputs;
        if outputs.len() <= 1 {
            return outputs.iter().map(|output| self.build_output(output)).collect();
        }

        thread::scope(|scope| {
            let handles: Vec<_> = outputs
                .iter()
                .map(|output| scope.spawn(move || self.build_output(output)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
                })
                .collect()
        })
    }

    /// Write built artifacts, creating parent directories as needed
    pub fn write(&self, built: &[BuiltOutput]) -> BundleResult<()> {
        for output in built {
            write_artifact(&output.file, &output.code)?;
            info!(
                "Wrote {} ({} bytes, {} gzipped)",
                output.file.display(),
                output.report.bytes,
                output.report.gzip_bytes
            );
        }
        Ok(())
    }

    /// Build every output and write them only if all succeeded
    pub fn bundle(&self) -> BundleResult<Vec<BuildReport>> {
        let built = self.build()?;
        self.write(&built)?;
        Ok(built.into_iter().map(|output| output.report).collect())
    }
}

fn write_artifact(path: &Path, code: &str) -> BundleResult<()> {
    let to_error = |source| BundleError::Output {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(to_error)?;
    }
    fs::write(path, code).map_err(to_error)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::TempDir;

    use super::*;
    use crate::error::ErrorKind;

    fn project(files: &[(&str, &str)]) -> Result<TempDir> {
        let temp_dir = TempDir::new()?;
        for (path, content) in files {
            let path = temp_dir.path().join(path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, content)?;
        }
        Ok(temp_dir)
    }

    fn config_for(root: &Path, outputs: Vec<OutputOptions>) -> PipelineConfig {
        PipelineConfig {
            root: root.to_path_buf(),
            outputs,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_outputs_are_independent() -> Result<()> {
        let temp_dir = project(&[
            ("a.js", "import f from 'fontkit'; export default f;"),
            ("b.js", "export default 1;"),
            ("node_modules/fontkit/index.js", "module.exports = 'inlined';"),
        ])?;
        let mut with_external = OutputOptions::new(vec!["a.js".to_owned()], "dist/a.js");
        with_external.external = vec!["fontkit".to_owned()];
        let inlined = OutputOptions::new(vec!["a.js".to_owned(), "b.js".to_owned()], "dist/ab.js");

        let orchestrator =
            BundleOrchestrator::new(config_for(temp_dir.path(), vec![with_external, inlined]))?;
        let built = orchestrator.build()?;

        assert_eq!(built[0].report.externals, vec!["fontkit".to_owned()]);
        assert!(!built[0].code.contains("'inlined'"));
        assert!(built[1].report.externals.is_empty());
        assert!(built[1].code.contains("'inlined'"));
        assert_eq!(built[1].report.module_count, 3);
        Ok(())
    }

    #[test]
    fn test_nothing_written_on_failure() -> Result<()> {
        let temp_dir = project(&[("ok.js", "export default 1;"), ("bad.js", "import './nope';")])?;
        let orchestrator = BundleOrchestrator::new(config_for(
            temp_dir.path(),
            vec![
                OutputOptions::new(vec!["ok.js".to_owned()], "dist/ok.js"),
                OutputOptions::new(vec!["bad.js".to_owned()], "dist/bad.js"),
            ],
        ))?;

        let err = orchestrator.bundle().expect_err("bad.js has a missing import");
        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert!(!temp_dir.path().join("dist").exists());
        Ok(())
    }

    #[test]
    fn test_bundle_writes_artifact() -> Result<()> {
        let temp_dir = project(&[("main.js", "module.exports = 42;")])?;
        let mut config = config_for(
            temp_dir.path(),
            vec![OutputOptions::new(vec!["main.js".to_owned()], "out/bundle.js")],
        );
        config.minify = true;
        let reports = BundleOrchestrator::new(config)?.bundle()?;

        let written = fs::read_to_string(temp_dir.path().join("out/bundle.js"))?;
        assert_eq!(reports[0].bytes, written.len());
        assert!(reports[0].minified);
        Ok(())
    }

    #[test]
    fn test_invalid_config_is_rejected_up_front() {
        let err = BundleOrchestrator::new(PipelineConfig::default()).expect_err("no outputs");
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
