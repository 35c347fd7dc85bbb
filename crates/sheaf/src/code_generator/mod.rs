//! Code generation for one output artifact
//!
//! The generator:
//! - Orders modules depth-first from the entries (topological where acyclic)
//! - Keys every module in a runtime registry by its root-relative path
//! - Renders each module as a lazily executed registry definition
//! - Wraps the registry in the universal loader shim of the output format

mod module_renderer;
mod runtime;
mod shim;

use std::path::Path;

use cow_utils::CowUtils;
use log::debug;
use serde::Serialize;

use crate::{
    config::{ExportMode, OutputOptions},
    error::{BundleError, BundleResult},
    module_graph::{DependencyGraph, ModuleId},
    types::{FxIndexMap, ModuleIdentity},
};
use module_renderer::{RenderContext, render_module};
use runtime::{Definition, Exposure, FactoryParts, render_factory_body};
use shim::LoaderShim;

/// Rendered size of one module inside the artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleComposition {
    pub key: String,
    pub bytes: usize,
}

/// Output of code generation, before post-processing
#[derive(Debug, Clone)]
pub struct GeneratedBundle {
    pub code: String,
    /// Modules in execution order
    pub modules: Vec<ModuleComposition>,
    pub externals: Vec<String>,
    /// Import cycles, by module key
    pub cycles: Vec<Vec<String>>,
}

/// Registry key of a module: its path relative to `root` with `/` separators
pub fn module_key(identity: &ModuleIdentity, root: &Path) -> String {
    match identity {
        ModuleIdentity::Path(path) => {
            let relative = path.strip_prefix(root).unwrap_or(path);
            relative
                .to_string_lossy()
                .cow_replace('\\', "/")
                .into_owned()
        }
        ModuleIdentity::Virtual(id) => format!("virtual:{id}"),
    }
}

#[derive(Debug)]
pub struct CodeGenerator<'a> {
    graph: &'a DependencyGraph,
    output: &'a OutputOptions,
    root: &'a Path,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(graph: &'a DependencyGraph, output: &'a OutputOptions, root: &'a Path) -> Self {
        Self {
            graph,
            output,
            root,
        }
    }

    pub fn generate(&self) -> BundleResult<GeneratedBundle> {
        let order = self.graph.execution_order();
        let keys = self.assign_keys(&order)?;
        let externals: Vec<String> = self.graph.externals().map(str::to_owned).collect();

        let context = RenderContext {
            graph: self.graph,
            keys: &keys,
        };
        let mut definitions = Vec::with_capacity(order.len());
        let mut modules = Vec::with_capacity(order.len());
        for (id, key) in &keys {
            let node = self
                .graph
                .module(*id)
                .ok_or_else(|| self.missing_module(*id))?;
            let definition = render_module(node, &context)?;
            debug!("Rendered {key} ({} bytes)", definition.len());
            modules.push(ModuleComposition {
                key: key.clone(),
                bytes: definition.len(),
            });
            definitions.push(Definition {
                key: key.clone(),
                code: definition,
                esm: node.record.format().is_esm(),
            });
        }

        let entries: Vec<String> = self
            .graph
            .entries()
            .iter()
            .map(|id| keys.get(id).cloned().ok_or_else(|| self.missing_module(*id)))
            .collect::<BundleResult<_>>()?;
        let exposure = self.exposure()?;

        let factory_body = render_factory_body(&FactoryParts {
            externals: &externals,
            definitions: &definitions,
            entries: &entries,
            exposure,
        });
        let code = LoaderShim::new(
            self.output.format,
            self.output.name.as_deref(),
            &externals,
            &self.output.globals,
        )
        .wrap(&factory_body);

        let cycles = self
            .graph
            .find_cycles()
            .into_iter()
            .map(|cycle| {
                cycle
                    .iter()
                    .filter_map(|id| keys.get(id).cloned())
                    .collect()
            })
            .collect();

        Ok(GeneratedBundle {
            code,
            modules,
            externals,
            cycles,
        })
    }

    /// Key every module in execution order; keys must not shadow externals
    fn assign_keys(&self, order: &[ModuleId]) -> BundleResult<FxIndexMap<ModuleId, String>> {
        let mut keys = FxIndexMap::default();
        for id in order {
            let node = self
                .graph
                .module(*id)
                .ok_or_else(|| self.missing_module(*id))?;
            let key = module_key(&node.record.identity, self.root);
            if self.graph.externals().any(|external| external == key) {
                return Err(BundleError::Generation {
                    identity: node.record.identity.clone(),
                    message: format!("module key '{key}' collides with an external of the same name"),
                });
            }
            keys.insert(*id, key);
        }
        Ok(keys)
    }

    /// Which value of the first entry the artifact exposes
    fn exposure(&self) -> BundleResult<Exposure> {
        let Some(node) = self.graph.entries().first().and_then(|id| self.graph.module(*id)) else {
            return Ok(Exposure::Exports);
        };
        if !node.record.format().is_esm() {
            return Ok(Exposure::Exports);
        }

        let surface = node.record.export_surface();
        match self.output.exports {
            ExportMode::Named => Ok(Exposure::Exports),
            ExportMode::Auto if surface.is_default_only() => Ok(Exposure::DefaultExport),
            ExportMode::Auto => Ok(Exposure::Exports),
            ExportMode::Default if surface.contains("default") => Ok(Exposure::DefaultExport),
            ExportMode::Default => Err(BundleError::Generation {
                identity: node.record.identity.clone(),
                message: "the entry has no default export to expose".to_owned(),
            }),
        }
    }

    fn missing_module(&self, id: ModuleId) -> BundleError {
        BundleError::Generation {
            identity: ModuleIdentity::Virtual(format!("{id:?}")),
            message: "module is referenced but not part of the graph".to_owned(),
        }
    }
}
