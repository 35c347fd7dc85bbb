//! Builds the dependency graph of one output by driving resolution, loading
//! and the transform chain from the entry points
//!
//! Traversal is breadth-first. Every identity is loaded and transformed
//! exactly once; the first importer to reach a module becomes its parent,
//! which is how error chains are reconstructed.

use std::collections::VecDeque;

use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::{
    error::{BundleError, BundleResult, ImportChain},
    loader::SourceLoader,
    module_graph::{DependencyGraph, EdgeTarget, ModuleId},
    module_record::{EMPTY_MODULE_ID, EMPTY_MODULE_SOURCE, ModuleRecord, Redirect},
    resolver::ModuleResolver,
    transforms::{TransformChain, TransformContext},
    types::{Dialect, ModuleIdentity, ResolvedTarget},
};

pub struct GraphBuilder<'a, L: SourceLoader> {
    resolver: ModuleResolver,
    loader: &'a L,
    chain: &'a TransformChain,
    graph: DependencyGraph,
    /// First importer of each module and the specifier it used
    parents: FxHashMap<ModuleId, (ModuleId, String)>,
    /// Sources of modules injected through redirects, by virtual id
    virtual_sources: FxHashMap<String, String>,
}

impl<'a, L: SourceLoader> GraphBuilder<'a, L> {
    pub fn new(resolver: ModuleResolver, loader: &'a L, chain: &'a TransformChain) -> Self {
        Self {
            resolver,
            loader,
            chain,
            graph: DependencyGraph::new(),
            parents: FxHashMap::default(),
            virtual_sources: FxHashMap::default(),
        }
    }

    /// Build the graph reachable from `entries`, in declared order
    pub fn build(mut self, entries: &[String]) -> BundleResult<DependencyGraph> {
        let mut queue = VecDeque::new();

        for specifier in entries {
            let identity = self.resolver.resolve_entry(specifier)?;
            let id = match self.graph.module_id(&identity) {
                Some(id) => id,
                None => {
                    let record = self.load_module(identity, &ImportChain::new())?;
                    let id = self.graph.add_module(record);
                    queue.push_back(id);
                    id
                }
            };
            self.graph.add_entry(id);
        }

        while let Some(id) = queue.pop_front() {
            self.process_dependencies(id, &mut queue)?;
        }

        for cycle in self.graph.find_cycles() {
            let members: Vec<String> = cycle
                .iter()
                .filter_map(|id| self.graph.module(*id))
                .map(|node| node.record.identity.to_string())
                .collect();
            warn!("Circular dependency detected: {}", members.join(" -> "));
        }

        self.graph.validate()?;
        Ok(self.graph)
    }

    fn process_dependencies(
        &mut self,
        id: ModuleId,
        queue: &mut VecDeque<ModuleId>,
    ) -> BundleResult<()> {
        let Some(node) = self.graph.module(id) else {
            return Ok(());
        };
        let importer = node.record.identity.clone();
        let outgoing: Vec<(String, Option<Redirect>)> = node
            .record
            .specifiers()
            .iter()
            .map(|specifier| (specifier.clone(), node.record.redirect(specifier).cloned()))
            .collect();

        for (specifier, redirect) in outgoing {
            let target = self
                .resolve_specifier(&specifier, redirect, &importer)
                .map_err(|e| e.with_chain(self.chain_to(id, &specifier)))?;

            let edge = match target {
                ResolvedTarget::External(name) => EdgeTarget::External(name),
                ResolvedTarget::Internal(identity) => {
                    if let Some(existing) = self.graph.module_id(&identity) {
                        EdgeTarget::Module(existing)
                    } else {
                        debug!("Discovered {identity} via '{specifier}' from {importer}");
                        let chain = self.chain_to(id, &specifier);
                        let record = self.load_module(identity, &chain)?;
                        let dep_id = self.graph.add_module(record);
                        self.parents.insert(dep_id, (id, specifier.clone()));
                        queue.push_back(dep_id);
                        EdgeTarget::Module(dep_id)
                    }
                }
            };
            self.graph.add_dependency(id, &specifier, edge);
        }
        Ok(())
    }

    /// Map a written specifier to its target, honoring externals first
    fn resolve_specifier(
        &mut self,
        specifier: &str,
        redirect: Option<Redirect>,
        importer: &ModuleIdentity,
    ) -> BundleResult<ResolvedTarget> {
        if self.resolver.is_external(specifier) {
            return Ok(ResolvedTarget::External(specifier.to_owned()));
        }

        match redirect {
            None => self.resolver.resolve(specifier, importer),
            Some(Redirect::Specifier(replacement)) => {
                debug!("'{specifier}' redirected to '{replacement}' in {importer}");
                self.resolver.resolve(&replacement, importer)
            }
            Some(Redirect::Empty) => {
                self.virtual_sources
                    .entry(EMPTY_MODULE_ID.to_owned())
                    .or_insert_with(|| EMPTY_MODULE_SOURCE.to_owned());
                Ok(ResolvedTarget::Internal(ModuleIdentity::Virtual(
                    EMPTY_MODULE_ID.to_owned(),
                )))
            }
            Some(Redirect::Virtual { id, source }) => {
                self.virtual_sources.entry(id.clone()).or_insert(source);
                Ok(ResolvedTarget::Internal(ModuleIdentity::Virtual(id)))
            }
        }
    }

    /// Load a module and run the full transform chain over it
    fn load_module(
        &self,
        identity: ModuleIdentity,
        chain: &ImportChain,
    ) -> BundleResult<ModuleRecord> {
        let virtual_source = match &identity {
            ModuleIdentity::Virtual(id) => self.virtual_sources.get(id).cloned(),
            ModuleIdentity::Path(_) => None,
        };
        let (source, dialect) = match virtual_source {
            Some(source) => (source, Dialect::JavaScript),
            None => {
                let loaded = self
                    .loader
                    .load(&identity)
                    .map_err(|source| BundleError::Load {
                        identity: identity.clone(),
                        source,
                        chain: chain.clone(),
                    })?;
                (loaded.source, loaded.dialect)
            }
        };

        let mut record = ModuleRecord::new(identity, dialect, source);
        let context = TransformContext {
            externals: self.resolver.externals(),
        };
        self.chain.run(&mut record, &context, chain)?;
        Ok(record)
    }

    /// Import chain from an entry point to `specifier` as written in `id`
    fn chain_to(&self, id: ModuleId, specifier: &str) -> ImportChain {
        let mut links = vec![(id, specifier.to_owned())];
        let mut current = id;
        while let Some((parent, parent_specifier)) = self.parents.get(&current) {
            links.push((*parent, parent_specifier.clone()));
            current = *parent;
        }

        let mut chain = ImportChain::new();
        for (module, specifier) in links.into_iter().rev() {
            if let Some(node) = self.graph.module(module) {
                chain.push(&node.record.identity, &specifier);
            }
        }
        chain
    }
}
