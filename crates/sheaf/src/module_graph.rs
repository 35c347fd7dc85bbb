//! Dependency graph of the modules that make up one bundle
//!
//! Nodes are deduplicated by [`ModuleIdentity`]: however many specifiers
//! reach a module, it has exactly one [`ModuleId`]. Edges run from importer
//! to imported module; edges to externals are kept per module but never
//! become nodes. Cycles are legal.

use log::debug;
use petgraph::{
    algo::{is_cyclic_directed, tarjan_scc},
    graph::{DiGraph, NodeIndex},
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    error::{BundleError, BundleResult},
    module_record::ModuleRecord,
    types::{FxIndexMap, FxIndexSet, ModuleIdentity},
};

/// Unique identifier for a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

impl ModuleId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the underlying u32 value of the ModuleId
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a written specifier leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeTarget {
    Module(ModuleId),
    External(String),
}

#[derive(Debug)]
pub struct ModuleNode {
    pub id: ModuleId,
    pub record: ModuleRecord,
    /// Written specifier to its target, in source order
    pub dependencies: FxIndexMap<String, EdgeTarget>,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    modules: Vec<ModuleNode>,
    identities: FxHashMap<ModuleIdentity, ModuleId>,
    /// Petgraph for cycle detection; edges go from importer to imported
    graph: DiGraph<ModuleId, ()>,
    node_indices: FxHashMap<ModuleId, NodeIndex>,
    entries: Vec<ModuleId>,
    externals: FxIndexSet<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, or return the existing id for its identity
    pub fn add_module(&mut self, record: ModuleRecord) -> ModuleId {
        if let Some(&existing) = self.identities.get(&record.identity) {
            return existing;
        }

        let id = ModuleId::new(self.modules.len() as u32);
        debug!("Registered module {} as {id:?}", record.identity);
        self.identities.insert(record.identity.clone(), id);
        let node_idx = self.graph.add_node(id);
        self.node_indices.insert(id, node_idx);
        self.modules.push(ModuleNode {
            id,
            record,
            dependencies: FxIndexMap::default(),
        });
        id
    }

    pub fn add_entry(&mut self, id: ModuleId) {
        if !self.entries.contains(&id) {
            self.entries.push(id);
        }
    }

    /// Record that `from` reaches `target` through `specifier`
    pub fn add_dependency(&mut self, from: ModuleId, specifier: &str, target: EdgeTarget) {
        match &target {
            EdgeTarget::Module(to) => {
                if let (Some(&from_idx), Some(&to_idx)) =
                    (self.node_indices.get(&from), self.node_indices.get(to))
                    && !self.graph.contains_edge(from_idx, to_idx)
                {
                    self.graph.add_edge(from_idx, to_idx, ());
                }
            }
            EdgeTarget::External(name) => {
                self.externals.insert(name.clone());
            }
        }
        if let Some(node) = self.modules.get_mut(from.index()) {
            node.dependencies.insert(specifier.to_owned(), target);
        }
    }

    pub fn module_id(&self, identity: &ModuleIdentity) -> Option<ModuleId> {
        self.identities.get(identity).copied()
    }

    pub fn module(&self, id: ModuleId) -> Option<&ModuleNode> {
        self.modules.get(id.index())
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn entries(&self) -> &[ModuleId] {
        &self.entries
    }

    /// External names referenced anywhere in the graph, in discovery order
    pub fn externals(&self) -> impl Iterator<Item = &str> {
        self.externals.iter().map(String::as_str)
    }

    /// Modules in depth-first post-order from the entries
    ///
    /// Dependencies are followed in source order, which yields a topological
    /// order for acyclic graphs and first-discovery order inside cycles.
    pub fn execution_order(&self) -> Vec<ModuleId> {
        let mut order = Vec::with_capacity(self.modules.len());
        let mut visited = FxHashSet::default();

        for &entry in &self.entries {
            if !visited.insert(entry) {
                continue;
            }
            // (module, index of the next dependency to look at)
            let mut stack = vec![(entry, 0usize)];
            while let Some((current, next)) = stack.pop() {
                let next_dependency = self
                    .module(current)
                    .and_then(|node| node.dependencies.get_index(next))
                    .map(|(_, target)| target);

                match next_dependency {
                    Some(target) => {
                        stack.push((current, next + 1));
                        if let EdgeTarget::Module(dep) = target
                            && visited.insert(*dep)
                        {
                            stack.push((*dep, 0));
                        }
                    }
                    None => order.push(current),
                }
            }
        }
        order
    }

    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Import cycles, each listed in execution order
    ///
    /// Includes modules that import themselves.
    pub fn find_cycles(&self) -> Vec<Vec<ModuleId>> {
        let position: FxHashMap<ModuleId, usize> = self
            .execution_order()
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();

        let mut cycles: Vec<Vec<ModuleId>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1 || self.graph.contains_edge(component[0], component[0])
            })
            .map(|component| {
                let mut members: Vec<ModuleId> =
                    component.into_iter().map(|idx| self.graph[idx]).collect();
                members.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
                members
            })
            .collect();
        cycles.sort_by_key(|members| position.get(&members[0]).copied().unwrap_or(usize::MAX));
        cycles
    }

    /// Check that every edge leads to a module in the graph or a declared external
    pub fn validate(&self) -> BundleResult<()> {
        for node in &self.modules {
            for (specifier, target) in &node.dependencies {
                let valid = match target {
                    EdgeTarget::Module(id) => self.module(*id).is_some(),
                    EdgeTarget::External(name) => self.externals.contains(name),
                };
                if !valid {
                    return Err(BundleError::Generation {
                        identity: node.record.identity.clone(),
                        message: format!("dangling dependency edge for '{specifier}'"),
                    });
                }
            }
        }
        if let Some(missing) = self.entries.iter().find(|id| self.module(**id).is_none()) {
            return Err(BundleError::Generation {
                identity: ModuleIdentity::Virtual(format!("{missing:?}")),
                message: "entry is not part of the graph".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::Dialect;

    fn record(name: &str) -> ModuleRecord {
        ModuleRecord::new(
            ModuleIdentity::Virtual(name.to_owned()),
            Dialect::JavaScript,
            String::new(),
        )
    }

    #[test]
    fn test_dedup_by_identity() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_module(record("a"));
        let again = graph.add_module(record("a"));
        assert_eq!(a, again);
        assert_eq!(graph.len(), 1);
        assert_eq!(
            graph.module_id(&ModuleIdentity::Virtual("a".to_owned())),
            Some(a)
        );
    }

    #[test]
    fn test_execution_order_is_post_order() {
        // main -> a -> c, main -> b -> c
        let mut graph = DependencyGraph::new();
        let main = graph.add_module(record("main"));
        let a = graph.add_module(record("a"));
        let b = graph.add_module(record("b"));
        let c = graph.add_module(record("c"));
        graph.add_entry(main);
        graph.add_dependency(main, "./a", EdgeTarget::Module(a));
        graph.add_dependency(main, "./b", EdgeTarget::Module(b));
        graph.add_dependency(main, "fontkit", EdgeTarget::External("fontkit".to_owned()));
        graph.add_dependency(a, "./c", EdgeTarget::Module(c));
        graph.add_dependency(b, "./c", EdgeTarget::Module(c));

        assert_eq!(graph.execution_order(), vec![c, a, b, main]);
        assert!(!graph.has_cycles());
        assert!(graph.find_cycles().is_empty());
        assert_eq!(graph.externals().collect::<Vec<_>>(), vec!["fontkit"]);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_cycles_are_reported_in_execution_order() {
        // main -> a <-> b, and c imports itself
        let mut graph = DependencyGraph::new();
        let main = graph.add_module(record("main"));
        let a = graph.add_module(record("a"));
        let b = graph.add_module(record("b"));
        let c = graph.add_module(record("c"));
        graph.add_entry(main);
        graph.add_dependency(main, "./a", EdgeTarget::Module(a));
        graph.add_dependency(a, "./b", EdgeTarget::Module(b));
        graph.add_dependency(b, "./a", EdgeTarget::Module(a));
        graph.add_dependency(main, "./c", EdgeTarget::Module(c));
        graph.add_dependency(c, "./c", EdgeTarget::Module(c));

        assert!(graph.has_cycles());
        assert_eq!(graph.execution_order(), vec![b, a, c, main]);
        assert_eq!(graph.find_cycles(), vec![vec![b, a], vec![c]]);
    }

    #[test]
    fn test_validate_rejects_dangling_edges() {
        let mut graph = DependencyGraph::new();
        let main = graph.add_module(record("main"));
        graph.add_entry(main);
        graph.add_dependency(main, "./ghost", EdgeTarget::Module(ModuleId::new(7)));
        assert!(graph.validate().is_err());
    }
}
