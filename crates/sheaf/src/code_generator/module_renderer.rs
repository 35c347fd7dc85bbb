//! Wraps one module's transformed source in a registry definition
//!
//! CommonJS modules keep their source and get the usual
//! `(module, exports, require)` wrapper; only `require` arguments are
//! rewritten to registry keys. ES modules are lowered: exports become getters
//! installed before any dependency runs, imports become a preamble of
//! registry lookups, and each reference to an imported binding becomes a
//! property read on the dependency's exports object at the reference site.

use std::fmt::Write as _;

use crate::{
    analyzer::{self, ImportBinding, ReExport, ReferenceContext, TextEdit},
    error::{BundleError, BundleResult},
    module_graph::{DependencyGraph, EdgeTarget, ModuleId, ModuleNode},
    module_record::ModuleRecord,
    names::{self, NameAllocator},
    types::{ExportSurface, FxIndexMap},
};

/// Graph-wide lookups shared by every rendered module
#[derive(Debug)]
pub(crate) struct RenderContext<'a> {
    pub graph: &'a DependencyGraph,
    pub keys: &'a FxIndexMap<ModuleId, String>,
}

enum DependencyKind<'a> {
    Esm(&'a ModuleRecord),
    CommonJs,
    External,
}

struct Dependency<'a> {
    key: &'a str,
    kind: DependencyKind<'a>,
}

impl Dependency<'_> {
    /// Whether importers see the dependency through an interop view
    fn needs_interop(&self) -> bool {
        !matches!(self.kind, DependencyKind::Esm(_))
    }
}

impl<'a> RenderContext<'a> {
    fn dependency(&self, node: &'a ModuleNode, specifier: &str) -> BundleResult<Dependency<'a>> {
        let missing = || BundleError::Generation {
            identity: node.record.identity.clone(),
            message: format!("no dependency edge for '{specifier}'"),
        };
        match node.dependencies.get(specifier).ok_or_else(missing)? {
            EdgeTarget::External(name) => Ok(Dependency {
                key: name,
                kind: DependencyKind::External,
            }),
            EdgeTarget::Module(id) => {
                let dep = self.graph.module(*id).ok_or_else(missing)?;
                let key = self.keys.get(id).ok_or_else(missing)?;
                let kind = if dep.record.format().is_esm() {
                    DependencyKind::Esm(&dep.record)
                } else {
                    DependencyKind::CommonJs
                };
                Ok(Dependency { key, kind })
            }
        }
    }
}

/// Render the registry definition of `node`
pub(crate) fn render_module(node: &ModuleNode, context: &RenderContext<'_>) -> BundleResult<String> {
    if node.record.format().is_esm() {
        render_esm(node, context)
    } else {
        render_commonjs(node, context)
    }
}

/// Edits pointing every `require('x')` argument at the registry key of `x`
fn require_edits(node: &ModuleNode, context: &RenderContext<'_>) -> BundleResult<Vec<TextEdit>> {
    let analysis = node.record.analysis();
    let mut edits = Vec::with_capacity(analysis.requires.len());
    for call in &analysis.requires {
        let dependency = context.dependency(node, &call.specifier)?;
        edits.push(TextEdit::replace(
            call.argument.start,
            call.argument.end,
            names::js_string(dependency.key),
        ));
    }
    Ok(edits)
}

fn render_commonjs(node: &ModuleNode, context: &RenderContext<'_>) -> BundleResult<String> {
    let mut edits = node.record.analysis().edits.clone();
    edits.extend(require_edits(node, context)?);
    let body = analyzer::apply_edits(&node.record.source, &mut edits);
    Ok(format!(
        "function (module, exports, require) {{\n{}\n}}",
        body.trim_end()
    ))
}

/// Fail when an ES module dependency statically lacks an imported name
fn check_imported_name(
    node: &ModuleNode,
    dependency: &Dependency<'_>,
    imported: &str,
) -> BundleResult<()> {
    let DependencyKind::Esm(record) = dependency.kind else {
        return Ok(());
    };
    match record.export_surface() {
        ExportSurface::Named(exported) if !exported.iter().any(|name| name == imported) => {
            Err(BundleError::Generation {
                identity: node.record.identity.clone(),
                message: format!("'{imported}' is not exported by {}", record.identity),
            })
        }
        _ => Ok(()),
    }
}

fn binding_access(binding: &ImportBinding, namespace: &str) -> String {
    match binding {
        ImportBinding::Default { .. } => names::property_access(namespace, "default"),
        ImportBinding::Namespace { .. } => namespace.to_owned(),
        ImportBinding::Named { imported, .. } => names::property_access(namespace, imported),
    }
}

/// Identifier stem for the namespace variable of `specifier`
fn specifier_stem(specifier: &str) -> &str {
    let last = specifier
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(specifier);
    match last.find('.') {
        Some(0) | None => last,
        Some(dot) => &last[..dot],
    }
}

fn namespace_for<'n>(
    namespaces: &'n FxIndexMap<&str, String>,
    record: &ModuleRecord,
    specifier: &str,
) -> BundleResult<&'n str> {
    namespaces
        .get(specifier)
        .map(String::as_str)
        .ok_or_else(|| BundleError::Generation {
            identity: record.identity.clone(),
            message: format!("no namespace allocated for '{specifier}'"),
        })
}

fn render_esm(node: &ModuleNode, context: &RenderContext<'_>) -> BundleResult<String> {
    let record = &node.record;
    let analysis = record.analysis();

    let mut names = NameAllocator::new(&record.source);
    for export in &analysis.exports {
        names.reserve(&export.local);
    }
    for import in &analysis.imports {
        for binding in &import.bindings {
            names.reserve(binding.local());
        }
    }
    let module_param = names.fresh("__module");
    let exports_param = names.fresh("__exports");
    let require_param = names.fresh("__require");
    let helpers_param = names.fresh("__helpers");

    // Specifiers whose exports object must be kept in a variable
    let mut bound: Vec<&str> = analysis
        .imports
        .iter()
        .filter(|import| !import.bindings.is_empty())
        .map(|import| import.specifier.as_str())
        .collect();
    bound.extend(analysis.reexports.iter().map(ReExport::specifier));

    let mut namespaces: FxIndexMap<&str, String> = FxIndexMap::default();
    let mut preamble = String::new();
    for specifier in &analysis.static_specifiers {
        let dependency = context.dependency(node, specifier)?;
        let lookup = format!("{require_param}({})", names::js_string(dependency.key));
        if !bound.contains(&specifier.as_str()) {
            let _ = writeln!(preamble, "{lookup};");
            continue;
        }

        let namespace = names.fresh(&format!("__{}", specifier_stem(specifier)));
        if dependency.needs_interop() {
            let _ = writeln!(preamble, "var {namespace} = {helpers_param}.interop({lookup});");
        } else {
            let _ = writeln!(preamble, "var {namespace} = {lookup};");
        }
        for reexport in &analysis.reexports {
            if let ReExport::All { specifier: from } = reexport
                && from == specifier
            {
                let _ = writeln!(
                    preamble,
                    "{helpers_param}.reexport({exports_param}, {namespace});"
                );
            }
        }
        namespaces.insert(specifier.as_str(), namespace);
    }

    let namespace_of = |specifier: &str| namespace_for(&namespaces, record, specifier);

    for import in &analysis.imports {
        let dependency = context.dependency(node, &import.specifier)?;
        for binding in &import.bindings {
            match binding {
                ImportBinding::Default { .. } => {
                    check_imported_name(node, &dependency, "default")?;
                }
                ImportBinding::Named { imported, .. } => {
                    check_imported_name(node, &dependency, imported)?;
                }
                ImportBinding::Namespace { .. } => {}
            }
        }
    }

    // Export getters, in declaration order
    let mut getters = Vec::new();
    for export in &analysis.exports {
        let value = match analysis.import_binding(&export.local) {
            Some((specifier, binding)) => binding_access(binding, namespace_of(specifier)?),
            None => export.local.clone(),
        };
        getters.push((export.exported.as_str(), value));
    }
    for reexport in &analysis.reexports {
        match reexport {
            ReExport::Named {
                specifier,
                imported,
                exported,
            } => {
                check_imported_name(node, &context.dependency(node, specifier)?, imported)?;
                let namespace = namespace_of(specifier)?;
                getters.push((exported.as_str(), names::property_access(namespace, imported)));
            }
            ReExport::Namespace {
                specifier,
                exported,
            } => getters.push((exported.as_str(), namespace_of(specifier)?.to_owned())),
            ReExport::All { .. } => {}
        }
    }

    let mut edits = analysis.edits.clone();
    edits.extend(require_edits(node, context)?);
    for reference in &analysis.references {
        let Some((specifier, binding)) = analysis.import_binding(&reference.local) else {
            continue;
        };
        let access = binding_access(binding, namespace_of(specifier)?);
        let replacement = match reference.context {
            ReferenceContext::Callee if !matches!(binding, ImportBinding::Namespace { .. }) => {
                format!("(0, {access})")
            }
            ReferenceContext::Shorthand => {
                format!("{}: {access}", names::property_key(&reference.local))
            }
            _ => access,
        };
        edits.push(TextEdit::replace(
            reference.span.start,
            reference.span.end,
            replacement,
        ));
    }
    let body = analyzer::apply_edits(&record.source, &mut edits);

    let mut module = format!(
        "function ({module_param}, {exports_param}, {require_param}, {helpers_param}) {{\n\"use strict\";\n"
    );
    if getters.is_empty() {
        let _ = writeln!(module, "{helpers_param}.defineExports({exports_param}, {{}});");
    } else {
        let _ = writeln!(module, "{helpers_param}.defineExports({exports_param}, {{");
        for (i, (exported, value)) in getters.iter().enumerate() {
            let separator = if i + 1 == getters.len() { "" } else { "," };
            let _ = writeln!(
                module,
                "  {}: function () {{ return {value}; }}{separator}",
                names::property_key(exported)
            );
        }
        module.push_str("});\n");
    }
    if !analysis.requires.is_empty() {
        // `require` is free in this module, so the alias cannot clash
        let _ = writeln!(module, "var require = {require_param};");
    }
    module.push_str(&preamble);
    module.push_str(body.trim_end());
    module.push_str("\n}");
    Ok(module)
}
