//! Static analysis of JavaScript module sources
//!
//! The analyzer parses a module with oxc and extracts everything the rest of
//! the pipeline needs as owned data: outgoing specifiers, import bindings,
//! exports, `require` calls, the text edits that strip module syntax, and
//! every reference to an imported binding. No AST outlives [`analyze`].

use anyhow::{Result, bail};
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, BindingPattern, BindingPatternKind, CallExpression, Declaration,
    ExportAllDeclaration, ExportDefaultDeclaration, ExportDefaultDeclarationKind,
    ExportNamedDeclaration, Expression, IdentifierReference, ImportDeclaration,
    ImportDeclarationSpecifier, ModuleDeclaration, ModuleExportName, ObjectProperty, Program,
    TaggedTemplateExpression,
};
use oxc_ast_visit::{Visit, walk};
use oxc_parser::Parser;
use oxc_semantic::{Scoping, SemanticBuilder, SymbolFlags};
use oxc_span::{GetSpan, SourceType, Span};
use rustc_hash::FxHashSet;

use crate::{
    names::NameAllocator,
    types::{ExportSurface, FxIndexSet, ModuleFormat},
};

/// Replace `source[start..end]` with `replacement`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub start: u32,
    pub end: u32,
    pub replacement: String,
}

impl TextEdit {
    pub fn remove(span: Span) -> Self {
        Self {
            start: span.start,
            end: span.end,
            replacement: String::new(),
        }
    }

    pub fn replace(start: u32, end: u32, replacement: impl Into<String>) -> Self {
        Self {
            start,
            end,
            replacement: replacement.into(),
        }
    }
}

/// Apply non-overlapping edits to `source`
pub fn apply_edits(source: &str, edits: &mut [TextEdit]) -> String {
    edits.sort_by_key(|edit| (edit.start, edit.end));
    let mut output = String::with_capacity(source.len());
    let mut cursor = 0usize;
    for edit in edits.iter() {
        let start = edit.start as usize;
        if start < cursor {
            // Overlapping edit, keep the first one
            continue;
        }
        output.push_str(&source[cursor..start]);
        output.push_str(&edit.replacement);
        cursor = edit.end as usize;
    }
    output.push_str(&source[cursor..]);
    output
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportBinding {
    Default { local: String },
    Namespace { local: String },
    Named { imported: String, local: String },
}

impl ImportBinding {
    pub fn local(&self) -> &str {
        match self {
            Self::Default { local } | Self::Namespace { local } | Self::Named { local, .. } => {
                local
            }
        }
    }
}

/// One `import` declaration; no bindings means a side-effect import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticImport {
    pub specifier: String,
    pub bindings: Vec<ImportBinding>,
}

/// A binding exported from this module's own scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalExport {
    pub exported: String,
    pub local: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReExport {
    /// `export { imported as exported } from 'specifier'`
    Named {
        specifier: String,
        imported: String,
        exported: String,
    },
    /// `export * as exported from 'specifier'`
    Namespace { specifier: String, exported: String },
    /// `export * from 'specifier'`
    All { specifier: String },
}

impl ReExport {
    pub fn specifier(&self) -> &str {
        match self {
            Self::Named { specifier, .. }
            | Self::Namespace { specifier, .. }
            | Self::All { specifier } => specifier,
        }
    }
}

/// A call to the free `require` function with a string literal argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireCall {
    pub specifier: String,
    /// Span of the string literal argument, quotes included
    pub argument: Span,
}

/// Where an imported binding is referenced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceContext {
    Plain,
    /// Callee of a call or tagged template; must not pass a `this`
    Callee,
    /// Shorthand object property `{ x }`
    Shorthand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReference {
    pub span: Span,
    /// Local name of the import binding referenced
    pub local: String,
    pub context: ReferenceContext,
}

/// Everything the pipeline needs to know about a module's source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleAnalysis {
    pub format: Option<ModuleFormat>,
    /// All outgoing specifiers, unique, in source order
    pub specifiers: Vec<String>,
    /// Specifiers of `import`/`export ... from` declarations, unique, in source order
    pub static_specifiers: Vec<String>,
    pub imports: Vec<StaticImport>,
    pub exports: Vec<LocalExport>,
    pub reexports: Vec<ReExport>,
    pub requires: Vec<RequireCall>,
    pub references: Vec<ImportReference>,
    /// Edits stripping module syntax from the source
    pub edits: Vec<TextEdit>,
}

impl ModuleAnalysis {
    pub fn format(&self) -> ModuleFormat {
        self.format.unwrap_or(ModuleFormat::CommonJs)
    }

    pub fn export_surface(&self) -> ExportSurface {
        if !self.format().is_esm()
            || self
                .reexports
                .iter()
                .any(|reexport| matches!(reexport, ReExport::All { .. }))
        {
            return ExportSurface::Dynamic;
        }

        let mut names = Vec::new();
        for export in &self.exports {
            names.push(export.exported.clone());
        }
        for reexport in &self.reexports {
            match reexport {
                ReExport::Named { exported, .. } | ReExport::Namespace { exported, .. } => {
                    names.push(exported.clone());
                }
                ReExport::All { .. } => {}
            }
        }
        ExportSurface::Named(names)
    }

    /// Import binding declared under `local`, with the specifier it comes from
    pub fn import_binding(&self, local: &str) -> Option<(&str, &ImportBinding)> {
        self.imports.iter().find_map(|import| {
            import
                .bindings
                .iter()
                .find(|binding| binding.local() == local)
                .map(|binding| (import.specifier.as_str(), binding))
        })
    }
}

/// Parse and analyze a JavaScript module
///
/// Sources are parsed as ES modules first and fall back to sloppy script
/// parsing, so legacy CommonJS code (octal literals, `with`) still bundles.
pub fn analyze(source: &str) -> Result<ModuleAnalysis> {
    let allocator = Allocator::default();
    let mut parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if !parsed.errors.is_empty() {
        let script = Parser::new(&allocator, source, SourceType::mjs().with_module(false)).parse();
        if !script.errors.is_empty() {
            // Report the module-mode error, it is usually the more precise one
            bail!("{}", parsed.errors[0]);
        }
        parsed = script;
    }

    let semantic = SemanticBuilder::new().build(&parsed.program).semantic;
    let mut collector = Collector::new(source, semantic.scoping());
    collector.collect(&parsed.program);
    Ok(collector.finish())
}

struct Collector<'s> {
    scoping: &'s Scoping,
    names: NameAllocator<'s>,
    analysis: ModuleAnalysis,
    specifiers: FxIndexSet<String>,
    static_specifiers: FxIndexSet<String>,
    callees: FxHashSet<u32>,
    shorthands: FxHashSet<u32>,
}

impl<'s> Collector<'s> {
    fn new(source: &'s str, scoping: &'s Scoping) -> Self {
        Self {
            scoping,
            names: NameAllocator::new(source),
            analysis: ModuleAnalysis::default(),
            specifiers: FxIndexSet::default(),
            static_specifiers: FxIndexSet::default(),
            callees: FxHashSet::default(),
            shorthands: FxHashSet::default(),
        }
    }

    fn finish(mut self) -> ModuleAnalysis {
        self.analysis.specifiers = self.specifiers.into_iter().collect();
        self.analysis.static_specifiers = self.static_specifiers.into_iter().collect();
        self.analysis
    }

    fn add_static_specifier(&mut self, specifier: &str) {
        self.specifiers.insert(specifier.to_owned());
        self.static_specifiers.insert(specifier.to_owned());
    }

    fn collect(&mut self, program: &Program<'_>) {
        if let Some(hashbang) = &program.hashbang {
            self.analysis.edits.push(TextEdit::remove(hashbang.span));
        }

        let mut is_esm = false;
        for stmt in &program.body {
            let Some(decl) = stmt.as_module_declaration() else {
                self.visit_statement(stmt);
                continue;
            };
            is_esm = true;
            match decl {
                ModuleDeclaration::ImportDeclaration(import) => self.collect_import(import),
                ModuleDeclaration::ExportNamedDeclaration(export) => {
                    self.collect_named_export(export);
                }
                ModuleDeclaration::ExportDefaultDeclaration(export) => {
                    self.collect_default_export(export);
                }
                ModuleDeclaration::ExportAllDeclaration(export) => self.collect_export_all(export),
                // TypeScript-only module syntax never reaches a JavaScript bundle
                _ => self.visit_module_declaration(decl),
            }
        }

        self.analysis.format = Some(if is_esm {
            ModuleFormat::Esm
        } else {
            ModuleFormat::CommonJs
        });
    }

    fn collect_import(&mut self, import: &ImportDeclaration<'_>) {
        let specifier = import.source.value.to_string();
        self.add_static_specifier(&specifier);

        let mut bindings = Vec::new();
        for spec in import.specifiers.iter().flatten() {
            bindings.push(match spec {
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => ImportBinding::Default {
                    local: s.local.name.to_string(),
                },
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    ImportBinding::Namespace {
                        local: s.local.name.to_string(),
                    }
                }
                ImportDeclarationSpecifier::ImportSpecifier(s) => ImportBinding::Named {
                    imported: export_name(&s.imported),
                    local: s.local.name.to_string(),
                },
            });
        }

        self.analysis.imports.push(StaticImport {
            specifier,
            bindings,
        });
        self.analysis.edits.push(TextEdit::remove(import.span));
    }

    fn collect_named_export(&mut self, export: &ExportNamedDeclaration<'_>) {
        if let Some(declaration) = &export.declaration {
            // `export const x = 1` keeps `const x = 1`
            self.analysis.edits.push(TextEdit::replace(
                export.span.start,
                declaration.span().start,
                "",
            ));
            for name in declared_names(declaration) {
                self.analysis.exports.push(LocalExport {
                    exported: name.clone(),
                    local: name,
                });
            }
            self.visit_declaration(declaration);
            return;
        }

        if let Some(source) = &export.source {
            let specifier = source.value.to_string();
            self.add_static_specifier(&specifier);
            for spec in &export.specifiers {
                self.analysis.reexports.push(ReExport::Named {
                    specifier: specifier.clone(),
                    imported: export_name(&spec.local),
                    exported: export_name(&spec.exported),
                });
            }
        } else {
            for spec in &export.specifiers {
                self.analysis.exports.push(LocalExport {
                    exported: export_name(&spec.exported),
                    local: export_name(&spec.local),
                });
            }
        }
        self.analysis.edits.push(TextEdit::remove(export.span));
    }

    fn collect_default_export(&mut self, export: &ExportDefaultDeclaration<'_>) {
        let declaration_span = export.declaration.span();
        let named_declaration = match &export.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                func.id.as_ref().map(|id| id.name.to_string())
            }
            ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                class.id.as_ref().map(|id| id.name.to_string())
            }
            _ => None,
        };

        let local = if let Some(name) = named_declaration {
            self.analysis.edits.push(TextEdit::replace(
                export.span.start,
                declaration_span.start,
                "",
            ));
            name
        } else {
            let local = self.names.fresh("__default");
            self.analysis.edits.push(TextEdit::replace(
                export.span.start,
                declaration_span.start,
                format!("var {local} = "),
            ));
            self.analysis.edits.push(TextEdit::replace(
                declaration_span.end,
                export.span.end.max(declaration_span.end),
                ";",
            ));
            local
        };

        self.analysis.exports.push(LocalExport {
            exported: "default".to_owned(),
            local,
        });
        self.visit_export_default_declaration(export);
    }

    fn collect_export_all(&mut self, export: &ExportAllDeclaration<'_>) {
        let specifier = export.source.value.to_string();
        self.add_static_specifier(&specifier);
        self.analysis.reexports.push(match &export.exported {
            Some(exported) => ReExport::Namespace {
                specifier,
                exported: export_name(exported),
            },
            None => ReExport::All { specifier },
        });
        self.analysis.edits.push(TextEdit::remove(export.span));
    }

    fn is_unresolved(&self, ident: &IdentifierReference<'_>) -> bool {
        self.scoping
            .get_reference(ident.reference_id())
            .symbol_id()
            .is_none()
    }
}

impl<'a> Visit<'a> for Collector<'_> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        let Some(symbol_id) = self.scoping.get_reference(ident.reference_id()).symbol_id() else {
            return;
        };
        if !self
            .scoping
            .symbol_flags(symbol_id)
            .contains(SymbolFlags::Import)
        {
            return;
        }

        let context = if self.callees.contains(&ident.span.start) {
            ReferenceContext::Callee
        } else if self.shorthands.contains(&ident.span.start) {
            ReferenceContext::Shorthand
        } else {
            ReferenceContext::Plain
        };
        self.analysis.references.push(ImportReference {
            span: ident.span,
            local: self.scoping.symbol_name(symbol_id).to_owned(),
            context,
        });
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::Identifier(callee) = &call.callee {
            self.callees.insert(callee.span.start);

            if callee.name.as_str() == "require"
                && call.arguments.len() == 1
                && self.is_unresolved(callee)
                && let Argument::StringLiteral(literal) = &call.arguments[0]
            {
                let specifier = literal.value.to_string();
                self.specifiers.insert(specifier.clone());
                self.analysis.requires.push(RequireCall {
                    specifier,
                    argument: literal.span,
                });
            }
        }
        walk::walk_call_expression(self, call);
    }

    fn visit_tagged_template_expression(&mut self, expr: &TaggedTemplateExpression<'a>) {
        if let Expression::Identifier(tag) = &expr.tag {
            self.callees.insert(tag.span.start);
        }
        walk::walk_tagged_template_expression(self, expr);
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.shorthand
            && let Expression::Identifier(value) = &prop.value
        {
            self.shorthands.insert(value.span.start);
        }
        walk::walk_object_property(self, prop);
    }
}

fn export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(ident) => ident.name.to_string(),
        ModuleExportName::IdentifierReference(ident) => ident.name.to_string(),
        ModuleExportName::StringLiteral(literal) => literal.value.to_string(),
    }
}

/// Names bound by an exported declaration
fn declared_names(declaration: &Declaration<'_>) -> Vec<String> {
    let mut names = Vec::new();
    match declaration {
        Declaration::VariableDeclaration(var) => {
            for declarator in &var.declarations {
                collect_binding_names(&declarator.id, &mut names);
            }
        }
        Declaration::FunctionDeclaration(func) => {
            if let Some(id) = &func.id {
                names.push(id.name.to_string());
            }
        }
        Declaration::ClassDeclaration(class) => {
            if let Some(id) = &class.id {
                names.push(id.name.to_string());
            }
        }
        _ => {}
    }
    names
}

fn collect_binding_names(pattern: &BindingPattern<'_>, names: &mut Vec<String>) {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(ident) => names.push(ident.name.to_string()),
        BindingPatternKind::ObjectPattern(object) => {
            for property in &object.properties {
                collect_binding_names(&property.value, names);
            }
            if let Some(rest) = &object.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPatternKind::ArrayPattern(array) => {
            for element in array.elements.iter().flatten() {
                collect_binding_names(element, names);
            }
            if let Some(rest) = &array.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPatternKind::AssignmentPattern(assignment) => {
            collect_binding_names(&assignment.left, names);
        }
    }
}
