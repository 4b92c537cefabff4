// ES module scanner: parses one module with oxc and records everything the
// linker needs as owned data (imports, exports, top-level symbol sites), so
// the AST can be dropped before linking starts.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_parser::{Parser, ParserReturn};
use oxc_semantic::{ReferenceId, Scoping, SemanticBuilder, SymbolId};
use oxc_span::{GetSpan, SourceType, Span};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::utils::{PackError, Result};

/// Local name used for an anonymous `export default`
pub const DEFAULT_LOCAL: &str = "*default*";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImportedName {
    Named(String),
    Namespace,
}

impl ImportedName {
    pub fn default_export() -> Self {
        ImportedName::Named("default".to_string())
    }
}

/// One `import` / `export ... from` source
#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub specifier: String,
}

#[derive(Debug, Clone)]
pub struct ImportBinding {
    pub local: String,
    pub imported: ImportedName,
    pub record: usize,
}

#[derive(Debug, Clone)]
pub struct LocalExport {
    pub exported: String,
    pub local: String,
}

#[derive(Debug, Clone)]
pub struct ReExport {
    pub exported: String,
    pub imported: ImportedName,
    pub record: usize,
}

#[derive(Debug, Clone)]
pub struct DynamicImport {
    pub specifier: String,
    pub start: u32,
    pub end: u32,
}

/// How an identifier occurrence must be rewritten when renamed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    Plain,
    /// `{ a }` becomes `{ a: renamed }`
    PropertyShorthand,
    /// `export { a }` becomes `export { renamed as a }`
    ExportShorthand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site {
    pub start: u32,
    pub end: u32,
    pub kind: SiteKind,
}

impl Site {
    /// Replacement text for this occurrence of `original` renamed to `replacement`
    pub fn rewrite(&self, original: &str, replacement: &str) -> String {
        match self.kind {
            SiteKind::Plain => replacement.to_string(),
            SiteKind::PropertyShorthand => format!("{}: {}", original, replacement),
            SiteKind::ExportShorthand => format!("{} as {}", replacement, original),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TopLevelSymbol {
    pub name: String,
    pub sites: Vec<Site>,
}

/// Shape of the module's `export default`, rewritten by the linker
#[derive(Debug, Clone)]
pub enum DefaultExport {
    /// `export default function f() {}` / `export default class C {}`
    Declaration { prefix: (u32, u32), local: String },
    /// `export default function () {}`: name inserted at `name_at`
    AnonymousDeclaration { prefix: (u32, u32), name_at: u32 },
    /// `export default <expr>`
    Expression { prefix: (u32, u32) },
}

#[derive(Debug, Clone, Default)]
pub struct ModuleAnalysis {
    pub imports: Vec<ImportRecord>,
    pub import_bindings: Vec<ImportBinding>,
    pub local_exports: Vec<LocalExport>,
    pub reexports: Vec<ReExport>,
    pub star_exports: Vec<usize>,
    pub dynamic_imports: Vec<DynamicImport>,
    pub default_export: Option<DefaultExport>,
    /// Root scope bindings in declaration order
    pub symbols: Vec<TopLevelSymbol>,
    /// Names bound in any nested scope
    pub nested_names: BTreeSet<String>,
    /// Free (unresolved) references
    pub globals: BTreeSet<String>,
    /// Spans of module syntax to delete
    pub removals: Vec<(u32, u32)>,
    /// End of the last top-level statement when it has no closing `;`
    pub unterminated_end: Option<u32>,
    pub has_module_syntax: bool,
}

impl ModuleAnalysis {
    pub fn symbol(&self, name: &str) -> Option<&TopLevelSymbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    pub fn import_binding(&self, local: &str) -> Option<&ImportBinding> {
        self.import_bindings.iter().find(|b| b.local == local)
    }
}

/// Parse `code` for scanning. Syntax errors become a transform error for `path`.
pub fn parse<'a>(allocator: &'a Allocator, path: &Path, code: &'a str) -> Result<ParserReturn<'a>> {
    let ret = Parser::new(allocator, code, SourceType::unambiguous()).parse();
    if ret.panicked || !ret.errors.is_empty() {
        let message = ret
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(PackError::transform(
            path,
            if message.is_empty() { "parser aborted".to_string() } else { message },
        ));
    }
    Ok(ret)
}

/// Raw identifier occurrences gathered in one AST walk
#[derive(Default)]
pub struct IdentifierCollector {
    pub references: Vec<(Span, Option<ReferenceId>)>,
    pub bindings: Vec<(Span, Option<SymbolId>, String)>,
    pub shorthands: HashMap<u32, SiteKind>,
    pub dynamic_imports: Vec<DynamicImport>,
}

impl IdentifierCollector {
    pub fn collect(program: &Program<'_>) -> Self {
        let mut collector = Self::default();
        collector.visit_program(program);
        collector
    }

    pub fn site(&self, span: Span) -> Site {
        Site {
            start: span.start,
            end: span.end,
            kind: self
                .shorthands
                .get(&span.start)
                .copied()
                .unwrap_or(SiteKind::Plain),
        }
    }

    /// All binding and reference sites per symbol
    pub fn sites_by_symbol(&self, scoping: &Scoping) -> HashMap<SymbolId, Vec<Site>> {
        let mut sites: HashMap<SymbolId, Vec<Site>> = HashMap::new();
        for (span, symbol, _) in &self.bindings {
            if let Some(symbol) = symbol {
                sites.entry(*symbol).or_default().push(self.site(*span));
            }
        }
        for (span, reference) in &self.references {
            let symbol = reference.and_then(|r| scoping.get_reference(r).symbol_id());
            if let Some(symbol) = symbol {
                sites.entry(symbol).or_default().push(self.site(*span));
            }
        }
        for list in sites.values_mut() {
            list.sort_by_key(|s| s.start);
            list.dedup_by_key(|s| s.start);
        }
        sites
    }
}

impl<'a> Visit<'a> for IdentifierCollector {
    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        self.references.push((it.span, it.reference_id.get()));
    }

    fn visit_binding_identifier(&mut self, it: &BindingIdentifier<'a>) {
        self.bindings.push((it.span, it.symbol_id.get(), it.name.to_string()));
    }

    fn visit_object_property(&mut self, it: &ObjectProperty<'a>) {
        if it.shorthand {
            if let Expression::Identifier(ident) = &it.value {
                self.shorthands.insert(ident.span.start, SiteKind::PropertyShorthand);
            }
        }
        walk::walk_object_property(self, it);
    }

    fn visit_binding_property(&mut self, it: &BindingProperty<'a>) {
        if it.shorthand {
            if let Some(ident) = it.value.get_binding_identifier() {
                self.shorthands.insert(ident.span.start, SiteKind::PropertyShorthand);
            }
        }
        walk::walk_binding_property(self, it);
    }

    fn visit_assignment_target_property_identifier(
        &mut self,
        it: &AssignmentTargetPropertyIdentifier<'a>,
    ) {
        self.shorthands.insert(it.binding.span.start, SiteKind::PropertyShorthand);
        walk::walk_assignment_target_property_identifier(self, it);
    }

    fn visit_export_specifier(&mut self, it: &ExportSpecifier<'a>) {
        let local = it.local.span();
        if it.span.end == local.end {
            self.shorthands.insert(local.start, SiteKind::ExportShorthand);
        }
        walk::walk_export_specifier(self, it);
    }

    fn visit_import_expression(&mut self, it: &ImportExpression<'a>) {
        if let Expression::StringLiteral(lit) = &it.source {
            self.dynamic_imports.push(DynamicImport {
                specifier: lit.value.to_string(),
                start: it.span.start,
                end: it.span.end,
            });
        }
        walk::walk_import_expression(self, it);
    }
}

/// Scan an ES module (or plain script) for linking
pub fn analyze(path: &Path, code: &str) -> Result<ModuleAnalysis> {
    let allocator = Allocator::default();
    let ret = parse(&allocator, path, code)?;
    let program = ret.program;

    let semantic = SemanticBuilder::new().build(&program).semantic;
    let scoping = semantic.scoping();
    let collector = IdentifierCollector::collect(&program);

    let mut analysis = ModuleAnalysis {
        has_module_syntax: program.source_type.is_module(),
        dynamic_imports: collector.dynamic_imports.clone(),
        ..ModuleAnalysis::default()
    };

    for stmt in &program.body {
        scan_module_statement(stmt, code, &mut analysis);
    }
    analysis.unterminated_end = program
        .body
        .last()
        .filter(|stmt| !is_hoistable_declaration(stmt))
        .map(|stmt| stmt.span().end)
        .filter(|&end| !code[..end as usize].ends_with(';'));

    let root = scoping.root_scope_id();
    let mut sites = collector.sites_by_symbol(scoping);
    let mut root_symbols: Vec<SymbolId> = scoping.iter_bindings_in(root).collect();
    root_symbols.sort_by_key(|s| scoping.symbol_span(*s).start);
    for symbol in root_symbols {
        analysis.symbols.push(TopLevelSymbol {
            name: scoping.symbol_name(symbol).to_string(),
            sites: sites.remove(&symbol).unwrap_or_default(),
        });
    }

    for (_, symbol, name) in &collector.bindings {
        if let Some(symbol) = symbol {
            if scoping.symbol_scope_id(*symbol) != root {
                analysis.nested_names.insert(name.clone());
            }
        }
    }
    analysis.globals = scoping
        .root_unresolved_references()
        .keys()
        .map(|k| k.to_string())
        .collect();

    Ok(analysis)
}

const RESERVED_WORDS: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
    "for", "function", "if", "implements", "import", "in", "instanceof", "interface", "let",
    "new", "null", "package", "private", "protected", "public", "return", "static", "super",
    "switch", "this", "throw", "true", "try", "typeof", "undefined", "var", "void", "while",
    "with", "yield", "NaN", "Infinity",
];

/// Words that can never be used as a generated binding name
pub fn is_reserved_word(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

/// Plain ASCII identifier check, enough for generated names and property keys
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') && !is_reserved_word(name)
}

/// Turn a file stem into a usable identifier base
pub fn identifier_from(stem: &str) -> String {
    let mut out: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) || is_reserved_word(&out) {
        out.insert(0, '_');
    }
    out
}

fn push_record(analysis: &mut ModuleAnalysis, source: &StringLiteral<'_>) -> usize {
    analysis.imports.push(ImportRecord {
        specifier: source.value.to_string(),
    });
    analysis.imports.len() - 1
}

/// Function and class declarations close themselves
fn is_hoistable_declaration(stmt: &Statement) -> bool {
    match stmt {
        Statement::FunctionDeclaration(_) | Statement::ClassDeclaration(_) => true,
        Statement::ExportNamedDeclaration(decl) => matches!(
            decl.declaration,
            Some(Declaration::FunctionDeclaration(_) | Declaration::ClassDeclaration(_))
        ),
        Statement::ExportDefaultDeclaration(decl) => matches!(
            decl.declaration,
            ExportDefaultDeclarationKind::FunctionDeclaration(_)
                | ExportDefaultDeclarationKind::ClassDeclaration(_)
        ),
        _ => false,
    }
}

fn scan_module_statement(stmt: &Statement<'_>, code: &str, analysis: &mut ModuleAnalysis) {
    match stmt {
        Statement::ImportDeclaration(decl) => {
            analysis.has_module_syntax = true;
            analysis.removals.push((decl.span.start, decl.span.end));
            if decl.import_kind.is_type() {
                return;
            }
            let record = push_record(analysis, &decl.source);
            for specifier in decl.specifiers.iter().flatten() {
                let (local, imported) = match specifier {
                    ImportDeclarationSpecifier::ImportSpecifier(s) => (
                        s.local.name.to_string(),
                        ImportedName::Named(s.imported.name().to_string()),
                    ),
                    ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                        (s.local.name.to_string(), ImportedName::default_export())
                    }
                    ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                        (s.local.name.to_string(), ImportedName::Namespace)
                    }
                };
                analysis.import_bindings.push(ImportBinding {
                    local,
                    imported,
                    record,
                });
            }
        }
        Statement::ExportNamedDeclaration(decl) => {
            analysis.has_module_syntax = true;
            if let Some(declaration) = &decl.declaration {
                analysis
                    .removals
                    .push((decl.span.start, declaration.span().start));
                for name in declared_names(declaration) {
                    analysis.local_exports.push(LocalExport {
                        exported: name.clone(),
                        local: name,
                    });
                }
                return;
            }
            analysis.removals.push((decl.span.start, decl.span.end));
            if decl.export_kind.is_type() {
                return;
            }
            match &decl.source {
                Some(source) => {
                    let record = push_record(analysis, source);
                    for spec in &decl.specifiers {
                        analysis.reexports.push(ReExport {
                            exported: spec.exported.name().to_string(),
                            imported: ImportedName::Named(spec.local.name().to_string()),
                            record,
                        });
                    }
                }
                None => {
                    for spec in &decl.specifiers {
                        analysis.local_exports.push(LocalExport {
                            exported: spec.exported.name().to_string(),
                            local: spec.local.name().to_string(),
                        });
                    }
                }
            }
        }
        Statement::ExportDefaultDeclaration(decl) => {
            analysis.has_module_syntax = true;
            let (default, local) = match &decl.declaration {
                ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                    let prefix = (decl.span.start, func.span.start);
                    match &func.id {
                        Some(id) => (
                            DefaultExport::Declaration {
                                prefix,
                                local: id.name.to_string(),
                            },
                            id.name.to_string(),
                        ),
                        None => (
                            DefaultExport::AnonymousDeclaration {
                                prefix,
                                name_at: func.params.span.start,
                            },
                            DEFAULT_LOCAL.to_string(),
                        ),
                    }
                }
                ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                    let prefix = (decl.span.start, class.span.start);
                    match &class.id {
                        Some(id) => (
                            DefaultExport::Declaration {
                                prefix,
                                local: id.name.to_string(),
                            },
                            id.name.to_string(),
                        ),
                        None => {
                            let search_from = class
                                .decorators
                                .last()
                                .map(|d| d.span.end)
                                .unwrap_or(class.span.start);
                            let name_at = code[search_from as usize..]
                                .find("class")
                                .map(|i| search_from + i as u32 + 5)
                                .unwrap_or(search_from);
                            (
                                DefaultExport::AnonymousDeclaration { prefix, name_at },
                                DEFAULT_LOCAL.to_string(),
                            )
                        }
                    }
                }
                ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => {
                    analysis.removals.push((decl.span.start, decl.span.end));
                    return;
                }
                other => {
                    let expr_start = other
                        .as_expression()
                        .map(|e| e.span().start)
                        .unwrap_or(decl.span.start);
                    (
                        DefaultExport::Expression {
                            prefix: (decl.span.start, expr_start),
                        },
                        DEFAULT_LOCAL.to_string(),
                    )
                }
            };
            analysis.default_export = Some(default);
            analysis.local_exports.push(LocalExport {
                exported: "default".to_string(),
                local,
            });
        }
        Statement::ExportAllDeclaration(decl) => {
            analysis.has_module_syntax = true;
            analysis.removals.push((decl.span.start, decl.span.end));
            let record = push_record(analysis, &decl.source);
            match &decl.exported {
                Some(exported) => analysis.reexports.push(ReExport {
                    exported: exported.name().to_string(),
                    imported: ImportedName::Namespace,
                    record,
                }),
                None => analysis.star_exports.push(record),
            }
        }
        _ => {}
    }
}

pub fn declared_names(declaration: &Declaration<'_>) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(var) => var
            .declarations
            .iter()
            .flat_map(|d| d.id.get_binding_identifiers())
            .map(|id| id.name.to_string())
            .collect(),
        Declaration::FunctionDeclaration(func) => {
            func.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::ClassDeclaration(class) => {
            class.id.iter().map(|id| id.name.to_string()).collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(code: &str) -> ModuleAnalysis {
        analyze(Path::new("test.js"), code).unwrap()
    }

    #[test]
    fn test_collects_import_forms() {
        let a = scan(
            "import def, { a, b as c } from './x.js';\nimport * as ns from 'pkg';\nimport './side.css';\n",
        );
        let specs: Vec<_> = a.imports.iter().map(|r| r.specifier.as_str()).collect();
        assert_eq!(specs, vec!["./x.js", "pkg", "./side.css"]);

        let bindings: Vec<_> = a
            .import_bindings
            .iter()
            .map(|b| (b.local.as_str(), b.imported.clone(), b.record))
            .collect();
        assert_eq!(
            bindings,
            vec![
                ("def", ImportedName::default_export(), 0),
                ("a", ImportedName::Named("a".into()), 0),
                ("c", ImportedName::Named("b".into()), 0),
                ("ns", ImportedName::Namespace, 1),
            ]
        );
        assert_eq!(a.removals.len(), 3);
        assert!(a.has_module_syntax);
    }

    #[test]
    fn test_collects_export_forms() {
        let a = scan(
            "export const x = 1, { y } = obj;\nfunction f() {}\nexport { f as g };\nexport { h } from './h.js';\nexport * from './all.js';\nexport * as ns from './ns.js';\n",
        );
        let locals: Vec<_> = a
            .local_exports
            .iter()
            .map(|e| (e.exported.as_str(), e.local.as_str()))
            .collect();
        assert_eq!(locals, vec![("x", "x"), ("y", "y"), ("g", "f")]);
        assert_eq!(a.reexports.len(), 2);
        assert_eq!(a.reexports[1].imported, ImportedName::Namespace);
        assert_eq!(a.star_exports, vec![1]);
        // `export ` prefix only for the declaration
        assert_eq!(a.removals[0], (0, 7));
    }

    #[test]
    fn test_default_export_shapes() {
        let a = scan("export default function () {}\n");
        assert!(matches!(
            a.default_export,
            Some(DefaultExport::AnonymousDeclaration { prefix: (0, 15), name_at: 24 })
        ));
        assert_eq!(a.local_exports[0].local, DEFAULT_LOCAL);

        let b = scan("export default class Foo {}\n");
        assert!(matches!(b.default_export, Some(DefaultExport::Declaration { ref local, .. }) if local == "Foo"));

        let c = scan("export default 40 + 2;\n");
        assert!(matches!(c.default_export, Some(DefaultExport::Expression { prefix: (0, 15) })));
    }

    #[test]
    fn test_symbol_sites_include_shorthands() {
        let code = "const a = 1;\nconst o = { a };\nexport { a };\n";
        let an = scan(code);
        let sym = an.symbol("a").unwrap();
        let kinds: Vec<_> = sym.sites.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SiteKind::Plain, SiteKind::PropertyShorthand, SiteKind::ExportShorthand]
        );
        assert_eq!(sym.sites[1].rewrite("a", "a$1"), "a: a$1");
        assert_eq!(sym.sites[2].rewrite("a", "a$1"), "a$1 as a");
    }

    #[test]
    fn test_nested_names_and_globals() {
        let an = scan("import x from 'x';\nfunction run(item) { let tmp = item; return window.fetch(tmp); }\n");
        assert!(an.nested_names.contains("item"));
        assert!(an.nested_names.contains("tmp"));
        assert!(!an.nested_names.contains("run"));
        assert!(an.globals.contains("window"));
        assert!(an.symbol("x").is_some());
        assert!(an.symbol("run").is_some());
    }

    #[test]
    fn test_dynamic_import_literals() {
        let an = scan("const p = import('./lazy.js');\nimport(name);\n");
        assert_eq!(an.dynamic_imports.len(), 1);
        assert_eq!(an.dynamic_imports[0].specifier, "./lazy.js");
    }

    #[test]
    fn test_syntax_error_is_transform_error() {
        let err = analyze(Path::new("bad.js"), "const = ;").unwrap_err();
        assert!(matches!(err, PackError::Transform { .. }));
    }

    #[test]
    fn test_identifier_helpers() {
        assert!(is_identifier("foo$1"));
        assert!(!is_identifier("class"));
        assert!(!is_identifier("my-name"));
        assert_eq!(identifier_from("leaflet_rollup"), "leaflet_rollup");
        assert_eq!(identifier_from("my-lib.min"), "my_lib_min");
        assert_eq!(identifier_from("2d"), "_2d");
    }

    #[test]
    fn test_script_without_module_syntax() {
        let an = scan("module.exports = 1;\n");
        assert!(!an.has_module_syntax);
        assert!(an.globals.contains("module"));
    }

    #[test]
    fn test_unterminated_last_statement() {
        let code = "export const items = []\nitems.push('a')\n";
        assert_eq!(scan(code).unterminated_end, Some(code.trim_end().len() as u32));
        assert_eq!(scan("items.push('a');\n").unterminated_end, None);
        assert_eq!(scan("export function f() {}\n").unterminated_end, None);
        assert_eq!(scan("export default class {}\n").unterminated_end, None);
    }
}
