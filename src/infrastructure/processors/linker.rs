// Scope-hoisting linker. Module bodies are concatenated into one scope in
// execution order; import bindings are rewritten to the exporter's final
// local name so live bindings survive, cycles included.

use sourcemap::SourceMap;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::core::models::CommonJsMeta;
use crate::infrastructure::processors::js_scanner::{
    identifier_from, is_identifier, is_reserved_word, DefaultExport, ImportBinding, ImportedName,
    ModuleAnalysis, DEFAULT_LOCAL,
};
use crate::utils::{BundleMapBuilder, Mapping, PackError, Result, SourceEditor};

/// What an import record points at after resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleRef {
    Internal(usize),
    External(String),
    /// Extracted stylesheet; the binding evaluates to `undefined`
    Stylesheet,
}

/// A module ready for linking
#[derive(Debug)]
pub struct LinkModule {
    pub path: PathBuf,
    /// Name used in the source map, relative to the project root
    pub source_name: String,
    /// Code after the transform chain
    pub code: String,
    /// Code as loaded from disk
    pub original: String,
    /// Map from `code` back to `original`
    pub map: Option<SourceMap>,
    pub analysis: ModuleAnalysis,
    pub commonjs: Option<CommonJsMeta>,
    /// One entry per `analysis.imports` record
    pub records: Vec<ModuleRef>,
    /// One entry per `analysis.dynamic_imports` entry
    pub dynamic: Vec<ModuleRef>,
}

#[derive(Debug)]
pub struct LinkedBundle {
    pub code: String,
    pub map: Option<SourceMap>,
    /// Names exported by the bundle
    pub exports: Vec<String>,
    /// External specifiers in first-use order
    pub externals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Binding {
    Local { module: usize, local: String },
    External { specifier: String, imported: ImportedName },
    Namespace(usize),
    /// A property of a CommonJS module's live exports object
    CjsMember { module: usize, name: String },
    /// `require()` of a CommonJS module
    CjsExports(usize),
    Void,
}

#[derive(Default)]
struct ExternalImports {
    specifier: String,
    default: Option<String>,
    namespace: Option<String>,
    named: Vec<(String, String)>,
}

/// Link `modules` (in execution order) into one ES module. `entry` is the
/// index of the entry module.
pub fn link(modules: &[LinkModule], entry: usize, file: &str, sourcemap: bool) -> Result<LinkedBundle> {
    Linker::new(modules, entry).run(file, sourcemap)
}

struct Linker<'m> {
    modules: &'m [LinkModule],
    entry: usize,
    /// Resolved import bindings per module, keyed by local name
    imports: Vec<HashMap<String, Binding>>,
    /// Final names of top-level symbols per module
    names: Vec<HashMap<String, String>>,
    namespaces: Vec<Option<(String, Vec<(String, Binding)>)>>,
    externals: Vec<ExternalImports>,
    external_names: HashMap<(String, ImportedName), String>,
    claimed: HashSet<String>,
}

impl<'m> Linker<'m> {
    fn new(modules: &'m [LinkModule], entry: usize) -> Self {
        Self {
            modules,
            entry,
            imports: vec![HashMap::new(); modules.len()],
            names: vec![HashMap::new(); modules.len()],
            namespaces: vec![None; modules.len()],
            externals: Vec::new(),
            external_names: HashMap::new(),
            claimed: HashSet::new(),
        }
    }

    fn run(mut self, file: &str, sourcemap: bool) -> Result<LinkedBundle> {
        for m in 0..self.modules.len() {
            for binding in &self.modules[m].analysis.import_bindings {
                let resolved = self.resolve_import(m, binding, &mut HashSet::new())?;
                self.imports[m].insert(binding.local.clone(), resolved);
            }
        }

        let exports = self.entry_exports()?;
        self.collect_namespaces(&exports)?;
        self.assign_names(&exports);
        let (code, map) = self.render(&exports, file, sourcemap);

        Ok(LinkedBundle {
            code,
            map,
            exports: exports.iter().map(|(name, _)| name.clone()).collect(),
            externals: self.externals.iter().map(|e| e.specifier.clone()).collect(),
        })
    }

    fn is_commonjs(&self, m: usize) -> bool {
        self.modules[m].commonjs.is_some()
    }

    fn not_exported(&self, importer: usize, target: usize, name: &str) -> PackError {
        PackError::transform(
            &self.modules[importer].path,
            format!(
                "'{}' is not exported by {}",
                name, self.modules[target].source_name
            ),
        )
    }

    fn resolve_import(
        &self,
        m: usize,
        binding: &ImportBinding,
        seen: &mut HashSet<(usize, String)>,
    ) -> Result<Binding> {
        let module = &self.modules[m];
        let is_require = module
            .commonjs
            .as_ref()
            .map(|meta| meta.require_bindings.contains(&binding.local))
            .unwrap_or(false);
        if !is_require {
            return self.resolve_record(m, binding.record, &binding.imported, seen);
        }
        Ok(match module.records.get(binding.record) {
            Some(ModuleRef::Internal(t)) if self.is_commonjs(*t) => Binding::CjsExports(*t),
            Some(ModuleRef::Internal(t)) => Binding::Namespace(*t),
            Some(ModuleRef::External(specifier)) => Binding::External {
                specifier: specifier.clone(),
                imported: ImportedName::default_export(),
            },
            Some(ModuleRef::Stylesheet) | None => Binding::Void,
        })
    }

    fn resolve_record(
        &self,
        m: usize,
        record: usize,
        imported: &ImportedName,
        seen: &mut HashSet<(usize, String)>,
    ) -> Result<Binding> {
        match self.modules[m].records.get(record) {
            Some(ModuleRef::External(specifier)) => Ok(Binding::External {
                specifier: specifier.clone(),
                imported: imported.clone(),
            }),
            Some(ModuleRef::Stylesheet) | None => Ok(Binding::Void),
            Some(ModuleRef::Internal(t)) => match imported {
                ImportedName::Namespace => Ok(Binding::Namespace(*t)),
                ImportedName::Named(name) => self
                    .resolve_export(*t, name, seen, true)?
                    .ok_or_else(|| self.not_exported(m, *t, name)),
            },
        }
    }

    /// Binding behind export `name` of module `m`. With `any_cjs_name`, a
    /// CommonJS module answers for names it was not seen to assign; otherwise
    /// only its statically scanned names count.
    fn resolve_export(
        &self,
        m: usize,
        name: &str,
        seen: &mut HashSet<(usize, String)>,
        any_cjs_name: bool,
    ) -> Result<Option<Binding>> {
        if !seen.insert((m, name.to_string())) {
            return Ok(None);
        }
        let module = &self.modules[m];
        let analysis = &module.analysis;

        if let Some(export) = analysis.local_exports.iter().find(|e| e.exported == name) {
            if let Some(binding) = analysis.import_binding(&export.local) {
                return self.resolve_import(m, binding, seen).map(Some);
            }
            return Ok(Some(Binding::Local {
                module: m,
                local: export.local.clone(),
            }));
        }
        if let Some(re) = analysis.reexports.iter().find(|r| r.exported == name) {
            return self.resolve_record(m, re.record, &re.imported, seen).map(Some);
        }
        if name == "default" {
            return Ok(None);
        }
        if let Some(meta) = &module.commonjs {
            if any_cjs_name || meta.named_exports.contains(name) {
                return Ok(Some(Binding::CjsMember {
                    module: m,
                    name: name.to_string(),
                }));
            }
            return Ok(None);
        }

        // Static exports of every star target win over CommonJS guesses
        let before = seen.clone();
        let mut external = None;
        for &record in &analysis.star_exports {
            match module.records.get(record) {
                Some(ModuleRef::Internal(t)) => {
                    if let Some(found) = self.resolve_export(*t, name, seen, false)? {
                        return Ok(Some(found));
                    }
                }
                Some(ModuleRef::External(specifier)) if external.is_none() => {
                    external = Some(Binding::External {
                        specifier: specifier.clone(),
                        imported: ImportedName::Named(name.to_string()),
                    });
                }
                _ => {}
            }
        }
        if external.is_some() || !any_cjs_name {
            return Ok(external);
        }

        let mut seen = before;
        for &record in &analysis.star_exports {
            if let Some(ModuleRef::Internal(t)) = module.records.get(record) {
                if let Some(found) = self.resolve_export(*t, name, &mut seen, true)? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    /// Exported names of a module, in declaration order
    fn export_names(&self, m: usize, seen: &mut HashSet<usize>) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        if !seen.insert(m) {
            return names;
        }
        let analysis = &self.modules[m].analysis;
        let mut push = |names: &mut Vec<String>, name: &str| {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        };
        for export in &analysis.local_exports {
            push(&mut names, &export.exported);
        }
        for re in &analysis.reexports {
            push(&mut names, &re.exported);
        }
        if let Some(meta) = &self.modules[m].commonjs {
            for name in &meta.named_exports {
                push(&mut names, name);
            }
        }
        for &record in &analysis.star_exports {
            if let Some(ModuleRef::Internal(t)) = self.modules[m].records.get(record) {
                for name in self.export_names(*t, seen) {
                    if name != "default" {
                        push(&mut names, &name);
                    }
                }
            }
        }
        names
    }

    fn module_exports(&self, m: usize) -> Result<Vec<(String, Binding)>> {
        let mut out = Vec::new();
        for name in self.export_names(m, &mut HashSet::new()) {
            if let Some(binding) = self.resolve_export(m, &name, &mut HashSet::new(), true)? {
                out.push((name, binding));
            }
        }
        Ok(out)
    }

    fn entry_exports(&self) -> Result<Vec<(String, Binding)>> {
        self.module_exports(self.entry)
    }

    /// External `export * from` sources of the entry, re-emitted as-is
    fn entry_external_stars(&self) -> Vec<String> {
        let module = &self.modules[self.entry];
        module
            .analysis
            .star_exports
            .iter()
            .filter_map(|&r| match module.records.get(r) {
                Some(ModuleRef::External(specifier)) => Some(specifier.clone()),
                _ => None,
            })
            .collect()
    }

    /// Find every module whose namespace object is needed, with its members
    fn collect_namespaces(&mut self, exports: &[(String, Binding)]) -> Result<()> {
        let mut queue: Vec<usize> = Vec::new();
        let visit = |binding: &Binding, queue: &mut Vec<usize>| {
            if let Binding::Namespace(t) = binding {
                queue.push(*t);
            }
        };
        for (m, module) in self.modules.iter().enumerate() {
            for binding in self.imports[m].values() {
                visit(binding, &mut queue);
            }
            for target in &module.dynamic {
                if let ModuleRef::Internal(t) = target {
                    queue.push(*t);
                }
            }
        }
        for (_, binding) in exports {
            visit(binding, &mut queue);
        }

        queue.sort_unstable();
        while let Some(t) = queue.pop() {
            if self.namespaces[t].is_some() {
                continue;
            }
            let members = self.module_exports(t)?;
            for (_, binding) in &members {
                visit(binding, &mut queue);
            }
            self.namespaces[t] = Some((String::new(), members));
        }
        Ok(())
    }

    fn is_free(&self, name: &str, avoid: &BTreeSet<String>) -> bool {
        !self.claimed.contains(name) && !avoid.contains(name) && !is_reserved_word(name)
    }

    fn claim(&mut self, base: &str, avoid: &BTreeSet<String>) -> String {
        let mut candidate = base.to_string();
        let mut n = 1;
        while !self.is_free(&candidate, avoid) {
            candidate = format!("{}${}", base, n);
            n += 1;
        }
        self.claimed.insert(candidate.clone());
        candidate
    }

    fn stem(&self, m: usize) -> String {
        let stem = self.modules[m]
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("module");
        identifier_from(stem)
    }

    /// Every binding referenced from outside its module, with the names
    /// bound in nested scopes of the modules that reference it.
    fn foreign_scopes(&self) -> HashMap<(usize, String), BTreeSet<String>> {
        let mut scopes: HashMap<(usize, String), BTreeSet<String>> = HashMap::new();
        for (u, module) in self.modules.iter().enumerate() {
            for binding in self.imports[u].values() {
                let key = match binding {
                    Binding::Local { module, local } => (*module, local.clone()),
                    Binding::CjsMember { module, .. } | Binding::CjsExports(module) => {
                        match &self.modules[*module].commonjs {
                            Some(meta) => (*module, meta.module_object.clone()),
                            None => continue,
                        }
                    }
                    _ => continue,
                };
                scopes
                    .entry(key)
                    .or_default()
                    .extend(module.analysis.nested_names.iter().cloned());
            }
        }
        scopes
    }

    fn assign_names(&mut self, exports: &[(String, Binding)]) {
        let modules = self.modules;
        for module in modules {
            self.claimed.extend(module.analysis.globals.iter().cloned());
        }
        let all_nested: BTreeSet<String> = modules
            .iter()
            .flat_map(|m| m.analysis.nested_names.iter().cloned())
            .collect();

        // External bindings first, named after the first local that asks
        let mut wanted: Vec<(String, ImportedName, String)> = Vec::new();
        for (m, module) in modules.iter().enumerate() {
            for record in &module.records {
                if let ModuleRef::External(specifier) = record {
                    self.external_group(specifier);
                }
            }
            for binding in &module.analysis.import_bindings {
                if let Some(Binding::External {
                    specifier,
                    imported,
                }) = self.imports[m].get(&binding.local)
                {
                    wanted.push((specifier.clone(), imported.clone(), binding.local.clone()));
                }
            }
        }
        for (name, binding) in exports {
            if let Binding::External {
                specifier,
                imported,
            } = binding
            {
                wanted.push((specifier.clone(), imported.clone(), name.clone()));
            }
        }
        for (_, binding) in self.namespaces.iter().flatten().flat_map(|(_, m)| m.iter()) {
            if let Binding::External {
                specifier,
                imported,
            } = binding
            {
                let base = match imported {
                    ImportedName::Named(n) if is_identifier(n) => n.clone(),
                    _ => identifier_from(specifier),
                };
                wanted.push((specifier.clone(), imported.clone(), base));
            }
        }
        for (specifier, imported, base) in wanted {
            let key = (specifier.clone(), imported.clone());
            if self.external_names.contains_key(&key) {
                continue;
            }
            let base = if is_identifier(&base) {
                base
            } else {
                identifier_from(&specifier)
            };
            let local = self.claim(&base, &all_nested);
            let group = self.external_group(&specifier);
            match &imported {
                ImportedName::Namespace => group.namespace = Some(local.clone()),
                ImportedName::Named(n) if n == "default" => group.default = Some(local.clone()),
                ImportedName::Named(n) => group.named.push((n.clone(), local.clone())),
            }
            self.external_names.insert(key, local);
        }

        // Module symbols in execution order
        let foreign = self.foreign_scopes();
        let empty = BTreeSet::new();
        for (m, module) in modules.iter().enumerate() {
            let analysis = &module.analysis;
            let mut locals: Vec<(String, String)> = analysis
                .symbols
                .iter()
                .filter(|s| analysis.import_binding(&s.name).is_none())
                .map(|s| (s.name.clone(), s.name.clone()))
                .collect();
            if matches!(
                analysis.default_export,
                Some(DefaultExport::Expression { .. }) | Some(DefaultExport::AnonymousDeclaration { .. })
            ) {
                locals.push((DEFAULT_LOCAL.to_string(), format!("{}_default", self.stem(m))));
            }

            for (original, base) in locals {
                let importers = foreign.get(&(m, original.clone())).unwrap_or(&empty);
                let mut avoid: BTreeSet<String> = importers.clone();
                let name = if self.is_free(&base, &avoid) {
                    self.claim(&base, &avoid)
                } else {
                    avoid.extend(analysis.nested_names.iter().cloned());
                    self.claim(&base, &avoid)
                };
                self.names[m].insert(original, name);
            }
        }

        for t in 0..modules.len() {
            if self.namespaces[t].is_some() {
                let base = format!("{}_ns", self.stem(t));
                let name = self.claim(&base, &all_nested);
                if let Some((slot, _)) = self.namespaces[t].as_mut() {
                    *slot = name;
                }
            }
        }
    }

    fn external_group(&mut self, specifier: &str) -> &mut ExternalImports {
        let idx = match self.externals.iter().position(|e| e.specifier == specifier) {
            Some(idx) => idx,
            None => {
                self.externals.push(ExternalImports {
                    specifier: specifier.to_string(),
                    ..ExternalImports::default()
                });
                self.externals.len() - 1
            }
        };
        &mut self.externals[idx]
    }

    fn local_name(&self, m: usize, local: &str) -> String {
        self.names[m]
            .get(local)
            .cloned()
            .unwrap_or_else(|| local.to_string())
    }

    fn exports_object(&self, m: usize) -> String {
        let object = self.modules[m]
            .commonjs
            .as_ref()
            .map(|meta| self.local_name(m, &meta.module_object))
            .unwrap_or_default();
        format!("{}.exports", object)
    }

    fn namespace_name(&self, m: usize) -> String {
        self.namespaces[m]
            .as_ref()
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| "void 0".to_string())
    }

    /// Expression that reads `binding` at the top level of the bundle
    fn binding_text(&self, binding: &Binding) -> String {
        match binding {
            Binding::Local { module, local } => self.local_name(*module, local),
            Binding::External {
                specifier,
                imported,
            } => self
                .external_names
                .get(&(specifier.clone(), imported.clone()))
                .cloned()
                .unwrap_or_else(|| "void 0".to_string()),
            Binding::Namespace(t) => self.namespace_name(*t),
            Binding::CjsMember { module, name } => member_access(&self.exports_object(*module), name),
            Binding::CjsExports(t) => self.exports_object(*t),
            Binding::Void => "(void 0)".to_string(),
        }
    }

    fn render(&self, exports: &[(String, Binding)], file: &str, sourcemap: bool) -> (String, Option<SourceMap>) {
        let mut code = String::new();
        let mut map = sourcemap.then(|| BundleMapBuilder::new(file));

        if let Some(hashbang) = self.modules[self.entry].code.lines().next().filter(|l| l.starts_with("#!")) {
            code.push_str(hashbang);
            code.push('\n');
        }
        code.push_str(&self.render_external_imports());

        for (m, module) in self.modules.iter().enumerate() {
            let (body, mappings) = self.render_module(m);
            if let Some(builder) = map.as_mut() {
                builder.add_source(&module.source_name, &module.original);
                builder.add_chunk(
                    &module.source_name,
                    &mappings,
                    line_count(&code),
                    module.map.as_ref(),
                );
            }
            code.push_str(body.trim_end());
            code.push('\n');
            if let Some(ns) = self.render_namespace(m) {
                code.push_str(&ns);
            }
        }

        code.push_str(&self.render_exports(exports));
        (code, map.map(BundleMapBuilder::finish))
    }

    fn render_external_imports(&self) -> String {
        let mut out = String::new();
        for group in &self.externals {
            let quoted = quote(&group.specifier);
            let mut clauses = Vec::new();
            if let Some(default) = &group.default {
                clauses.push(default.clone());
            }
            if !group.named.is_empty() {
                let specs: Vec<String> = group
                    .named
                    .iter()
                    .map(|(imported, local)| {
                        if imported == local {
                            local.clone()
                        } else {
                            format!("{} as {}", export_key(imported), local)
                        }
                    })
                    .collect();
                clauses.push(format!("{{ {} }}", specs.join(", ")));
            }
            if let Some(ns) = &group.namespace {
                // A namespace clause cannot share a statement with named imports
                if group.named.is_empty() {
                    clauses.push(format!("* as {}", ns));
                } else {
                    out.push_str(&format!("import * as {} from {};\n", ns, quoted));
                }
            }
            if clauses.is_empty() {
                out.push_str(&format!("import {};\n", quoted));
            } else {
                out.push_str(&format!("import {} from {};\n", clauses.join(", "), quoted));
            }
        }
        out
    }

    fn render_module(&self, m: usize) -> (String, Vec<Mapping>) {
        let module = &self.modules[m];
        let analysis = &module.analysis;
        let mut editor = SourceEditor::new(&module.code);

        if module.code.starts_with("#!") {
            let end = module.code.find('\n').unwrap_or(module.code.len());
            editor.remove(0, end as u32);
        }
        for &(start, end) in &analysis.removals {
            editor.remove(start, end);
        }
        // Closes the statement so the next module cannot continue it
        if let Some(end) = analysis.unterminated_end {
            editor.insert(end, ";");
        }

        match &analysis.default_export {
            Some(DefaultExport::Declaration { prefix, .. }) => editor.remove(prefix.0, prefix.1),
            Some(DefaultExport::AnonymousDeclaration { prefix, name_at }) => {
                editor.remove(prefix.0, prefix.1);
                editor.insert(*name_at, format!(" {}", self.local_name(m, DEFAULT_LOCAL)));
            }
            Some(DefaultExport::Expression { prefix }) => {
                editor.overwrite(
                    prefix.0,
                    prefix.1,
                    format!("var {} = ", self.local_name(m, DEFAULT_LOCAL)),
                );
            }
            None => {}
        }

        for symbol in &analysis.symbols {
            let replacement = match self.imports[m].get(&symbol.name) {
                Some(binding) => self.binding_text(binding),
                None => self.local_name(m, &symbol.name),
            };
            if replacement == symbol.name {
                continue;
            }
            for site in &symbol.sites {
                editor.rename(site.start, site.end, site.rewrite(&symbol.name, &replacement));
            }
        }

        for (dynamic, target) in analysis.dynamic_imports.iter().zip(&module.dynamic) {
            let text = match target {
                ModuleRef::Internal(t) => format!(
                    "Promise.resolve().then(function () {{ return {}; }})",
                    self.namespace_name(*t)
                ),
                ModuleRef::Stylesheet => "Promise.resolve()".to_string(),
                ModuleRef::External(_) => continue,
            };
            editor.overwrite(dynamic.start, dynamic.end, text);
        }

        let rendered = editor.render();
        (rendered.code, rendered.mappings)
    }

    fn render_namespace(&self, m: usize) -> Option<String> {
        let (name, members) = self.namespaces[m].as_ref()?;
        let mut out = format!("var {} = /*#__PURE__*/Object.freeze({{\n  __proto__: null", name);
        for (export, binding) in members {
            out.push_str(&format!(
                ",\n  get {}() {{ return {}; }}",
                export_key(export),
                self.binding_text(binding)
            ));
        }
        out.push_str("\n});\n");
        Some(out)
    }

    fn render_exports(&self, exports: &[(String, Binding)]) -> String {
        let mut out = String::new();
        let mut specs = Vec::new();
        for (name, binding) in exports {
            let text = self.binding_text(binding);
            let local = if is_identifier(&text) {
                text
            } else {
                // Expressions need a binding to export
                let local = format!("__export_{}", identifier_from(name));
                out.push_str(&format!("var {} = {};\n", local, text));
                local
            };
            let key = export_key(name);
            if local == key {
                specs.push(local);
            } else {
                specs.push(format!("{} as {}", local, key));
            }
        }
        if !specs.is_empty() {
            out.push_str(&format!("export {{ {} }};\n", specs.join(", ")));
        }
        for specifier in self.entry_external_stars() {
            out.push_str(&format!("export * from {};\n", quote(&specifier)));
        }
        out
    }
}

fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

/// Property or export name, quoted when it is not an identifier
fn export_key(name: &str) -> String {
    if is_identifier(name) || name == "default" {
        name.to_string()
    } else {
        quote(name)
    }
}

fn member_access(object: &str, property: &str) -> String {
    if is_identifier(property) {
        format!("{}.{}", object, property)
    } else {
        format!("{}[{}]", object, quote(property))
    }
}

fn line_count(code: &str) -> u32 {
    code.bytes().filter(|b| *b == b'\n').count() as u32
}

/// Source-map name for `path`, relative to `root` when possible
pub fn source_name(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
