// CommonJS to ES module rewrite.
//
// The module body runs unchanged inside a function that receives `module`
// and `exports`, so the exported object stays the single live object the
// code mutates. Literal `require()` calls are hoisted into imports and the
// call sites read the imported binding instead.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_semantic::{Scoping, SemanticBuilder};
use sourcemap::SourceMap;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::core::models::CommonJsMeta;
use crate::infrastructure::processors::js_scanner::parse;
use crate::utils::{map_from_rendered, Result, SourceEditor};

#[derive(Debug)]
pub struct CommonJsOutput {
    pub code: String,
    pub map: SourceMap,
    pub meta: CommonJsMeta,
    pub warnings: Vec<String>,
}

struct RequireSite {
    start: u32,
    end: u32,
    specifier: Option<String>,
}

struct CommonJsScanner<'s> {
    scoping: &'s Scoping,
    uses_module: bool,
    uses_exports: bool,
    requires: Vec<RequireSite>,
    named_exports: BTreeSet<String>,
    names: BTreeSet<String>,
}

impl<'s> CommonJsScanner<'s> {
    fn new(scoping: &'s Scoping) -> Self {
        Self {
            scoping,
            uses_module: false,
            uses_exports: false,
            requires: Vec::new(),
            named_exports: BTreeSet::new(),
            names: BTreeSet::new(),
        }
    }

    fn is_free(&self, ident: &IdentifierReference<'_>) -> bool {
        ident
            .reference_id
            .get()
            .map(|r| self.scoping.get_reference(r).symbol_id().is_none())
            .unwrap_or(true)
    }

    fn is_free_id(&self, expr: &Expression<'_>, name: &str) -> bool {
        matches!(expr, Expression::Identifier(ident) if ident.name == name && self.is_free(ident))
    }

    /// `module.exports`
    fn is_module_exports(&self, expr: &Expression<'_>) -> bool {
        matches!(expr, Expression::StaticMemberExpression(member)
            if member.property.name == "exports" && self.is_free_id(&member.object, "module"))
    }

    fn is_exports_object(&self, expr: &Expression<'_>) -> bool {
        self.is_free_id(expr, "exports") || self.is_module_exports(expr)
    }

    fn add_named(&mut self, name: &str) {
        if name != "default" && name != "__esModule" {
            self.named_exports.insert(name.to_string());
        }
    }
}

impl<'a, 's> Visit<'a> for CommonJsScanner<'s> {
    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        self.names.insert(it.name.to_string());
        if self.is_free(it) {
            match it.name.as_str() {
                "module" => self.uses_module = true,
                "exports" => self.uses_exports = true,
                _ => {}
            }
        }
    }

    fn visit_binding_identifier(&mut self, it: &BindingIdentifier<'a>) {
        self.names.insert(it.name.to_string());
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if self.is_free_id(&it.callee, "require") {
            self.requires.push(RequireSite {
                start: it.span.start,
                end: it.span.end,
                specifier: it.common_js_require().map(|lit| lit.value.to_string()),
            });
        } else if it.callee.is_specific_member_access("Object", "defineProperty")
            && it.arguments.len() >= 2
        {
            let target_is_exports = it.arguments[0]
                .as_expression()
                .map(|e| self.is_exports_object(e))
                .unwrap_or(false);
            if let (true, Argument::StringLiteral(name)) = (target_is_exports, &it.arguments[1]) {
                let name = name.value.to_string();
                self.add_named(&name);
            }
        }
        walk::walk_call_expression(self, it);
    }

    fn visit_assignment_expression(&mut self, it: &AssignmentExpression<'a>) {
        if let AssignmentTarget::StaticMemberExpression(member) = &it.left {
            if self.is_exports_object(&member.object) {
                let name = member.property.name.to_string();
                self.add_named(&name);
            } else if member.property.name == "exports" && self.is_free_id(&member.object, "module") {
                if let Expression::ObjectExpression(obj) = &it.right {
                    for prop in &obj.properties {
                        if let ObjectPropertyKind::ObjectProperty(p) = prop {
                            if let Some(name) = p.key.static_name() {
                                if !p.computed {
                                    self.add_named(&name);
                                }
                            }
                        }
                    }
                }
            }
        }
        walk::walk_assignment_expression(self, it);
    }
}

fn unique_name(base: &str, used: &mut BTreeSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut n = 1;
    while used.contains(&candidate) {
        candidate = format!("{}${}", base, n);
        n += 1;
    }
    used.insert(candidate.clone());
    candidate
}

/// Rewrite a CommonJS module into an ES module. Returns `None` when the
/// module has ES module syntax or never touches `module`, `exports` or
/// `require`.
pub fn transform_commonjs(
    path: &Path,
    code: &str,
    is_stylesheet: impl Fn(&str) -> bool,
) -> Result<Option<CommonJsOutput>> {
    let allocator = Allocator::default();
    let ret = parse(&allocator, path, code)?;
    if ret.program.source_type.is_module() {
        return Ok(None);
    }

    let semantic = SemanticBuilder::new().build(&ret.program).semantic;
    let mut scanner = CommonJsScanner::new(semantic.scoping());
    scanner.visit_program(&ret.program);

    if !scanner.uses_module && !scanner.uses_exports && scanner.requires.is_empty() {
        return Ok(None);
    }

    let mut used = std::mem::take(&mut scanner.names);
    used.extend(["module".to_string(), "exports".to_string(), "require".to_string()]);
    let module_object = unique_name("__cjs_module", &mut used);

    let mut warnings = Vec::new();
    let mut bindings: BTreeMap<String, String> = BTreeMap::new();
    let mut prefix = String::new();
    let mut require_bindings = BTreeSet::new();
    let mut editor = SourceEditor::new(code);

    for site in &scanner.requires {
        let Some(specifier) = &site.specifier else {
            warnings.push(format!(
                "{}: dynamic require() left as-is at offset {}",
                path.display(),
                site.start
            ));
            continue;
        };
        let quoted = serde_json::to_string(specifier).unwrap_or_else(|_| format!("\"{}\"", specifier));

        if is_stylesheet(specifier) {
            if !bindings.contains_key(specifier) {
                prefix.push_str(&format!("import {};\n", quoted));
                bindings.insert(specifier.clone(), String::new());
            }
            editor.overwrite(site.start, site.end, "void 0");
            continue;
        }

        let binding = match bindings.get(specifier) {
            Some(existing) => existing.clone(),
            None => {
                let name = unique_name(&format!("__require{}", bindings.len()), &mut used);
                prefix.push_str(&format!("import * as {} from {};\n", name, quoted));
                bindings.insert(specifier.clone(), name.clone());
                require_bindings.insert(name.clone());
                name
            }
        };
        editor.overwrite(site.start, site.end, binding);
    }

    if code.starts_with("#!") {
        editor.overwrite(0, 2, "//");
    }

    let m = &module_object;
    prefix.push_str(&format!(
        "var {m} = {{ exports: {{}} }};\n(function (module, exports) {{\n"
    ));
    editor.insert(0, prefix);
    editor.insert(
        code.len() as u32,
        format!(
            "\n}}).call({m}.exports, {m}, {m}.exports);\nexport default {m}.exports && {m}.exports.__esModule ? {m}.exports.default : {m}.exports;\n"
        ),
    );

    let rendered = editor.render();
    let file = path.display().to_string();
    let map = map_from_rendered(&file, &file, code, &rendered);

    Ok(Some(CommonJsOutput {
        code: rendered.code,
        map,
        meta: CommonJsMeta {
            module_object,
            require_bindings,
            named_exports: scanner.named_exports,
        },
        warnings,
    }))
}
