// Module graph discovery. Modules are loaded level by level with all loads
// of one level in flight at once; every path is loaded exactly once. The
// execution order is fixed afterwards by a depth-first post-order walk, so
// it never depends on which load finished first.

use futures::future::join_all;
use sourcemap::SourceMap;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::core::models::{ModuleKind, ResolvedId, SourceModule};
use crate::core::plugin::{Pipeline, StageContext, TransformedModule};
use crate::infrastructure::processors::js_scanner::{analyze, ModuleAnalysis};
use crate::infrastructure::processors::linker::{source_name, LinkModule, ModuleRef};
use crate::utils::{chain, map_from_rendered, Logger, PackError, Result, SourceEditor};

/// Discovered modules, ready for linking
#[derive(Debug)]
pub struct ModuleGraph {
    /// JavaScript modules in execution order
    pub modules: Vec<LinkModule>,
    pub entry: usize,
    /// Extracted stylesheets in depth-first discovery order
    pub stylesheets: Vec<PathBuf>,
    /// External specifiers in discovery order
    pub externals: Vec<String>,
}

#[derive(Debug, Clone)]
enum Edge {
    Node(usize),
    External(String),
}

struct Loaded {
    original: String,
    module: TransformedModule,
    analysis: Option<ModuleAnalysis>,
    records: Vec<ResolvedId>,
    dynamic: Vec<ResolvedId>,
}

struct Node {
    path: PathBuf,
    depth: usize,
    parent: Option<usize>,
    loaded: Option<Loaded>,
    records: Vec<Edge>,
    dynamic: Vec<Edge>,
}

/// Wrap a JSON document as `export default <json>;`
fn json_module(path: &Path, code: &str) -> Result<(String, SourceMap)> {
    serde_json::from_str::<serde_json::Value>(code)
        .map_err(|e| PackError::transform(path, format!("invalid JSON: {}", e)))?;

    let mut editor = SourceEditor::new(code);
    editor.insert(0, "export default ");
    editor.insert(code.trim_end().len() as u32, ";");
    let rendered = editor.render();
    let file = path.display().to_string();
    let map = map_from_rendered(&file, &file, code, &rendered);
    Ok((rendered.code, map))
}

pub struct GraphBuilder<'p> {
    pipeline: &'p Pipeline,
    ctx: &'p StageContext,
}

impl<'p> GraphBuilder<'p> {
    pub fn new(pipeline: &'p Pipeline, ctx: &'p StageContext) -> Self {
        Self { pipeline, ctx }
    }

    async fn resolve(&self, specifier: &str, importer: &Path) -> Result<ResolvedId> {
        self.pipeline
            .resolve_id(specifier, importer, self.ctx)
            .await?
            .ok_or_else(|| PackError::resolution(importer, specifier))
    }

    /// Read, transform, analyze and resolve one module
    async fn load(&self, path: PathBuf) -> Result<Loaded> {
        Logger::loading_module(&path);
        let original = self.ctx.fs.read_file(&path).await?;
        let kind = ModuleKind::detect(&path, &self.ctx.config);

        let (code, json_map) = match kind {
            ModuleKind::Json => {
                let (code, map) = json_module(&path, &original)?;
                (code, Some(map))
            }
            _ => (original.clone(), None),
        };

        let source = SourceModule {
            path: path.clone(),
            code,
            kind,
        };
        let mut module = self.pipeline.transform(source, self.ctx).await?;

        if module.extracted {
            return Ok(Loaded {
                original,
                module,
                analysis: None,
                records: Vec::new(),
                dynamic: Vec::new(),
            });
        }
        if kind == ModuleKind::Stylesheet {
            return Err(PackError::transform(
                &path,
                "stylesheet reached the JavaScript graph; enable the css stage",
            ));
        }

        if let Some(inner) = json_map {
            module.map = match module.map.take() {
                Some(outer) => Some(chain(&path.display().to_string(), &outer, &inner)),
                None => Some(inner),
            };
        }

        let analysis = analyze(&path, &module.code)?;
        let mut records = Vec::with_capacity(analysis.imports.len());
        for record in &analysis.imports {
            records.push(self.resolve(&record.specifier, &path).await?);
        }
        let mut dynamic = Vec::with_capacity(analysis.dynamic_imports.len());
        for import in &analysis.dynamic_imports {
            dynamic.push(self.resolve(&import.specifier, &path).await?);
        }

        Ok(Loaded {
            original,
            module,
            analysis: Some(analysis),
            records,
            dynamic,
        })
    }

    fn chain_to(nodes: &[Node], index: usize) -> Vec<PathBuf> {
        let mut chain = Vec::new();
        let mut current = Some(index);
        while let Some(i) = current {
            chain.push(nodes[i].path.clone());
            current = nodes[i].parent;
        }
        chain.reverse();
        chain
    }

    pub async fn build(&self, entry: &Path) -> Result<ModuleGraph> {
        let max_depth = self.ctx.config.max_depth;
        let mut nodes: Vec<Node> = vec![Node {
            path: entry.to_path_buf(),
            depth: 0,
            parent: None,
            loaded: None,
            records: Vec::new(),
            dynamic: Vec::new(),
        }];
        let mut index: HashMap<PathBuf, usize> = HashMap::new();
        index.insert(entry.to_path_buf(), 0);
        let mut externals: Vec<String> = Vec::new();
        let mut frontier = vec![0usize];

        while !frontier.is_empty() {
            let loads = frontier.iter().map(|&i| self.load(nodes[i].path.clone()));
            let results = join_all(loads).await;

            let mut next = Vec::new();
            for (&i, result) in frontier.iter().zip(results) {
                let loaded = result?;
                let depth = nodes[i].depth + 1;
                let importer = nodes[i].path.clone();

                let mut link = |resolved: &ResolvedId, nodes: &mut Vec<Node>| -> Result<Edge> {
                    match resolved {
                        ResolvedId::External(specifier) => {
                            Logger::external(specifier, &importer);
                            if !externals.contains(specifier) {
                                externals.push(specifier.clone());
                            }
                            Ok(Edge::External(specifier.clone()))
                        }
                        ResolvedId::Internal(path) => {
                            if let Some(&existing) = index.get(path) {
                                return Ok(Edge::Node(existing));
                            }
                            let id = nodes.len();
                            nodes.push(Node {
                                path: path.clone(),
                                depth,
                                parent: Some(i),
                                loaded: None,
                                records: Vec::new(),
                                dynamic: Vec::new(),
                            });
                            if depth > max_depth {
                                return Err(PackError::CycleDepthExceeded {
                                    chain: Self::chain_to(nodes, id),
                                });
                            }
                            index.insert(path.clone(), id);
                            next.push(id);
                            Ok(Edge::Node(id))
                        }
                    }
                };

                let records = loaded
                    .records
                    .iter()
                    .map(|r| link(r, &mut nodes))
                    .collect::<Result<Vec<_>>>()?;
                let dynamic = loaded
                    .dynamic
                    .iter()
                    .map(|r| link(r, &mut nodes))
                    .collect::<Result<Vec<_>>>()?;

                let node = &mut nodes[i];
                node.records = records;
                node.dynamic = dynamic;
                node.loaded = Some(loaded);
            }
            frontier = next;
        }

        self.order(nodes, externals)
    }

    /// Depth-first post-order from the entry. A module already on the stack
    /// is treated as satisfied, which is how cycles are broken.
    fn order(&self, mut nodes: Vec<Node>, externals: Vec<String>) -> Result<ModuleGraph> {
        let entry_is_js = nodes[0]
            .loaded
            .as_ref()
            .map(|l| !l.module.extracted)
            .unwrap_or(false);
        if !entry_is_js {
            return Err(PackError::transform(
                &nodes[0].path,
                "the entry must be a JavaScript module",
            ));
        }

        let mut visited: HashSet<usize> = HashSet::new();
        let mut order: Vec<usize> = Vec::new();
        let mut stylesheets: Vec<PathBuf> = Vec::new();
        let mut stack: Vec<(usize, usize)> = vec![(0, 0)];
        visited.insert(0);

        while let Some(&(node, child)) = stack.last() {
            let target = nodes[node]
                .records
                .iter()
                .chain(nodes[node].dynamic.iter())
                .filter_map(|e| match e {
                    Edge::Node(i) => Some(*i),
                    Edge::External(_) => None,
                })
                .nth(child);

            let Some(target) = target else {
                order.push(node);
                stack.pop();
                continue;
            };
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            if !visited.insert(target) {
                continue;
            }
            let extracted = nodes[target]
                .loaded
                .as_ref()
                .map(|l| l.module.extracted)
                .unwrap_or(false);
            if extracted {
                stylesheets.push(nodes[target].path.clone());
            } else {
                stack.push((target, 0));
            }
        }

        let position: HashMap<usize, usize> =
            order.iter().enumerate().map(|(pos, &node)| (node, pos)).collect();
        // Every JavaScript node is reachable, so a node without a position
        // is an extracted stylesheet
        let to_ref = |edge: &Edge| -> ModuleRef {
            match edge {
                Edge::External(specifier) => ModuleRef::External(specifier.clone()),
                Edge::Node(i) => match position.get(i) {
                    Some(&pos) => ModuleRef::Internal(pos),
                    None => ModuleRef::Stylesheet,
                },
            }
        };

        let refs: Vec<(Vec<ModuleRef>, Vec<ModuleRef>)> = order
            .iter()
            .map(|&i| {
                (
                    nodes[i].records.iter().map(to_ref).collect(),
                    nodes[i].dynamic.iter().map(to_ref).collect(),
                )
            })
            .collect();

        let mut modules = Vec::with_capacity(order.len());
        for (&i, (records, dynamic)) in order.iter().zip(refs) {
            let node = &mut nodes[i];
            let Some(loaded) = node.loaded.take() else { continue };
            let Some(analysis) = loaded.analysis else { continue };
            modules.push(LinkModule {
                path: node.path.clone(),
                source_name: source_name(&node.path, &self.ctx.root),
                code: loaded.module.code,
                original: loaded.original,
                map: loaded.module.map,
                analysis,
                commonjs: loaded.module.commonjs,
                records,
                dynamic,
            });
        }

        tracing::debug!(
            "graph: {} modules, {} stylesheets, {} externals",
            modules.len(),
            stylesheets.len(),
            externals.len()
        );

        Ok(ModuleGraph {
            entry: modules.len().saturating_sub(1),
            modules,
            stylesheets,
            externals,
        })
    }
}
