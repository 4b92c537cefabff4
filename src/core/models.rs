use serde::{Deserialize, Serialize};
use sourcemap::SourceMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::{PackError, Result};

/// Names of the built-in stages, in the default composition order
pub const DEFAULT_STAGES: &[&str] = &[
    "peer-deps-external",
    "clean",
    "css",
    "node-resolve",
    "commonjs",
    "minify",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Esm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_input")]
    pub input: PathBuf,
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    #[serde(default = "default_out_file")]
    pub out_file: String,
    #[serde(default = "default_css_file")]
    pub css_file: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub sourcemap: bool,
    #[serde(default = "default_true")]
    pub minify: bool,
    #[serde(default)]
    pub minify_css: bool,
    #[serde(default = "default_true")]
    pub clean: bool,
    #[serde(default)]
    pub external: Vec<String>,
    #[serde(default = "default_true")]
    pub peer_deps_external: bool,
    #[serde(default = "default_css_extensions")]
    pub css_extensions: Vec<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_main_fields")]
    pub main_fields: Vec<String>,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_true")]
    pub legal_comments: bool,
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_input() -> PathBuf {
    PathBuf::from("src/index.js")
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_out_file() -> String {
    "bundle.js".to_string()
}

fn default_css_file() -> String {
    "bundle.css".to_string()
}

fn default_format() -> String {
    "esm".to_string()
}

fn default_true() -> bool {
    true
}

fn default_css_extensions() -> Vec<String> {
    vec!["css".to_string()]
}

fn default_extensions() -> Vec<String> {
    [".mjs", ".js", ".json", ".cjs"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_main_fields() -> Vec<String> {
    vec!["module".to_string(), "main".to_string()]
}

fn default_max_depth() -> usize {
    512
}

fn default_stages() -> Vec<String> {
    DEFAULT_STAGES.iter().map(|s| s.to_string()).collect()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            input: default_input(),
            out_dir: default_out_dir(),
            out_file: default_out_file(),
            css_file: default_css_file(),
            format: default_format(),
            sourcemap: true,
            minify: true,
            minify_css: false,
            clean: true,
            external: Vec::new(),
            peer_deps_external: true,
            css_extensions: default_css_extensions(),
            extensions: default_extensions(),
            main_fields: default_main_fields(),
            max_depth: default_max_depth(),
            legal_comments: true,
            stages: default_stages(),
        }
    }
}

impl BuildConfig {
    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<OutputFormat> {
        if self.input.as_os_str().is_empty() {
            return Err(PackError::config("input must not be empty"));
        }
        let format = match self.format.to_lowercase().as_str() {
            "esm" | "es" | "module" => OutputFormat::Esm,
            other => {
                return Err(PackError::config(format!(
                    "unsupported output format '{}', only 'esm' is available",
                    other
                )))
            }
        };
        let js_like = [".js", ".mjs"];
        if !js_like.iter().any(|ext| self.out_file.ends_with(ext)) || self.out_file.contains('/') {
            return Err(PackError::config(format!(
                "outFile '{}' must be a plain .js or .mjs file name",
                self.out_file
            )));
        }
        if self.css_file.is_empty() || self.css_file.contains('/') {
            return Err(PackError::config(format!(
                "cssFile '{}' must be a plain file name",
                self.css_file
            )));
        }
        if self.extensions.is_empty() {
            return Err(PackError::config("extensions must list at least one entry"));
        }
        if let Some(bad) = self.extensions.iter().find(|e| !e.starts_with('.')) {
            return Err(PackError::config(format!(
                "extension '{}' must start with a dot",
                bad
            )));
        }
        if self.max_depth == 0 {
            return Err(PackError::config("maxDepth must be greater than zero"));
        }
        if let Some(unknown) = self
            .stages
            .iter()
            .find(|s| !DEFAULT_STAGES.contains(&s.as_str()))
        {
            return Err(PackError::config(format!("unknown stage '{}'", unknown)));
        }
        Ok(format)
    }

    pub fn input_path(&self) -> PathBuf {
        self.root.join(&self.input)
    }

    pub fn out_dir_path(&self) -> PathBuf {
        self.root.join(&self.out_dir)
    }

    pub fn is_stylesheet(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.css_extensions.iter().any(|c| c.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    /// Stylesheet check on a raw specifier, before resolution
    pub fn is_stylesheet_specifier(&self, specifier: &str) -> bool {
        let clean = specifier.split(['?', '#']).next().unwrap_or(specifier);
        self.is_stylesheet(Path::new(clean))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    JavaScript,
    Json,
    Stylesheet,
}

impl ModuleKind {
    pub fn detect(path: &Path, config: &BuildConfig) -> Self {
        if config.is_stylesheet(path) {
            return ModuleKind::Stylesheet;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ModuleKind::Json,
            _ => ModuleKind::JavaScript,
        }
    }
}

/// Outcome of the resolve hook chain for one specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedId {
    Internal(PathBuf),
    External(String),
}

/// A loaded module handed to transform hooks
#[derive(Debug, Clone)]
pub struct SourceModule {
    pub path: PathBuf,
    pub code: String,
    pub kind: ModuleKind,
}

/// Facts a CommonJS rewrite leaves for the linker
#[derive(Debug, Clone, Default)]
pub struct CommonJsMeta {
    /// Local name of the `{ exports }` holder object
    pub module_object: String,
    /// Import bindings that stand for `require()` results
    pub require_bindings: BTreeSet<String>,
    /// Property names assigned on `exports` / `module.exports`
    pub named_exports: BTreeSet<String>,
}

/// Result of a transform hook
#[derive(Debug)]
pub enum TransformOutput {
    /// Replacement code, with an optional map back to the previous code
    Code {
        code: String,
        map: Option<SourceMap>,
        commonjs: Option<CommonJsMeta>,
    },
    /// The module was consumed as an asset and leaves the JS graph
    Extracted,
}

/// Rendered bundle handed to `render_chunk` hooks
#[derive(Debug, Clone)]
pub struct Chunk {
    pub file_name: String,
    pub code: String,
    pub map: Option<SourceMap>,
    /// Names the entry module exports; these stay intact
    pub exports: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildState {
    Idle,
    Cleaning,
    Resolving,
    Minifying,
    Writing,
    Done,
    Failed,
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BuildState::Idle => "idle",
            BuildState::Cleaning => "cleaning",
            BuildState::Resolving => "resolving",
            BuildState::Minifying => "minifying",
            BuildState::Writing => "writing",
            BuildState::Done => "done",
            BuildState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct OutputFile {
    pub path: PathBuf,
    pub content: String,
    pub size: usize,
}

impl OutputFile {
    pub fn new(path: PathBuf, content: String) -> Self {
        let size = content.len();
        Self {
            path,
            content,
            size,
        }
    }
}

#[derive(Debug, Default)]
pub struct BuildResult {
    pub output_files: Vec<OutputFile>,
    pub modules: Vec<PathBuf>,
    pub externals: Vec<String>,
    pub stylesheets: Vec<PathBuf>,
    pub build_time: Duration,
    pub warnings: Vec<String>,
}
