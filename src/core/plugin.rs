// Stage pipeline: an ordered list of build stages sharing one set of hooks.

use crate::core::interfaces::FileSystemService;
use crate::core::models::{
    BuildConfig, BuildResult, Chunk, CommonJsMeta, OutputFile, ResolvedId, SourceModule,
    TransformOutput,
};
use crate::utils::{chain, Logger, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use sourcemap::SourceMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Context provided to stages during execution
pub struct StageContext {
    /// Project root directory
    pub root: PathBuf,
    /// Current build configuration
    pub config: Arc<BuildConfig>,
    pub fs: Arc<dyn FileSystemService>,
    warnings: Mutex<Vec<String>>,
}

impl StageContext {
    pub fn new(config: Arc<BuildConfig>, fs: Arc<dyn FileSystemService>) -> Self {
        Self {
            root: config.root.clone(),
            config,
            fs,
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Record a non-fatal problem; it is logged and reported in the result
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        Logger::warn(&message);
        self.warnings.lock().push(message);
    }

    pub fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut *self.warnings.lock())
    }
}

/// A build stage. Every hook is optional.
///
/// Hooks run in registration order:
/// - `build_start` before anything else (cleanup, config reads)
/// - `resolve_id` per import specifier, first answer wins
/// - `transform` per loaded module, chained
/// - `render_chunk` on the emitted bundle, chained
/// - `generate_bundle` to add extra artifacts
/// - `build_end` after a successful build
#[async_trait]
pub trait Stage: Send + Sync {
    /// Unique name for this stage
    fn name(&self) -> &str;

    async fn build_start(&self, _ctx: &StageContext) -> Result<()> {
        Ok(())
    }

    /// Return `Some` to settle the specifier, `None` to defer to later stages
    async fn resolve_id(
        &self,
        _specifier: &str,
        _importer: &Path,
        _ctx: &StageContext,
    ) -> Result<Option<ResolvedId>> {
        Ok(None)
    }

    async fn transform(
        &self,
        _module: &SourceModule,
        _ctx: &StageContext,
    ) -> Result<Option<TransformOutput>> {
        Ok(None)
    }

    async fn render_chunk(&self, _chunk: &Chunk, _ctx: &StageContext) -> Result<Option<Chunk>> {
        Ok(None)
    }

    /// Extra artifacts, named relative to the output directory.
    /// `stylesheets` lists extracted stylesheets in traversal order.
    async fn generate_bundle(
        &self,
        _stylesheets: &[PathBuf],
        _ctx: &StageContext,
    ) -> Result<Vec<OutputFile>> {
        Ok(Vec::new())
    }

    async fn build_end(&self, _ctx: &StageContext, _result: &BuildResult) -> Result<()> {
        Ok(())
    }
}

/// A module after the transform chain
#[derive(Debug)]
pub struct TransformedModule {
    pub code: String,
    /// Map from `code` back to the loaded source, if any stage changed it
    pub map: Option<SourceMap>,
    pub commonjs: Option<CommonJsMeta>,
    pub extracted: bool,
}

/// Ordered stage list
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn register(&mut self, stage: Arc<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn build_start(&self, ctx: &StageContext) -> Result<()> {
        for stage in &self.stages {
            stage.build_start(ctx).await?;
        }
        Ok(())
    }

    pub async fn resolve_id(
        &self,
        specifier: &str,
        importer: &Path,
        ctx: &StageContext,
    ) -> Result<Option<ResolvedId>> {
        for stage in &self.stages {
            if let Some(resolved) = stage.resolve_id(specifier, importer, ctx).await? {
                return Ok(Some(resolved));
            }
        }
        Ok(None)
    }

    /// Run the transform chain. Each stage sees the previous stage's code;
    /// source maps are chained so the result maps to the loaded source.
    pub async fn transform(
        &self,
        module: SourceModule,
        ctx: &StageContext,
    ) -> Result<TransformedModule> {
        let mut current = module;
        let mut map: Option<SourceMap> = None;
        let mut commonjs = None;

        for stage in &self.stages {
            match stage.transform(&current, ctx).await? {
                None => {}
                Some(TransformOutput::Extracted) => {
                    return Ok(TransformedModule {
                        code: String::new(),
                        map: None,
                        commonjs: None,
                        extracted: true,
                    });
                }
                Some(TransformOutput::Code {
                    code,
                    map: stage_map,
                    commonjs: meta,
                }) => {
                    map = match (stage_map, map) {
                        (Some(outer), Some(inner)) => {
                            let file = current.path.display().to_string();
                            Some(chain(&file, &outer, &inner))
                        }
                        (Some(outer), None) => Some(outer),
                        (None, previous) => previous,
                    };
                    if meta.is_some() {
                        commonjs = meta;
                    }
                    current.code = code;
                }
            }
        }

        Ok(TransformedModule {
            code: current.code,
            map,
            commonjs,
            extracted: false,
        })
    }

    pub async fn render_chunk(&self, mut chunk: Chunk, ctx: &StageContext) -> Result<Chunk> {
        for stage in &self.stages {
            if let Some(rendered) = stage.render_chunk(&chunk, ctx).await? {
                chunk = rendered;
            }
        }
        Ok(chunk)
    }

    pub async fn generate_bundle(
        &self,
        stylesheets: &[PathBuf],
        ctx: &StageContext,
    ) -> Result<Vec<OutputFile>> {
        let mut files = Vec::new();
        for stage in &self.stages {
            files.extend(stage.generate_bundle(stylesheets, ctx).await?);
        }
        Ok(files)
    }

    pub async fn build_end(&self, ctx: &StageContext, result: &BuildResult) -> Result<()> {
        for stage in &self.stages {
            stage.build_end(ctx, result).await?;
        }
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
