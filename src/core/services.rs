use crate::core::graph::GraphBuilder;
use crate::core::interfaces::{BuildService, FileSystemService};
use crate::core::models::{BuildConfig, BuildResult, BuildState, Chunk, OutputFile};
use crate::core::plugin::{Pipeline, StageContext};
use crate::infrastructure::processors::linker::link;
use crate::plugins::build_pipeline;
use crate::utils::{to_json, Logger, PackError, Result, Timer};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Runs one build through the stage pipeline
pub struct PackBuildService {
    config: Arc<BuildConfig>,
    fs_service: Arc<dyn FileSystemService>,
    pipeline: Pipeline,
    state: Mutex<BuildState>,
}

impl PackBuildService {
    /// Validate the configuration and compose the configured stages
    pub fn new(config: BuildConfig, fs_service: Arc<dyn FileSystemService>) -> Result<Self> {
        let pipeline = build_pipeline(&config)?;
        Self::with_pipeline(config, fs_service, pipeline)
    }

    /// Use a custom stage pipeline
    pub fn with_pipeline(
        mut config: BuildConfig,
        fs_service: Arc<dyn FileSystemService>,
        pipeline: Pipeline,
    ) -> Result<Self> {
        config.validate()?;
        if let Ok(root) = std::fs::canonicalize(&config.root) {
            config.root = root;
        }
        Ok(Self {
            config: Arc::new(config),
            fs_service,
            pipeline,
            state: Mutex::new(BuildState::Idle),
        })
    }

    pub fn state(&self) -> BuildState {
        *self.state.lock()
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// States only move forward; `Failed` is reachable from any live state
    fn transition(&self, next: BuildState) -> Result<()> {
        let mut state = self.state.lock();
        let current = *state;
        let allowed = match (current, next) {
            (BuildState::Done | BuildState::Failed, _) => false,
            (_, BuildState::Failed) => true,
            (current, next) => next > current,
        };
        if !allowed {
            return Err(PackError::config(format!(
                "invalid build state transition {} -> {}",
                current, next
            )));
        }
        tracing::debug!("build state: {} -> {}", current, next);
        *state = next;
        Ok(())
    }

    async fn entry_path(&self) -> Result<PathBuf> {
        let input = self.config.input_path();
        tokio::fs::canonicalize(&input).await.map_err(|_| {
            PackError::resolution(&self.config.root, &self.config.input.to_string_lossy())
        })
    }

    async fn run(&self, ctx: &StageContext, started: Instant) -> Result<BuildResult> {
        let out_dir = self.config.out_dir_path();

        self.transition(BuildState::Cleaning)?;
        Logger::build_start(&self.config.input_path(), &out_dir);
        Logger::stage("clean");
        self.pipeline.build_start(ctx).await?;

        self.transition(BuildState::Resolving)?;
        Logger::stage("resolve");
        let entry = self.entry_path().await?;
        let graph = {
            let _timer = Timer::start("Module graph");
            GraphBuilder::new(&self.pipeline, ctx).build(&entry).await?
        };
        let linked = {
            let _timer = Timer::start("Linking");
            link(&graph.modules, graph.entry, &self.config.out_file, self.config.sourcemap)?
        };

        self.transition(BuildState::Minifying)?;
        Logger::stage("render");
        let chunk = Chunk {
            file_name: self.config.out_file.clone(),
            code: linked.code,
            map: linked.map,
            exports: linked.exports,
        };
        let chunk = self.pipeline.render_chunk(chunk, ctx).await?;

        self.transition(BuildState::Writing)?;
        Logger::stage("write");
        let mut files = self.render_artifacts(chunk)?;
        files.extend(self.pipeline.generate_bundle(&graph.stylesheets, ctx).await?);
        let output_files = self.write_output_files(&out_dir, files).await?;

        let result = BuildResult {
            output_files,
            modules: graph.modules.iter().map(|m| m.path.clone()).collect(),
            externals: linked.externals,
            stylesheets: graph.stylesheets,
            build_time: started.elapsed(),
            warnings: ctx.take_warnings(),
        };
        self.pipeline.build_end(ctx, &result).await?;
        self.transition(BuildState::Done)?;

        Logger::build_complete(
            result.modules.len(),
            result.stylesheets.len(),
            result.externals.len(),
            result.build_time,
            &out_dir,
        );
        Ok(result)
    }

    /// JS bundle plus its map, named relative to the output directory
    fn render_artifacts(&self, chunk: Chunk) -> Result<Vec<OutputFile>> {
        let map_name = format!("{}.map", chunk.file_name);
        let mut code = chunk.code;
        if !code.ends_with('\n') {
            code.push('\n');
        }

        let mut files = Vec::new();
        match chunk.map.filter(|_| self.config.sourcemap) {
            Some(map) => {
                code.push_str(&format!("//# sourceMappingURL={}\n", map_name));
                let json = to_json(&map).map_err(|e| {
                    PackError::transform(Path::new(&map_name), format!("cannot serialize source map: {}", e))
                })?;
                files.push(OutputFile::new(PathBuf::from(&chunk.file_name), code));
                files.push(OutputFile::new(PathBuf::from(map_name), json));
            }
            None => files.push(OutputFile::new(PathBuf::from(&chunk.file_name), code)),
        }
        Ok(files)
    }

    /// Write every artifact or none: files go to a staging directory first
    /// and are renamed into place only once all of them are written.
    async fn write_output_files(&self, out_dir: &Path, files: Vec<OutputFile>) -> Result<Vec<OutputFile>> {
        let _timer = Timer::start("Writing output files");
        let staging = out_dir.join(format!(".esmpack-staging-{}", std::process::id()));

        let mut placed: Vec<PathBuf> = Vec::new();
        let outcome = self.stage_and_place(&staging, out_dir, &files, &mut placed).await;
        let cleanup = self.fs_service.remove_directory(&staging).await;

        if let Err(e) = outcome {
            for path in &placed {
                if let Err(remove_err) = self.fs_service.remove_file(path).await {
                    Logger::warn(&format!("could not roll back {}: {}", path.display(), remove_err));
                }
            }
            return Err(e);
        }
        cleanup?;

        Ok(files
            .into_iter()
            .map(|file| OutputFile {
                path: out_dir.join(&file.path),
                ..file
            })
            .collect())
    }

    async fn stage_and_place(
        &self,
        staging: &Path,
        out_dir: &Path,
        files: &[OutputFile],
        placed: &mut Vec<PathBuf>,
    ) -> Result<()> {
        self.fs_service.remove_directory(staging).await?;
        self.fs_service.create_directory(staging).await?;
        for file in files {
            self.fs_service
                .write_file(&staging.join(&file.path), &file.content)
                .await?;
        }
        for file in files {
            let target = out_dir.join(&file.path);
            self.fs_service.rename(&staging.join(&file.path), &target).await?;
            placed.push(target);
        }
        Ok(())
    }
}

#[async_trait]
impl BuildService for PackBuildService {
    async fn build(&self) -> Result<BuildResult> {
        let started = Instant::now();
        let ctx = StageContext::new(self.config.clone(), self.fs_service.clone());

        match self.run(&ctx, started).await {
            Ok(result) => Ok(result),
            Err(e) => {
                // A rejected second build leaves the finished state alone
                if self.state() != BuildState::Done {
                    let _ = self.transition(BuildState::Failed);
                }
                Logger::error(&format!("{} error: {}", e.stage(), e));
                Err(e)
            }
        }
    }
}
