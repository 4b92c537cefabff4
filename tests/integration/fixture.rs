use async_trait::async_trait;
use esmpack::core::{BuildConfig, BuildResult, BuildService, FileSystemService, PackBuildService};
use esmpack::infrastructure::TokioFileSystemService;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

/// A throwaway project tree
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().canonicalize().unwrap()
    }

    pub fn write(&self, name: &str, content: &str) -> &Self {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
        self
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).unwrap()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Import the built bundle with node and return what `script` prints.
    /// `None` when node is not installed.
    pub fn run_node(&self, script: &str) -> Option<String> {
        self.write("run-bundle.mjs", script);
        let output = Command::new("node")
            .arg("run-bundle.mjs")
            .current_dir(self.dir.path())
            .output()
            .ok()?;
        assert!(
            output.status.success(),
            "node failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn config(&self, input: &str) -> BuildConfig {
        BuildConfig {
            root: self.root(),
            input: PathBuf::from(input),
            minify: false,
            ..BuildConfig::default()
        }
    }
}

pub async fn build(config: BuildConfig) -> esmpack::Result<BuildResult> {
    build_with(config, Arc::new(TokioFileSystemService)).await
}

pub async fn build_with(
    config: BuildConfig,
    fs: Arc<dyn FileSystemService>,
) -> esmpack::Result<BuildResult> {
    PackBuildService::new(config, fs)?.build().await
}

/// Records every path read through it
#[derive(Default)]
pub struct RecordingFs {
    inner: TokioFileSystemService,
    pub reads: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl FileSystemService for RecordingFs {
    async fn read_file(&self, path: &Path) -> esmpack::Result<String> {
        self.reads.lock().push(path.to_path_buf());
        self.inner.read_file(path).await
    }
    async fn write_file(&self, path: &Path, content: &str) -> esmpack::Result<()> {
        self.inner.write_file(path, content).await
    }
    async fn create_directory(&self, path: &Path) -> esmpack::Result<()> {
        self.inner.create_directory(path).await
    }
    async fn rename(&self, from: &Path, to: &Path) -> esmpack::Result<()> {
        self.inner.rename(from, to).await
    }
    async fn remove_directory(&self, path: &Path) -> esmpack::Result<()> {
        self.inner.remove_directory(path).await
    }
    async fn remove_file(&self, path: &Path) -> esmpack::Result<()> {
        self.inner.remove_file(path).await
    }
    async fn clean_directory(&self, path: &Path) -> esmpack::Result<usize> {
        self.inner.clean_directory(path).await
    }
    fn file_exists(&self, path: &Path) -> bool {
        self.inner.file_exists(path)
    }
    fn dir_exists(&self, path: &Path) -> bool {
        self.inner.dir_exists(path)
    }
}
