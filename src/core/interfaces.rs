use crate::core::models::*;
use crate::utils::Result;
use async_trait::async_trait;
use std::path::Path;

/// File system operations interface
#[async_trait]
pub trait FileSystemService: Send + Sync {
    async fn read_file(&self, path: &Path) -> Result<String>;
    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;
    async fn create_directory(&self, path: &Path) -> Result<()>;
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    async fn remove_directory(&self, path: &Path) -> Result<()>;
    /// Remove one file; a missing file is not an error
    async fn remove_file(&self, path: &Path) -> Result<()>;
    /// Remove every entry inside `path`, keeping `path` itself. Returns the
    /// number of top-level entries removed.
    async fn clean_directory(&self, path: &Path) -> Result<usize>;
    fn file_exists(&self, path: &Path) -> bool;
    fn dir_exists(&self, path: &Path) -> bool;
}

/// Build service interface
#[async_trait]
pub trait BuildService: Send + Sync {
    async fn build(&self) -> Result<BuildResult>;
}
