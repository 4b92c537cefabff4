use std::path::{Path, PathBuf};
use thiserror::Error;

/// Filesystem operation that failed, reported alongside the path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOperation {
    Read,
    Write,
    Clean,
    CreateDir,
    Rename,
}

impl std::fmt::Display for IoOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            IoOperation::Read => "read",
            IoOperation::Write => "write",
            IoOperation::Clean => "clean",
            IoOperation::CreateDir => "create directory",
            IoOperation::Rename => "rename",
        };
        f.write_str(op)
    }
}

#[derive(Error, Debug)]
pub enum PackError {
    #[error("Cannot resolve '{specifier}' imported from {}", importer.display())]
    Resolution { importer: PathBuf, specifier: String },

    #[error("Failed to transform {}: {message}", path.display())]
    Transform { path: PathBuf, message: String },

    #[error("Import chain exceeds the depth limit: {}", format_chain(chain))]
    CycleDepthExceeded { chain: Vec<PathBuf> },

    #[error("Failed to {operation} {}: {source}", path.display())]
    Io {
        path: PathBuf,
        operation: IoOperation,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl PackError {
    pub fn resolution(importer: &Path, specifier: &str) -> Self {
        Self::Resolution {
            importer: importer.to_path_buf(),
            specifier: specifier.to_string(),
        }
    }

    pub fn transform(path: &Path, message: impl Into<String>) -> Self {
        Self::Transform {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn io(path: &Path, operation: IoOperation, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            operation,
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Short name of the pipeline stage the error belongs to
    pub fn stage(&self) -> &'static str {
        match self {
            PackError::Resolution { .. } => "resolve",
            PackError::Transform { .. } => "transform",
            PackError::CycleDepthExceeded { .. } => "graph",
            PackError::Io { .. } => "io",
            PackError::Config(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, PackError>;
