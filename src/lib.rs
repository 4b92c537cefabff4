//! esmpack bundles one ES module entry point, its imports, CommonJS
//! dependencies and imported stylesheets into a single ES module, a CSS
//! file and a source map. Peer dependencies stay external.

pub mod cli;
pub mod core;
pub mod infrastructure;
pub mod plugins;
pub mod utils;

pub use crate::core::{BuildConfig, BuildResult, BuildService, PackBuildService};
pub use crate::infrastructure::TokioFileSystemService;
pub use crate::utils::{PackError, Result};
