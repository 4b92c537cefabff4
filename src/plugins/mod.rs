// Built-in build stages

pub mod commonjs;
pub mod css_extractor;
pub mod minify;
pub mod node_resolve;
pub mod output_cleaner;
pub mod peer_deps_external;

pub use commonjs::CommonJs;
pub use css_extractor::CssExtractor;
pub use minify::Minify;
pub use node_resolve::NodeResolve;
pub use output_cleaner::OutputCleaner;
pub use peer_deps_external::PeerDepsExternal;

use crate::core::models::BuildConfig;
use crate::core::plugin::{Pipeline, Stage};
use crate::utils::{PackError, Result};
use std::sync::Arc;

/// Instantiate one built-in stage by name
pub fn create_stage(name: &str, config: &BuildConfig) -> Result<Arc<dyn Stage>> {
    let stage: Arc<dyn Stage> = match name {
        "peer-deps-external" => Arc::new(PeerDepsExternal::new(
            config.external.clone(),
            config.peer_deps_external,
        )),
        "clean" => Arc::new(OutputCleaner::new(config.out_dir_path())),
        "css" => Arc::new(CssExtractor::new(config.css_file.clone())),
        "node-resolve" => Arc::new(NodeResolve::new(config)),
        "commonjs" => Arc::new(CommonJs::new()),
        "minify" => Arc::new(Minify::new(config.legal_comments)),
        other => return Err(PackError::config(format!("unknown stage '{}'", other))),
    };
    Ok(stage)
}

/// Compose the configured stages in order. `clean` and `minify` are left out
/// when switched off in the configuration.
pub fn build_pipeline(config: &BuildConfig) -> Result<Pipeline> {
    config.validate()?;

    let mut pipeline = Pipeline::new();
    for name in &config.stages {
        let enabled = match name.as_str() {
            "clean" => config.clean,
            "minify" => config.minify,
            _ => true,
        };
        if enabled {
            pipeline.register(create_stage(name, config)?);
        }
    }
    Ok(pipeline)
}
