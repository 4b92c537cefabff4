// Removes the previous build's artifacts before anything is emitted.

use crate::core::plugin::{Stage, StageContext};
use crate::utils::{Logger, PackError, Result};
use async_trait::async_trait;
use std::path::PathBuf;

pub struct OutputCleaner {
    out_dir: PathBuf,
}

impl OutputCleaner {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }
}

#[async_trait]
impl Stage for OutputCleaner {
    fn name(&self) -> &str {
        "clean"
    }

    async fn build_start(&self, ctx: &StageContext) -> Result<()> {
        if !ctx.fs.dir_exists(&self.out_dir) {
            tracing::debug!("nothing to clean at {}", self.out_dir.display());
            return Ok(());
        }

        let out_dir = tokio::fs::canonicalize(&self.out_dir)
            .await
            .unwrap_or_else(|_| self.out_dir.clone());
        let root = tokio::fs::canonicalize(&ctx.root)
            .await
            .unwrap_or_else(|_| ctx.root.clone());
        if root.starts_with(&out_dir) {
            return Err(PackError::config(format!(
                "refusing to clean {}: it contains the project root",
                out_dir.display()
            )));
        }

        let removed = ctx.fs.clean_directory(&self.out_dir).await?;
        Logger::cleaned(&self.out_dir, removed);
        Ok(())
    }
}
