// Stylesheet extraction: stylesheet imports leave the JavaScript graph and
// their contents are collected into a separate artifact.

use crate::core::models::{ModuleKind, OutputFile, SourceModule, TransformOutput};
use crate::core::plugin::{Stage, StageContext};
use crate::infrastructure::LightningCssProcessor;
use crate::utils::{Logger, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;

pub struct CssExtractor {
    file_name: String,
    /// Contents seen during transform, keyed by path
    loaded: Mutex<HashMap<PathBuf, String>>,
}

impl CssExtractor {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            loaded: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Stage for CssExtractor {
    fn name(&self) -> &str {
        "css"
    }

    async fn build_start(&self, _ctx: &StageContext) -> Result<()> {
        self.loaded.lock().clear();
        Ok(())
    }

    async fn transform(
        &self,
        module: &SourceModule,
        ctx: &StageContext,
    ) -> Result<Option<TransformOutput>> {
        if module.kind != ModuleKind::Stylesheet {
            return Ok(None);
        }
        Logger::extracting_css(&module.path);

        LightningCssProcessor::new(ctx.fs.clone(), ctx.config.minify_css)
            .validate(&module.code, &module.path)?;
        self.loaded
            .lock()
            .insert(module.path.clone(), module.code.clone());
        Ok(Some(TransformOutput::Extracted))
    }

    async fn generate_bundle(
        &self,
        stylesheets: &[PathBuf],
        ctx: &StageContext,
    ) -> Result<Vec<OutputFile>> {
        if stylesheets.is_empty() {
            return Ok(Vec::new());
        }

        let preloaded = self.loaded.lock().clone();
        let processor = LightningCssProcessor::new(ctx.fs.clone(), ctx.config.minify_css);
        let bundle = processor.bundle_css(stylesheets, &preloaded).await?;
        tracing::debug!(
            "{} stylesheets concatenated into {}",
            bundle.sources.len(),
            self.file_name
        );

        Ok(vec![OutputFile::new(PathBuf::from(&self.file_name), bundle.code)])
    }
}
