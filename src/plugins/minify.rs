// Final minification of the rendered bundle.

use crate::core::models::Chunk;
use crate::core::plugin::{Stage, StageContext};
use crate::infrastructure::{MinificationService, MinifyOptions};
use crate::utils::Result;
use async_trait::async_trait;
use tracing::info;

pub struct Minify {
    service: MinificationService,
}

impl Minify {
    pub fn new(legal_comments: bool) -> Self {
        Self {
            service: MinificationService::new(MinifyOptions {
                legal_comments,
                ..MinifyOptions::default()
            }),
        }
    }
}

#[async_trait]
impl Stage for Minify {
    fn name(&self) -> &str {
        "minify"
    }

    async fn render_chunk(&self, chunk: &Chunk, _ctx: &StageContext) -> Result<Option<Chunk>> {
        let (minified, stats) = self.service.minify_chunk(chunk.clone()).await?;
        info!("🗜️  {}", stats);
        Ok(Some(minified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::BuildConfig;
    use crate::infrastructure::TokioFileSystemService;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_minifies_chunk_keeping_exports() {
        let ctx = StageContext::new(
            Arc::new(BuildConfig::default()),
            Arc::new(TokioFileSystemService),
        );
        let chunk = Chunk {
            file_name: "bundle.js".to_string(),
            code: "function internalHelper(value) {\n  return value * 2;\n}\nconst doubled = internalHelper(21);\nexport { doubled };\n".to_string(),
            map: None,
            exports: vec!["doubled".to_string()],
        };

        let out = Minify::new(true).render_chunk(&chunk, &ctx).await.unwrap().unwrap();
        assert!(out.code.len() < chunk.code.len());
        assert!(!out.code.contains("internalHelper"));
        assert!(out.code.contains("doubled"));
        assert!(out.map.is_none());
    }
}
