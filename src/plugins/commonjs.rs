// CommonJS interop: modules written against `module.exports` and
// `require()` are rewritten into ES modules.

use crate::core::models::{ModuleKind, SourceModule, TransformOutput};
use crate::core::plugin::{Stage, StageContext};
use crate::infrastructure::processors::commonjs::transform_commonjs;
use crate::utils::Result;
use async_trait::async_trait;

#[derive(Default)]
pub struct CommonJs;

impl CommonJs {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for CommonJs {
    fn name(&self) -> &str {
        "commonjs"
    }

    async fn transform(
        &self,
        module: &SourceModule,
        ctx: &StageContext,
    ) -> Result<Option<TransformOutput>> {
        if module.kind != ModuleKind::JavaScript {
            return Ok(None);
        }

        let config = &ctx.config;
        let output = transform_commonjs(&module.path, &module.code, |specifier| {
            config.is_stylesheet_specifier(specifier)
        })?;
        let Some(output) = output else {
            return Ok(None);
        };

        tracing::debug!(
            "commonjs: {} ({} named exports)",
            module.path.display(),
            output.meta.named_exports.len()
        );
        for warning in output.warnings {
            ctx.warn(warning);
        }

        Ok(Some(TransformOutput::Code {
            code: output.code,
            map: Some(output.map),
            commonjs: Some(output.meta),
        }))
    }
}
