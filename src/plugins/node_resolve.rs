// Node-style resolution of relative, absolute and bare specifiers.

use crate::core::models::{BuildConfig, ResolvedId};
use crate::core::plugin::{Stage, StageContext};
use crate::infrastructure::NodeModuleResolver;
use crate::utils::Result;
use async_trait::async_trait;
use std::path::Path;

pub struct NodeResolve {
    resolver: NodeModuleResolver,
}

impl NodeResolve {
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            resolver: NodeModuleResolver::new(config.extensions.clone(), config.main_fields.clone()),
        }
    }
}

#[async_trait]
impl Stage for NodeResolve {
    fn name(&self) -> &str {
        "node-resolve"
    }

    async fn resolve_id(
        &self,
        specifier: &str,
        importer: &Path,
        _ctx: &StageContext,
    ) -> Result<Option<ResolvedId>> {
        let from_dir = importer.parent().unwrap_or_else(|| Path::new("."));
        Ok(self
            .resolver
            .resolve(specifier, from_dir)
            .await
            .map(ResolvedId::Internal))
    }
}
