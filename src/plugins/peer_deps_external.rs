// Peer dependency externalization: imports of packages the consumer
// provides are left as they are instead of being bundled.

use crate::core::models::ResolvedId;
use crate::core::plugin::{Stage, StageContext};
use crate::infrastructure::read_package_json;
use crate::utils::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::path::Path;

pub struct PeerDepsExternal {
    /// Names configured explicitly, on top of package.json
    extra: Vec<String>,
    read_manifest: bool,
    peers: RwLock<BTreeSet<String>>,
}

impl PeerDepsExternal {
    pub fn new(extra: Vec<String>, read_manifest: bool) -> Self {
        let peers = extra.iter().cloned().collect();
        Self {
            extra,
            read_manifest,
            peers: RwLock::new(peers),
        }
    }

    /// `leaflet` matches `leaflet` and `leaflet/dist/leaflet.css`
    pub fn matches(name: &str, specifier: &str) -> bool {
        specifier == name
            || specifier
                .strip_prefix(name)
                .map_or(false, |rest| rest.starts_with('/'))
    }

    pub fn is_external(&self, specifier: &str) -> bool {
        self.peers.read().iter().any(|name| Self::matches(name, specifier))
    }

    pub fn peers(&self) -> Vec<String> {
        self.peers.read().iter().cloned().collect()
    }
}

#[async_trait]
impl Stage for PeerDepsExternal {
    fn name(&self) -> &str {
        "peer-deps-external"
    }

    async fn build_start(&self, ctx: &StageContext) -> Result<()> {
        let mut peers: BTreeSet<String> = self.extra.iter().cloned().collect();
        if self.read_manifest {
            if let Some(pkg) = read_package_json(&ctx.root.join("package.json")).await {
                peers.extend(pkg.peer_dependencies.into_keys());
            }
        }
        tracing::debug!("peer dependencies: {:?}", peers);
        *self.peers.write() = peers;
        Ok(())
    }

    async fn resolve_id(
        &self,
        specifier: &str,
        _importer: &Path,
        _ctx: &StageContext,
    ) -> Result<Option<ResolvedId>> {
        if self.is_external(specifier) {
            return Ok(Some(ResolvedId::External(specifier.to_string())));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::BuildConfig;
    use crate::infrastructure::TokioFileSystemService;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_matches_name_and_subpaths_only() {
        assert!(PeerDepsExternal::matches("leaflet", "leaflet"));
        assert!(PeerDepsExternal::matches("leaflet", "leaflet/dist/leaflet.css"));
        assert!(!PeerDepsExternal::matches("leaflet", "leaflet-draw"));
        assert!(PeerDepsExternal::matches("@scope/pkg", "@scope/pkg/sub"));
        assert!(!PeerDepsExternal::matches("@scope/pkg", "@scope/pkg2"));
    }

    #[tokio::test]
    async fn test_reads_peer_dependencies_from_manifest() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{ "name": "map", "peerDependencies": { "leaflet": "^1.9", "react": "*" } }"#,
        )
        .unwrap();
        let ctx = StageContext::new(
            Arc::new(BuildConfig {
                root: dir.path().to_path_buf(),
                ..BuildConfig::default()
            }),
            Arc::new(TokioFileSystemService),
        );

        let stage = PeerDepsExternal::new(vec!["lodash".to_string()], true);
        stage.build_start(&ctx).await.unwrap();
        assert_eq!(stage.peers(), vec!["leaflet", "lodash", "react"]);

        let resolved = stage.resolve_id("react/jsx-runtime", Path::new("a.js"), &ctx).await.unwrap();
        assert_eq!(resolved, Some(ResolvedId::External("react/jsx-runtime".to_string())));
        assert_eq!(stage.resolve_id("./local", Path::new("a.js"), &ctx).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_manifest_ignored_when_disabled() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{ "peerDependencies": { "leaflet": "^1.9" } }"#,
        )
        .unwrap();
        let ctx = StageContext::new(
            Arc::new(BuildConfig {
                root: dir.path().to_path_buf(),
                ..BuildConfig::default()
            }),
            Arc::new(TokioFileSystemService),
        );
        let stage = PeerDepsExternal::new(Vec::new(), false);
        stage.build_start(&ctx).await.unwrap();
        assert!(!stage.is_external("leaflet"));
    }
}
