use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub struct Logger;

impl Logger {
    /// Install the global subscriber. `RUST_LOG` takes precedence over `verbose`.
    pub fn init(verbose: bool) {
        let default_level = if verbose { "esmpack=debug" } else { "esmpack=info" };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));

        // A second init (tests, embedding) keeps the first subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    pub fn build_start(input: &Path, out_dir: &Path) {
        info!("📦 esmpack - production build");
        info!("📁 Input: {}", input.display());
        info!("📂 Output: {}", out_dir.display());
    }

    pub fn stage(name: &str) {
        info!("▶ {}", name);
    }

    pub fn cleaned(out_dir: &Path, removed: usize) {
        info!("🧹 Cleaned {} ({} entries)", out_dir.display(), removed);
    }

    pub fn loading_module(path: &Path) {
        debug!("🔍 Loading module: {}", path.display());
    }

    pub fn external(specifier: &str, importer: &Path) {
        debug!("🔗 External '{}' from {}", specifier, importer.display());
    }

    pub fn extracting_css(path: &Path) {
        debug!("🎨 Extracting CSS: {}", path.display());
    }

    pub fn build_complete(
        modules: usize,
        stylesheets: usize,
        externals: usize,
        build_time: Duration,
        out_dir: &Path,
    ) {
        info!("📊 Build statistics:");
        info!("  • JS modules bundled: {}", modules);
        info!("  • Stylesheets extracted: {}", stylesheets);
        info!("  • External imports: {}", externals);
        info!("  • Build time: {:.2?}", build_time);
        info!("  • Output directory: {}", out_dir.display());
        info!("✅ Build completed");
    }

    pub fn error(msg: &str) {
        error!("❌ {}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("⚠️  {}", msg);
    }
}

pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("⏱️  Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
