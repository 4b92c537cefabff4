use crate::core::{BuildResult, BuildService, FileSystemService, PackBuildService, DEFAULT_STAGES};
use crate::infrastructure::TokioFileSystemService;
use crate::utils::{CliOverrides, ConfigLoader, Logger, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "esmpack")]
#[command(version)]
#[command(about = "esmpack - single-entry ES module bundler")]
pub struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build for production
    Build {
        /// Root directory
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
        /// Entry module, relative to the root
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Output directory
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
        /// Disable minification
        #[arg(long)]
        no_minify: bool,
        /// Do not emit a source map
        #[arg(long)]
        no_sourcemap: bool,
        /// Keep the previous contents of the output directory
        #[arg(long)]
        no_clean: bool,
        /// Treat a package as external (repeatable)
        #[arg(short, long = "external", value_name = "NAME")]
        external: Vec<String>,
        /// Config file, relative to the root
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show bundler information
    Info,
}

pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> Result<()> {
        let cli = Cli::parse();
        Logger::init(cli.verbose);

        match cli.command {
            Commands::Build {
                root,
                input,
                out_dir,
                no_minify,
                no_sourcemap,
                no_clean,
                external,
                config,
            } => {
                let overrides = CliOverrides {
                    input,
                    out_dir,
                    minify: no_minify.then_some(false),
                    sourcemap: no_sourcemap.then_some(false),
                    clean: no_clean.then_some(false),
                    external,
                };
                self.handle_build_command(root, config, overrides).await
            }
            Commands::Info => {
                self.handle_info_command();
                Ok(())
            }
        }
    }

    async fn handle_build_command(
        &self,
        root: PathBuf,
        config_file: Option<PathBuf>,
        overrides: CliOverrides,
    ) -> Result<()> {
        let file_config = ConfigLoader::load_from_file(&root, config_file.as_deref())?;
        let config = ConfigLoader::merge_with_cli(file_config, root, overrides);

        let fs_service: Arc<dyn FileSystemService> = Arc::new(TokioFileSystemService);
        let service = PackBuildService::new(config, fs_service)?;
        let result = service.build().await?;
        self.print_summary(&result);
        Ok(())
    }

    fn print_summary(&self, result: &BuildResult) {
        println!("{}", "✅ Build succeeded".green().bold());
        for file in &result.output_files {
            println!("  {} {} ({} bytes)", "•".cyan(), file.path.display(), file.size);
        }
        if !result.externals.is_empty() {
            println!("  {} external: {}", "•".cyan(), result.externals.join(", "));
        }
        for warning in &result.warnings {
            println!("  {} {}", "warning:".yellow(), warning);
        }
        println!("  {} {:.2?}", "⏱".cyan(), result.build_time);
    }

    fn handle_info_command(&self) {
        println!("{} {}", "esmpack".bold(), env!("CARGO_PKG_VERSION"));
        println!("Output format: esm (single entry, single chunk)");
        println!("Stages: {}", DEFAULT_STAGES.join(" → "));
        println!("Config file: {}", crate::utils::CONFIG_FILE);
    }
}

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}
