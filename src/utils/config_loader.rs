use crate::core::models::BuildConfig;
use crate::utils::{IoOperation, PackError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default config file name, looked up in the project root
pub const CONFIG_FILE: &str = "esmpack.config.json";

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub input: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub minify: Option<bool>,
    pub sourcemap: Option<bool>,
    pub clean: Option<bool>,
    /// Added to the configured externals
    pub external: Vec<String>,
}

/// Config loader that supports config files with CLI override
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `explicit` if given, otherwise `esmpack.config.json` in `root`
    /// when it exists. A missing explicit file is an error.
    pub fn load_from_file(root: &Path, explicit: Option<&Path>) -> Result<Option<BuildConfig>> {
        let config_path = match explicit {
            Some(path) => {
                let path = root.join(path);
                if !path.is_file() {
                    return Err(PackError::config(format!(
                        "config file {} does not exist",
                        path.display()
                    )));
                }
                path
            }
            None => {
                let path = root.join(CONFIG_FILE);
                if !path.is_file() {
                    debug!("No {} found, using defaults", CONFIG_FILE);
                    return Ok(None);
                }
                path
            }
        };

        debug!("Loading config from {}", config_path.display());
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| PackError::io(&config_path, IoOperation::Read, e))?;

        let config: BuildConfig = serde_json::from_str(&content).map_err(|e| {
            PackError::config(format!("failed to parse {}: {}", config_path.display(), e))
        })?;
        Ok(Some(config))
    }

    /// Merge file config with CLI arguments (CLI takes precedence). A
    /// relative `root` in the file is taken relative to `root`.
    pub fn merge_with_cli(file_config: Option<BuildConfig>, root: PathBuf, cli: CliOverrides) -> BuildConfig {
        let mut config = file_config.unwrap_or_default();
        config.root = root.join(&config.root);

        if let Some(input) = cli.input {
            config.input = input;
        }
        if let Some(out_dir) = cli.out_dir {
            config.out_dir = out_dir;
        }
        if let Some(minify) = cli.minify {
            config.minify = minify;
        }
        if let Some(sourcemap) = cli.sourcemap {
            config.sourcemap = sourcemap;
        }
        if let Some(clean) = cli.clean {
            config.clean = clean;
        }
        for name in cli.external {
            if !config.external.contains(&name) {
                config.external.push(name);
            }
        }
        config
    }

    /// Example config file content
    pub fn generate_example() -> String {
        serde_json::to_string_pretty(&BuildConfig {
            input: PathBuf::from("./src/leaflet_rollup.js"),
            ..BuildConfig::default()
        })
        .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_file_not_exists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = ConfigLoader::load_from_file(temp_dir.path(), None).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::load_from_file(temp_dir.path(), Some(Path::new("nope.json"))).unwrap_err();
        assert!(matches!(err, PackError::Config(_)));
    }

    #[test]
    fn test_load_from_file_valid() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE),
            r#"{ "input": "./src/leaflet_rollup.js", "outDir": "build", "minify": false, "external": ["leaflet"] }"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(temp_dir.path(), None).unwrap().unwrap();
        assert_eq!(config.input, PathBuf::from("./src/leaflet_rollup.js"));
        assert_eq!(config.out_dir, PathBuf::from("build"));
        assert!(!config.minify);
        assert!(config.sourcemap);
        assert_eq!(config.external, vec!["leaflet"]);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join(CONFIG_FILE), "{ not json").unwrap();
        let err = ConfigLoader::load_from_file(temp_dir.path(), None).unwrap_err();
        assert!(matches!(err, PackError::Config(_)));
    }

    #[test]
    fn test_merge_with_cli_override() {
        let file_config = BuildConfig {
            out_dir: PathBuf::from("build"),
            minify: false,
            external: vec!["leaflet".to_string()],
            ..Default::default()
        };

        let merged = ConfigLoader::merge_with_cli(
            Some(file_config),
            PathBuf::from("/project"),
            CliOverrides {
                out_dir: Some(PathBuf::from("dist-override")),
                minify: Some(true),
                external: vec!["leaflet".to_string(), "react".to_string()],
                ..Default::default()
            },
        );

        assert_eq!(merged.root, PathBuf::from("/project/."));
        assert_eq!(merged.out_dir, PathBuf::from("dist-override"));
        assert!(merged.minify);
        assert_eq!(merged.external, vec!["leaflet", "react"]);
    }

    #[test]
    fn test_generate_example_round_trips() {
        let example = ConfigLoader::generate_example();
        assert!(example.contains("\"outDir\""));
        let parsed: BuildConfig = serde_json::from_str(&example).unwrap();
        assert!(parsed.validate().is_ok());
    }
}
