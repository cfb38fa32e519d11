//! Configuration loader with multi-source merging

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;

use crate::SteepConfig;

/// Project-level config file name.
const PROJECT_CONFIG: &str = "steep.toml";

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "STEEP".to_string(),
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "STEEP")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<SteepConfig> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        let defaults = SteepConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/steep/config.toml)
        if let Some(dirs) = ProjectDirs::from("", "", "steep") {
            let user_config = dirs.config_dir().join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(
                    config::File::from(user_config)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        // 3. Project config (steep.toml)
        let project_config = self.project_dir.join(PROJECT_CONFIG);
        if project_config.exists() {
            builder = builder.add_source(
                config::File::from(project_config)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 4. Environment variables (STEEP_*)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .separator("_")
                .try_parsing(true),
        );

        let merged = builder.build().context("Failed to build configuration")?;
        merged
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default(self) -> SteepConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn load_defaults_without_files() {
        let temp = tempdir().unwrap();
        let config = ConfigLoader::new()
            .with_project_dir(temp.path())
            .load()
            .unwrap();
        assert_eq!(config.init.parallel_workers, 4);
    }

    #[test]
    fn project_file_overrides_defaults() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join(PROJECT_CONFIG),
            "[node]\nid = \"west-2\"\n\n[init]\nparallel_workers = 2\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_project_dir(temp.path())
            .load()
            .unwrap();
        assert_eq!(config.node.id, "west-2");
        assert_eq!(config.init.parallel_workers, 2);
        // Untouched sections keep defaults.
        assert_eq!(config.database.max_connections, 8);
    }
}
