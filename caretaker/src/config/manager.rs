use super::{Config, TaskFile};
use anyhow::{anyhow, Result};
use glob::glob;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

use crate::constants::defaults::{CONFIG_DIR, CONFIG_DIR_ENV};

pub struct ConfigManager {
    config_dir: PathBuf,
    current_config: Arc<Config>,
}

impl ConfigManager {
    pub async fn new(config_dir: impl Into<PathBuf>) -> Result<Self> {
        let config_dir = config_dir.into();
        let config = Self::load_configuration(&config_dir).await?;
        Ok(Self {
            config_dir,
            current_config: Arc::new(config),
        })
    }

    /// Uses `$CARETAKER_CONFIG_DIR`, falling back to `./config`
    pub async fn from_env() -> Result<Self> {
        let dir = std::env::var(CONFIG_DIR_ENV).unwrap_or_else(|_| CONFIG_DIR.to_string());
        Self::new(dir).await
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    async fn load_configuration(config_dir: &Path) -> Result<Config> {
        let main_config_path = config_dir.join("main.toml");
        let main_config_content = fs::read_to_string(&main_config_path)
            .await
            .map_err(|e| anyhow!("Failed to read main config {}: {}", main_config_path.display(), e))?;

        let mut config: Config = toml::from_str(&main_config_content)
            .map_err(|e| anyhow!("Failed to parse main config: {}", e))?;

        let pattern = format!("{}/*.toml", config_dir.display());
        let mut paths = Vec::new();
        for entry in glob(&pattern).map_err(|e| anyhow!("Glob pattern error: {}", e))? {
            let path = entry.map_err(|e| anyhow!("Glob entry error: {}", e))?;
            if path.file_name().and_then(|name| name.to_str()) == Some("main.toml") {
                continue;
            }
            paths.push(path);
        }
        // task order in the registry follows file name order
        paths.sort();

        for path in paths {
            debug!("Loading task file: {}", path.display());

            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;

            let task_file: TaskFile = toml::from_str(&content)
                .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;

            config.backups.extend(task_file.backups);
            config.certificates.extend(task_file.certificates);
            config.pipelines.extend(task_file.pipelines);
        }

        config.validate()?;

        info!(
            "Loaded {} backup tasks, {} certificate tasks, {} pipelines",
            config.backups.len(),
            config.certificates.len(),
            config.pipelines.len()
        );

        Ok(config)
    }
}
