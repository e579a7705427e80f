use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::substages::{publish_catalog, SubstageCatalog};

const CONFIG_FILE_STEM: &str = "adw-progress";
const ENV_PREFIX: &str = "ADW_PROGRESS";

/// Main configuration structure for adw-progress
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct AdwProgressConfig {
    /// Logging settings
    pub logging: LoggingConfig,
    /// Substage catalog settings
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
    /// Emit structured JSON log lines
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// TOML file whose stage tables replace the built-in ones
    pub override_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl AdwProgressConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (adw-progress.toml)
    /// 3. Environment variables (prefixed with ADW_PROGRESS_, nested with __)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if Path::new(&format!("{CONFIG_FILE_STEM}.toml")).exists() {
            builder = builder.add_source(File::with_name(CONFIG_FILE_STEM));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Load from an explicit file instead of the working directory
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from(path.as_ref()))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    /// Publish the override catalog, if one is configured
    pub fn apply_catalog_override(&self) -> Result<()> {
        if let Some(path) = &self.catalog.override_path {
            let catalog = SubstageCatalog::from_file(path)?;
            publish_catalog(catalog);
            tracing::info!(path = %path, "Applied substage catalog override");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<AdwProgressConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = AdwProgressConfig::load_env_file();
        AdwProgressConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static AdwProgressConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<&'static AdwProgressConfig> {
    let config = config()?;
    config.apply_catalog_override()?;
    tracing::info!("Configuration loaded successfully");
    Ok(config)
}
