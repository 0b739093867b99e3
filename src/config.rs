//! Configuration management for the converter
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (asset-convert.toml)
//! - Environment variables (ASSET_CONVERT__*)
//!
//! ## Example config file (asset-convert.toml):
//! ```toml
//! [catalog]
//! path = "./schemas"
//!
//! [output]
//! json_style = "pretty"
//!
//! [batch]
//! recursive = false
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::SchemaCatalog;
use crate::error::Result;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// Schema catalog settings
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Directory conversion settings
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Schema catalog configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Directory of catalog files; the embedded catalog is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// JSON layout
    #[serde(default)]
    pub json_style: JsonStyle,
}

/// Directory conversion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Descend into subdirectories, mirroring them under the output directory
    #[serde(default)]
    pub recursive: bool,
}

/// Layout of written JSON text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JsonStyle {
    #[default]
    Pretty,
    Compact,
}

impl ConvertConfig {
    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&Path>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "asset-convert.toml",
            ".asset-convert.toml",
            "config/asset-convert.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "asset-convert", "asset-convert") {
            let xdg_config = config_dir.config_dir().join("asset-convert.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // ASSET_CONVERT__OUTPUT__JSON_STYLE=compact
        builder = builder.add_source(
            Environment::with_prefix("ASSET_CONVERT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// The catalog this configuration selects
    pub fn catalog(&self) -> Result<CatalogSource> {
        match &self.catalog.path {
            Some(path) => Ok(CatalogSource::Loaded(Box::new(SchemaCatalog::from_directory(path)?))),
            None => Ok(CatalogSource::Embedded(SchemaCatalog::embedded()?)),
        }
    }
}

/// Either the process-wide embedded catalog or one loaded from disk
#[derive(Debug)]
pub enum CatalogSource {
    Embedded(&'static SchemaCatalog),
    Loaded(Box<SchemaCatalog>),
}

impl CatalogSource {
    pub fn get(&self) -> &SchemaCatalog {
        match self {
            CatalogSource::Embedded(catalog) => catalog,
            CatalogSource::Loaded(catalog) => catalog,
        }
    }
}
