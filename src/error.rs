//! Error types for asset conversion

use std::path::PathBuf;

use thiserror::Error;

use crate::asset_type::AssetType;
use crate::format::Format;
use crate::wire::WireError;

/// Result type for conversion operations
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Conversion errors
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(Format),

    #[error("Unsupported asset type: {0}")]
    UnsupportedAssetType(AssetType),

    #[error("Asset type cannot be unknown: {path}")]
    UnknownAssetType { path: PathBuf },

    #[error("Could not infer {what} from filename: {path}")]
    UnknownFromFilename { what: &'static str, path: PathBuf },

    #[error("Failed to deserialize input file {path}: {reason}")]
    DeserializeFailed { path: PathBuf, reason: String },

    #[error("Failed to decode {schema}: {reason}")]
    Decode { schema: String, reason: String },

    #[error("Failed to encode {schema}: {reason}")]
    Encode { schema: String, reason: String },

    #[error("{0}")]
    Validation(String),

    #[error("Schema catalog error: {0}")]
    Catalog(String),

    #[error("Wire format error: {0}")]
    Wire(#[from] WireError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl ConvertError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog(message.into())
    }
}
