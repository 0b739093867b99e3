//! Format Registry
//!
//! Maps each [`Format`] to its file extension and codec pair. The table is
//! built once per process and never mutated, so lookups need no locking.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::catalog::Schema;
use crate::config::JsonStyle;
use crate::error::{ConvertError, Result};
use crate::json;
use crate::schema::Instance;
use crate::wire;

/// Byte-level encoding of an asset file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Unknown,
    Json,
    Bytes,
}

impl Format {
    /// Every format, `Unknown` included
    pub const ALL: [Format; 3] = [Format::Unknown, Format::Json, Format::Bytes];

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Unknown => "unknown",
            Format::Json => "json",
            Format::Bytes => "bytes",
        }
    }

    /// The registry entry for this format
    pub fn handler(self) -> Result<&'static FormatHandler> {
        FormatRegistry::global().resolve(self)
    }

    /// Format whose extension matches, ignoring case and a leading dot
    pub fn from_extension(ext: &str) -> Format {
        FormatRegistry::global().lookup_extension(ext)
    }

    /// Formats valid as conversion operands
    pub fn valid_options() -> impl Iterator<Item = Format> {
        Self::ALL.into_iter().filter(|f| *f != Format::Unknown)
    }

    pub fn valid_options_string() -> String {
        Self::valid_options()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        Self::valid_options()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                ConvertError::validation(format!(
                    "invalid format '{}'. Valid values are '{}'",
                    s,
                    Format::valid_options_string()
                ))
            })
    }
}

/// Options shared by every encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecOptions {
    pub json_style: JsonStyle,
}

/// Decodes a whole file into an instance of the schema
pub type DecodeFn = fn(&[u8], Schema<'_>) -> Result<Instance>;

/// Encodes an instance of the schema into file content
pub type EncodeFn = fn(&Instance, Schema<'_>, &CodecOptions) -> Result<Vec<u8>>;

/// Extension and codec pair of one format
pub struct FormatHandler {
    pub format: Format,
    /// Lowercase, with leading dot
    pub extension: &'static str,
    pub decode: DecodeFn,
    pub encode: EncodeFn,
}

impl fmt::Debug for FormatHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatHandler")
            .field("format", &self.format)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

fn decode_bytes(bytes: &[u8], schema: Schema<'_>) -> Result<Instance> {
    Ok(wire::decode(bytes, schema)?)
}

fn encode_bytes(instance: &Instance, schema: Schema<'_>, _options: &CodecOptions) -> Result<Vec<u8>> {
    Ok(wire::encode(instance, schema)?)
}

fn decode_json(bytes: &[u8], schema: Schema<'_>) -> Result<Instance> {
    json::decode(bytes, schema)
}

fn encode_json(instance: &Instance, schema: Schema<'_>, options: &CodecOptions) -> Result<Vec<u8>> {
    json::encode(instance, schema, options.json_style)
}

/// Process-wide format table
#[derive(Debug)]
pub struct FormatRegistry {
    handlers: HashMap<Format, FormatHandler>,
    by_extension: HashMap<&'static str, Format>,
}

impl FormatRegistry {
    pub fn global() -> &'static FormatRegistry {
        static REGISTRY: OnceLock<FormatRegistry> = OnceLock::new();
        REGISTRY.get_or_init(FormatRegistry::builtin)
    }

    fn builtin() -> Self {
        Self::from_handlers(vec![
            FormatHandler {
                format: Format::Json,
                extension: ".json",
                decode: decode_json,
                encode: encode_json,
            },
            FormatHandler {
                format: Format::Bytes,
                extension: ".bytes",
                decode: decode_bytes,
                encode: encode_bytes,
            },
        ])
    }

    fn from_handlers(handlers: Vec<FormatHandler>) -> Self {
        let by_extension = handlers
            .iter()
            .map(|h| (h.extension.trim_start_matches('.'), h.format))
            .collect();
        let handlers = handlers.into_iter().map(|h| (h.format, h)).collect();
        Self {
            handlers,
            by_extension,
        }
    }

    pub fn resolve(&self, format: Format) -> Result<&FormatHandler> {
        if format == Format::Unknown {
            return Err(ConvertError::UnsupportedFormat(format));
        }
        self.handlers
            .get(&format)
            .ok_or(ConvertError::UnsupportedFormat(format))
    }

    /// Reverse index lookup; `Unknown` on any miss
    pub fn lookup_extension(&self, ext: &str) -> Format {
        let ext = ext.strip_prefix('.').unwrap_or(ext);
        if ext.is_empty() {
            return Format::Unknown;
        }
        self.by_extension
            .get(ext.to_ascii_lowercase().as_str())
            .copied()
            .unwrap_or(Format::Unknown)
    }

    /// Fails on the first format without a handler
    pub fn validate_all(&self) -> Result<()> {
        for format in Format::valid_options() {
            let handler = self.resolve(format)?;
            if handler.extension.len() < 2
                || !handler.extension.starts_with('.')
                || handler.extension != handler.extension.to_ascii_lowercase()
            {
                return Err(ConvertError::UnsupportedFormat(format));
            }
        }
        Ok(())
    }
}
