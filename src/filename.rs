//! Filename conventions
//!
//! Asset files are named `<basename>.<assettype>.<format>` (or just
//! `<assettype>.<format>`). Everything here is a pure function of the path
//! string; nothing touches the filesystem.

use std::path::Path;

use crate::asset_type::AssetType;
use crate::error::{ConvertError, Result};
use crate::format::Format;

/// Format named by the outermost extension
pub fn format_of(path: impl AsRef<Path>) -> Format {
    let path = path.as_ref();
    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .map(Format::from_extension)
        .unwrap_or(Format::Unknown);
    if format == Format::Unknown {
        tracing::debug!(path = %path.display(), "could not infer format from filename");
    }
    format
}

/// Asset type named by the second extension
pub fn type_of(path: impl AsRef<Path>) -> AssetType {
    AssetType::from_filename(path)
}

/// The file name with its two trailing extensions removed.
///
/// `sword.item.bytes` gives `sword`; `credits.bytes` gives `credits`.
pub fn base_name(path: impl AsRef<Path>) -> String {
    let Some(stem) = path.as_ref().file_stem().and_then(|s| s.to_str()) else {
        return String::new();
    };
    Path::new(stem)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(stem)
        .to_string()
}

/// Fill in whichever operand was not given from the path
pub fn infer(
    path: impl AsRef<Path>,
    format: Option<Format>,
    asset_type: Option<AssetType>,
) -> Result<(Format, AssetType)> {
    let path = path.as_ref();
    let format = format.unwrap_or_else(|| format_of(path));
    if format == Format::Unknown {
        return Err(ConvertError::UnknownFromFilename {
            what: "format",
            path: path.to_path_buf(),
        });
    }
    let asset_type = asset_type.unwrap_or_else(|| type_of(path));
    if asset_type == AssetType::Unknown {
        return Err(ConvertError::UnknownFromFilename {
            what: "asset type",
            path: path.to_path_buf(),
        });
    }
    Ok((format, asset_type))
}

/// `<base><type-ext><format-ext>`
pub fn output_file_name(base: &str, asset_type: AssetType, format: Format) -> Result<String> {
    let type_ext = &asset_type.handler()?.extension;
    let format_ext = format.handler()?.extension;
    Ok(format!("{}{}{}", base, type_ext, format_ext))
}
