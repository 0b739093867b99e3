//! Conversion dispatch
//!
//! [`Converter`] routes a file through the source format's decoder into a
//! schema instance and back out through the destination format's encoder.
//! [`ConversionRequest`] turns loosely specified command-line input into a
//! validated [`ConversionPlan`].

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::asset_type::{AssetType, TypeRegistry};
use crate::catalog::{Schema, SchemaCatalog};
use crate::checksum::Checksum;
use crate::config::ConvertConfig;
use crate::diff::{self, Difference};
use crate::error::{ConvertError, Result};
use crate::filename;
use crate::format::{CodecOptions, Format, FormatRegistry};
use crate::schema::Instance;

/// Converts asset files against one schema catalog
#[derive(Debug, Clone)]
pub struct Converter<'c> {
    catalog: &'c SchemaCatalog,
    options: CodecOptions,
    recursive: bool,
}

impl<'c> Converter<'c> {
    pub fn new(catalog: &'c SchemaCatalog) -> Self {
        Self {
            catalog,
            options: CodecOptions::default(),
            recursive: false,
        }
    }

    /// Converter with the output and batch settings of a configuration
    pub fn from_config(config: &ConvertConfig, catalog: &'c SchemaCatalog) -> Self {
        Self::new(catalog)
            .with_options(CodecOptions {
                json_style: config.output.json_style,
            })
            .recursive(config.batch.recursive)
    }

    pub fn with_options(mut self, options: CodecOptions) -> Self {
        self.options = options;
        self
    }

    /// Whether directory conversion descends into subdirectories
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn catalog(&self) -> &'c SchemaCatalog {
        self.catalog
    }

    /// Initialize both registries and check them against the catalog.
    ///
    /// Call before any file I/O; a gap in either table is fatal.
    pub fn prewarm(&self) -> Result<()> {
        FormatRegistry::global().validate_all()?;
        TypeRegistry::global().validate_all(self.catalog)?;
        tracing::debug!(
            schemas = self.catalog.len(),
            catalog = %self.catalog.checksum().short(),
            "registries validated"
        );
        Ok(())
    }

    fn schema_for(&self, asset_type: AssetType, path: &Path) -> Result<Schema<'c>> {
        if asset_type == AssetType::Unknown {
            return Err(ConvertError::UnknownAssetType {
                path: path.to_path_buf(),
            });
        }
        TypeRegistry::global().schema(asset_type, self.catalog)
    }

    /// Read and decode one file
    pub fn decode_file(&self, path: &Path, format: Format, asset_type: AssetType) -> Result<Instance> {
        let schema = self.schema_for(asset_type, path)?;
        let handler = format.handler()?;
        let bytes = fs::read(path)?;
        (handler.decode)(&bytes, schema).map_err(|e| ConvertError::DeserializeFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Encode an instance of the asset type's schema
    pub fn encode(&self, instance: &Instance, format: Format, asset_type: AssetType) -> Result<Vec<u8>> {
        let schema = TypeRegistry::global().schema(asset_type, self.catalog)?;
        let handler = format.handler()?;
        (handler.encode)(instance, schema, &self.options)
    }

    /// Convert one file, returning the checksum of what was written.
    ///
    /// The output is only replaced once encoding has succeeded.
    pub fn convert(
        &self,
        input: &Path,
        in_format: Format,
        output: &Path,
        out_format: Format,
        asset_type: AssetType,
    ) -> Result<Checksum> {
        self.schema_for(asset_type, input)?;
        out_format.handler()?;

        let instance = self.decode_file(input, in_format, asset_type)?;
        let encoded = self.encode(&instance, out_format, asset_type)?;
        write_atomic(output, &encoded)?;

        let checksum = Checksum::from_bytes(&encoded);
        tracing::info!(
            input = %input.display(),
            output = %output.display(),
            %asset_type,
            checksum = %checksum.short(),
            "converted"
        );
        Ok(checksum)
    }

    /// Convert every matching file of a directory.
    ///
    /// Files whose format is unknown or differs from `in_filter` are skipped
    /// silently. A file whose asset type cannot be inferred is recorded as a
    /// failure. No single file aborts the batch.
    pub fn convert_directory(
        &self,
        in_dir: &Path,
        out_dir: &Path,
        in_filter: Option<Format>,
        out_format: Format,
    ) -> Result<BatchReport> {
        out_format.handler()?;

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut report = BatchReport::default();

        for entry in WalkDir::new(in_dir)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| in_dir.to_path_buf());
                    tracing::warn!(path = %path.display(), error = %e, "unreadable directory entry");
                    report.failed.push(FailedFile {
                        input: path,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let input = entry.path();

            let format = filename::format_of(input);
            if format == Format::Unknown || in_filter.is_some_and(|f| f != format) {
                tracing::debug!(path = %input.display(), %format, "skipping file");
                report.skipped.push(input.to_path_buf());
                continue;
            }

            match self.convert_entry(in_dir, out_dir, input, format, out_format) {
                Ok(converted) => report.converted.push(converted),
                Err(e) => {
                    tracing::warn!(path = %input.display(), error = %e, "conversion failed");
                    report.failed.push(FailedFile {
                        input: input.to_path_buf(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            converted = report.converted.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "batch complete"
        );
        Ok(report)
    }

    fn convert_entry(
        &self,
        in_dir: &Path,
        out_dir: &Path,
        input: &Path,
        in_format: Format,
        out_format: Format,
    ) -> Result<ConvertedFile> {
        let asset_type = filename::type_of(input);
        if asset_type == AssetType::Unknown {
            return Err(ConvertError::UnknownAssetType {
                path: input.to_path_buf(),
            });
        }

        let name = filename::output_file_name(&filename::base_name(input), asset_type, out_format)?;
        let target_dir = match input.strip_prefix(in_dir).ok().and_then(Path::parent) {
            Some(relative) if !relative.as_os_str().is_empty() => {
                let dir = out_dir.join(relative);
                fs::create_dir_all(&dir)?;
                dir
            }
            _ => out_dir.to_path_buf(),
        };
        let output = target_dir.join(name);

        let checksum = self.convert(input, in_format, &output, out_format, asset_type)?;
        Ok(ConvertedFile {
            input: input.to_path_buf(),
            output,
            asset_type,
            checksum,
        })
    }

    /// Decode a file, pass it through the other format and back, and compare.
    ///
    /// An empty result means the file survives the round trip unchanged.
    pub fn verify_roundtrip(
        &self,
        path: &Path,
        format: Format,
        asset_type: AssetType,
    ) -> Result<Vec<Difference>> {
        let original = self.decode_file(path, format, asset_type)?;
        let schema = TypeRegistry::global().schema(asset_type, self.catalog)?;

        let other = Format::valid_options()
            .find(|f| *f != format)
            .ok_or(ConvertError::UnsupportedFormat(format))?;
        let handler = other.handler()?;

        let intermediate = (handler.encode)(&original, schema, &self.options)?;
        let back = (handler.decode)(&intermediate, schema)?;

        let differences = diff::diff(&original, &back);
        if !differences.is_empty() {
            tracing::warn!(
                path = %path.display(),
                via = %other,
                differences = differences.len(),
                "round trip is lossy"
            );
        }
        Ok(differences)
    }
}

/// Write through a temporary file in the destination directory.
///
/// An overwritten file keeps its permissions; a new file gets the same
/// permissions `fs::write` would give it.
fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let existing = fs::metadata(path).ok().map(|meta| meta.permissions());

    let mut builder = tempfile::Builder::new();
    builder.prefix(".asset-convert");
    #[cfg(unix)]
    if existing.is_none() {
        use std::os::unix::fs::PermissionsExt;
        // Narrowed by the process umask at creation
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let mut file: NamedTempFile = builder.tempfile_in(dir)?;
    if let Some(permissions) = existing {
        file.as_file().set_permissions(permissions)?;
    }
    file.write_all(content)?;
    file.flush()?;
    file.persist(path).map_err(|e| ConvertError::Io(e.error))?;
    Ok(())
}

/// One successfully converted file
#[derive(Debug, Clone, Serialize)]
pub struct ConvertedFile {
    pub input: PathBuf,
    pub output: PathBuf,
    pub asset_type: AssetType,
    pub checksum: Checksum,
}

/// One file that could not be converted
#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub input: PathBuf,
    pub error: String,
}

/// Outcome of a directory conversion
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub converted: Vec<ConvertedFile>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<FailedFile>,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for file in &self.converted {
            writeln!(f, "  ✓ {} -> {}", file.input.display(), file.output.display())?;
        }
        for file in &self.failed {
            writeln!(f, "  ✗ {}: {}", file.input.display(), file.error)?;
        }
        write!(
            f,
            "{} converted, {} skipped, {} failed",
            self.converted.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}

// =============================================================================
// Request validation
// =============================================================================

/// Conversion as requested on the command line; anything omitted is inferred
#[derive(Debug, Clone, Default)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub from_format: Option<Format>,
    pub to_format: Option<Format>,
    pub asset_type: Option<AssetType>,
}

/// A validated conversion with every operand known
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionPlan {
    Single {
        input: PathBuf,
        output: PathBuf,
        from: Format,
        to: Format,
        asset_type: AssetType,
    },
    Batch {
        input_dir: PathBuf,
        output_dir: PathBuf,
        from: Option<Format>,
        to: Format,
    },
}

/// What an executed plan produced
#[derive(Debug, Clone)]
pub enum ConversionOutcome {
    Single(Checksum),
    Batch(BatchReport),
}

impl ConversionRequest {
    /// Validate the request and fill in every omitted operand
    pub fn plan(&self) -> Result<ConversionPlan> {
        if self.input.as_os_str().is_empty() {
            return Err(ConvertError::validation("input path is required"));
        }
        if self.output.as_os_str().is_empty() {
            return Err(ConvertError::validation("output path is required"));
        }
        if !self.input.exists() {
            return Err(ConvertError::validation(format!(
                "input not found: {}",
                self.input.display()
            )));
        }
        if self.input.is_dir() != self.output.is_dir() {
            return Err(ConvertError::validation(
                "input and output must either both be directories or both be files",
            ));
        }
        if same_location(&self.input, &self.output) {
            return Err(ConvertError::validation(
                "input and output cannot point to the same location",
            ));
        }

        if self.input.is_dir() {
            self.plan_batch()
        } else {
            self.plan_single()
        }
    }

    fn plan_batch(&self) -> Result<ConversionPlan> {
        let to = match self.to_format {
            Some(f) if f != Format::Unknown => f,
            _ => {
                return Err(ConvertError::validation(format!(
                    "output format is required when input is a directory. Valid values are '{}'",
                    Format::valid_options_string()
                )))
            }
        };
        if let Some(from) = self.from_format {
            if from == Format::Unknown || from == to {
                return Err(ConvertError::validation(format!(
                    "input and output formats must be different and cannot be unknown: from {}, to {}",
                    from, to
                )));
            }
        }
        Ok(ConversionPlan::Batch {
            input_dir: self.input.clone(),
            output_dir: self.output.clone(),
            from: self.from_format,
            to,
        })
    }

    fn plan_single(&self) -> Result<ConversionPlan> {
        if let Ok(meta) = fs::metadata(&self.output) {
            if meta.permissions().readonly() {
                return Err(ConvertError::validation(format!(
                    "output file is read-only: {}",
                    self.output.display()
                )));
            }
        }
        let parent = output_parent(&self.output);
        if !parent.is_dir() {
            return Err(ConvertError::validation(format!(
                "output directory not found: {}",
                parent.display()
            )));
        }

        let from = self.from_format.unwrap_or_else(|| filename::format_of(&self.input));
        let to = self.to_format.unwrap_or_else(|| filename::format_of(&self.output));
        if from == to || from == Format::Unknown || to == Format::Unknown {
            return Err(ConvertError::validation(format!(
                "input and output formats must be different and cannot be unknown: from {}, to {}. Valid values are '{}'",
                from,
                to,
                Format::valid_options_string()
            )));
        }

        let asset_type = match self.asset_type {
            Some(AssetType::Unknown) => {
                return Err(ConvertError::validation("asset type cannot be unknown"))
            }
            Some(t) => t,
            None => {
                let in_type = filename::type_of(&self.input);
                let out_type = filename::type_of(&self.output);
                if in_type != out_type || in_type == AssetType::Unknown {
                    return Err(ConvertError::validation(format!(
                        "input and output asset types must match and cannot be unknown: input {}, output {}",
                        in_type, out_type
                    )));
                }
                in_type
            }
        };

        Ok(ConversionPlan::Single {
            input: self.input.clone(),
            output: self.output.clone(),
            from,
            to,
            asset_type,
        })
    }
}

impl ConversionPlan {
    pub fn execute(&self, converter: &Converter<'_>) -> Result<ConversionOutcome> {
        match self {
            ConversionPlan::Single {
                input,
                output,
                from,
                to,
                asset_type,
            } => converter
                .convert(input, *from, output, *to, *asset_type)
                .map(ConversionOutcome::Single),
            ConversionPlan::Batch {
                input_dir,
                output_dir,
                from,
                to,
            } => converter
                .convert_directory(input_dir, output_dir, *from, *to)
                .map(ConversionOutcome::Batch),
        }
    }
}

fn output_parent(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn same_location(a: &Path, b: &Path) -> bool {
    match (resolve(a), resolve(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

/// Absolute form of a path whose final component may not exist yet
fn resolve(path: &Path) -> Option<PathBuf> {
    if let Ok(full) = path.canonicalize() {
        return Some(full);
    }
    let name = path.file_name()?;
    output_parent(path).canonicalize().ok().map(|dir| dir.join(name))
}
