//! Asset Schema Inspection CLI
//!
//! Lists the registries and catalog, validates them, and checks individual
//! asset files.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use asset_convert::filename;
use asset_convert::{
    AssetType, ConvertConfig, Converter, Format, FormatRegistry, SchemaCatalog, TypeRegistry,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "asset-schemas")]
#[command(about = "Inspect asset schemas and verify asset files")]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Schema catalog directory (overrides configuration)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List asset types with their extension and schema
    Types,

    /// List formats with their extension
    Formats,

    /// List catalog schemas and enums with the catalog fingerprint
    Catalog {
        /// Print every field of every schema
        #[arg(long)]
        fields: bool,
    },

    /// Check every registry entry against the catalog
    Validate,

    /// Round-trip a file through the other format and report differences
    Verify {
        file: PathBuf,
        /// Asset type, when the filename does not carry it
        #[arg(short = 'y', long = "type")]
        asset_type: Option<AssetType>,
        /// Format, when the extension does not carry it
        #[arg(short, long)]
        format: Option<Format>,
    },

    /// Decode a file and print it as JSON
    Show {
        file: PathBuf,
        #[arg(short = 'y', long = "type")]
        asset_type: Option<AssetType>,
        #[arg(short, long)]
        format: Option<Format>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = ConvertConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    if cli.catalog.is_some() {
        config.catalog.path = cli.catalog;
    }
    let source = config.catalog().context("loading schema catalog")?;
    let catalog = source.get();
    let converter = Converter::from_config(&config, catalog);

    match cli.command {
        Commands::Types => {
            println!("{:<10} {:<12} SCHEMA", "TYPE", "EXTENSION");
            for asset_type in AssetType::valid_options() {
                let handler = asset_type.handler()?;
                println!("{:<10} {:<12} {}", asset_type, handler.extension, handler.schema);
            }
        }

        Commands::Formats => {
            for format in Format::valid_options() {
                println!("{:<8} {}", format, format.handler()?.extension);
            }
        }

        Commands::Catalog { fields } => print_catalog(catalog, fields),

        Commands::Validate => {
            println!("🔍 Validating registries against catalog {}...", catalog.checksum().short());
            FormatRegistry::global().validate_all()?;
            println!("  ✓ {} formats", Format::valid_options().count());
            TypeRegistry::global().validate_all(catalog)?;
            println!("  ✓ {} asset types", AssetType::valid_options().count());
            println!("\n✅ All registry entries resolve");
        }

        Commands::Verify {
            file,
            asset_type,
            format,
        } => {
            let (format, asset_type) = filename::infer(&file, format, asset_type)?;
            let differences = converter.verify_roundtrip(&file, format, asset_type)?;
            if differences.is_empty() {
                println!("✅ {} round-trips cleanly", file.display());
            } else {
                println!("❌ {} differences in {}:", differences.len(), file.display());
                for difference in &differences {
                    println!("   {}", difference);
                }
                return Ok(ExitCode::from(2));
            }
        }

        Commands::Show {
            file,
            asset_type,
            format,
        } => {
            let (format, asset_type) = filename::infer(&file, format, asset_type)?;
            let instance = converter.decode_file(&file, format, asset_type)?;
            let json = converter.encode(&instance, Format::Json, asset_type)?;
            print!("{}", String::from_utf8_lossy(&json));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_catalog(catalog: &SchemaCatalog, fields: bool) {
    println!("📚 Schema catalog {}", catalog.checksum());
    println!("   {} schemas, {} enums\n", catalog.len(), catalog.enum_names().count());

    for name in catalog.schema_names() {
        let Some(schema) = catalog.schema(name) else {
            continue;
        };
        if schema.is_blob() {
            println!("  {} (blob)", name);
            continue;
        }
        println!("  {} ({} fields)", name, schema.fields().len());
        if fields {
            for field in schema.fields() {
                let label = if field.is_repeated() { "repeated " } else { "" };
                println!("      {:>3} {:<20} {}{}", field.number, field.name, label, field.ty);
            }
        }
    }

    println!();
    for name in catalog.enum_names() {
        if let Some(descriptor) = catalog.enumeration(name) {
            let symbols: Vec<_> = descriptor.values.iter().map(|v| v.name.as_str()).collect();
            println!("  enum {} {{ {} }}", name, symbols.join(", "));
        }
    }
}
