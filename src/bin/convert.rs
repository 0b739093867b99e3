//! Asset Conversion CLI
//!
//! Converts one asset file, or every asset file of a directory, between the
//! JSON and binary encodings.
//!
//! Usage:
//!   asset-convert -i sword.item.json -o sword.item.bytes
//!   asset-convert -i input.json -o output.bytes -f json -t bytes -y item
//!   asset-convert -i assets/json -o assets/bytes -t bytes

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use asset_convert::{
    AssetType, ConversionOutcome, ConversionRequest, ConvertConfig, Converter, Format,
};
use clap::{CommandFactory, FromArgMatches, Parser};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "asset-convert")]
#[command(about = "Convert game asset files between JSON and binary")]
struct Cli {
    /// Input file or directory
    #[arg(short = 'i', long = "infile")]
    infile: PathBuf,

    /// Output file or directory
    #[arg(short = 'o', long = "outfile")]
    outfile: PathBuf,

    /// Format of the input; inferred from the extension when omitted
    #[arg(short = 'f', long = "fromformat")]
    from_format: Option<Format>,

    /// Format of the output; required when converting a directory
    #[arg(short = 't', long = "toformat")]
    to_format: Option<Format>,

    /// Asset type; inferred from the filenames when omitted
    #[arg(short = 'y', long = "type")]
    asset_type: Option<AssetType>,

    /// Configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

fn valid_values() -> String {
    format!(
        "Valid formats: {}\nValid asset types: {}\n\nExample:\n  asset-convert -i input.json -o output.bytes -f json -t bytes -y item",
        Format::valid_options_string(),
        AssetType::valid_options_string()
    )
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let matches = Cli::command().after_help(valid_values()).get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", Cli::command().render_usage());
            eprintln!("{}\n", valid_values());
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = ConvertConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let catalog = config.catalog().context("loading schema catalog")?;
    let converter = Converter::from_config(&config, catalog.get());
    converter.prewarm()?;

    let request = ConversionRequest {
        input: cli.infile,
        output: cli.outfile,
        from_format: cli.from_format,
        to_format: cli.to_format,
        asset_type: cli.asset_type,
    };
    let plan = request.plan()?;

    match plan.execute(&converter)? {
        ConversionOutcome::Single(checksum) => {
            println!("✓ {} (sha256 {})", request.output.display(), checksum.short());
            Ok(ExitCode::SUCCESS)
        }
        ConversionOutcome::Batch(report) => {
            println!("{}", report);
            if report.has_failures() {
                Ok(ExitCode::from(2))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}
