mod config;
mod export;
mod logging;

use std::path::PathBuf;
use std::process;

use clap::Parser;
use serde_json::Map;
use sqexport_codegen::EncodeOptions;
use sqexport_eval::Project;
use tracing::debug;

use crate::config::{read_config, EnvironmentSettings, FileConfig};
use crate::export::{ExportConfig, ExportError, OutputTarget};

/// Evaluate a probabilistic model and export its result as JSON.
#[derive(Parser)]
#[command(name = "sqexport", version, about = "Evaluate a probabilistic model and export its result as JSON")]
struct Cli {
    /// Model source file
    #[arg(default_value = "my_model.squiggle")]
    input: PathBuf,

    /// Output JSON file (`-` for stdout)
    #[arg(default_value = "output.json")]
    output: PathBuf,

    /// JSON object of parameters, bound as `$key` in the model
    params: Option<PathBuf>,

    /// Number of samples drawn per distribution
    #[arg(long, value_name = "N")]
    sample_count: Option<usize>,

    /// Point-set resolution passed to the engine
    #[arg(long, value_name = "N")]
    xy_point_length: Option<usize>,

    /// Seed for reproducible sampling
    #[arg(long, value_name = "N")]
    seed: Option<u64>,

    /// TOML config file with [environment] and [params] tables
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Fail on invalid parameter names and null values instead of dropping them
    #[arg(long)]
    strict: bool,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    /// Print the generated parameter source and exit without evaluating
    #[arg(long)]
    emit_params: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose, cli.quiet);

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => fail(e),
    };

    if cli.emit_params {
        match export::generate_params(&config) {
            Ok(source) => {
                println!("{}", source.trim_end_matches('\n'));
                return;
            }
            Err(e) => fail(e),
        }
    }

    let mut engine = Project::new(config.environment);
    match export::run(&mut engine, &config) {
        Ok(summary) => debug!(
            result = summary.result_tag,
            bytes = summary.bytes,
            "export finished"
        ),
        Err(e) => fail(e),
    }
}

/// Merge flags, the optional config file and defaults into one run config.
fn build_config(cli: &Cli) -> Result<ExportConfig, ExportError> {
    let file = match &cli.config {
        Some(path) => read_config(path)?,
        None => FileConfig::default(),
    };
    let flags = EnvironmentSettings {
        sample_count: cli.sample_count,
        xy_point_length: cli.xy_point_length,
        seed: cli.seed,
    };
    let environment = flags.or(file.environment).resolve()?;
    let default_params = if file.params.is_empty() {
        Map::new()
    } else {
        file.default_params()?
    };

    Ok(ExportConfig {
        input: cli.input.clone(),
        output: OutputTarget::from_arg(&cli.output),
        params: cli.params.clone(),
        default_params,
        environment,
        encode: EncodeOptions { strict: cli.strict },
        pretty: cli.pretty,
    })
}

fn fail(e: ExportError) -> ! {
    eprintln!("{}", e.diagnostic());
    process::exit(e.exit_code());
}
