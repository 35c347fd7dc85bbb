use std::{fs, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::{LevelFilter, error, info};
use sheaf::{
    BundleOrchestrator, PipelineConfig,
    config::{ConfigOverrides, OutputFormat},
    diagnostics::Diagnostics,
    external::ExternalStrategy,
};

/// Bundle JavaScript modules into a single universally loadable file
#[derive(Parser, Debug)]
#[command(name = "sheaf", author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./sheaf.toml, then the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Entry module, relative to the project root; replaces the configured outputs
    #[arg(short, long = "entry")]
    entries: Vec<String>,

    /// Output file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: umd, cjs, amd or iife
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Global name the bundle attaches itself to in script hosts
    #[arg(short, long)]
    name: Option<String>,

    /// Specifier to leave to the host instead of bundling it
    #[arg(long)]
    external: Vec<String>,

    /// How external patterns match: exact, prefix, glob or regex
    #[arg(long)]
    external_strategy: Option<ExternalStrategy>,

    /// Comma-separated extensions to try, in order
    #[arg(long, value_delimiter = ',')]
    extensions: Option<Vec<String>>,

    /// Minify the generated bundle
    #[arg(long)]
    minify: bool,

    /// Write the build diagnostics as JSON to this file
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            entries: self.entries.clone(),
            output: self.output.clone(),
            format: self.format,
            name: self.name.clone(),
            external: self.external.clone(),
            external_strategy: self.external_strategy,
            extensions: self.extensions.clone(),
            minify: self.minify,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // RUST_LOG takes precedence over -v
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env()
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    let result = config
        .apply_overrides(cli.overrides())
        .and_then(|()| BundleOrchestrator::new(config))
        .and_then(|orchestrator| orchestrator.bundle());

    if let Some(path) = &cli.report_json {
        let diagnostics = Diagnostics::from_result(&result);
        fs::write(path, diagnostics.to_json()?)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    match result {
        Ok(reports) => {
            for report in &reports {
                info!(
                    "{} modules, {} externals{}",
                    report.module_count,
                    report.externals.len(),
                    if report.cycles.is_empty() {
                        String::new()
                    } else {
                        format!(", {} import cycles", report.cycles.len())
                    }
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Bundling failed: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
