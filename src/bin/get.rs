//! archappl-get — retrieve PV data from the Archiver Appliance.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use archappl::{config, export, ArchiverDataClient, TimeRange, TimeSeries};

/// Retrieve data from the Archiver Appliance and print or export it.
#[derive(Parser)]
#[command(name = "archappl-get", version, about, long_about = None)]
struct Cli {
    /// PV to retrieve; repeat for multiple PVs.
    #[arg(long = "pv", value_name = "PV")]
    pvs: Vec<String>,

    /// File with one PV per line; lines starting with '#' are skipped.
    #[arg(long = "pv-file", value_name = "FILE")]
    pv_file: Option<PathBuf>,

    /// Start of the time range, RFC 3339 (e.g. 2021-04-15T20:10:00Z).
    #[arg(long = "from", value_name = "TIME", requires = "to")]
    from: Option<DateTime<Utc>>,

    /// End of the time range, RFC 3339; defaults with --from unset to the
    /// configured recent window ending now.
    #[arg(long = "to", value_name = "TIME", requires = "from")]
    to: Option<DateTime<Utc>>,

    /// Base URL of the Archiver Appliance, overriding the configured one.
    #[arg(long)]
    url: Option<String>,

    /// Write output to this file instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Output format.
    #[arg(short = 'f', long, value_enum, default_value = "table")]
    format: Format,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the resolved site configuration and exit.
    #[arg(long)]
    show_config: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Json,
    Table,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = config::resolve().context("failed to resolve site configuration")?;
    if cli.show_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    let pvs = collect_pvs(cli.pvs, cli.pv_file.as_deref())?;
    if pvs.is_empty() {
        bail!("no PVs given; use --pv or --pv-file (see --help)");
    }

    let range = match (cli.from, cli.to) {
        (Some(start), Some(end)) => Some(TimeRange::new(start, end)),
        _ => None,
    };

    let client = match &cli.url {
        Some(url) => ArchiverDataClient::with_url(url.clone(), &config)?,
        None => ArchiverDataClient::new(&config)?,
    };
    info!(url = client.url(), pvs = pvs.len(), "fetching data");

    let batch = client.get_data_many(&pvs, range).await;
    for (pv, err) in &batch.failures {
        eprintln!("archappl-get: {pv}: {err}");
    }
    if batch.is_empty() {
        bail!("no data retrieved");
    }

    let series: Vec<&TimeSeries> = batch.series.values().collect();
    let rendered = match cli.format {
        Format::Csv => export::to_csv(&series)?,
        Format::Json => export::to_json(&series)?,
        Format::Table => export::to_table(&series)?,
    };
    write_output(cli.output.as_deref(), &rendered)?;

    if batch.is_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();
}

fn collect_pvs(mut pvs: Vec<String>, pv_file: Option<&Path>) -> Result<Vec<String>> {
    if let Some(path) = pv_file {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read PV file '{}'", path.display()))?;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if !pvs.iter().any(|existing| existing == line) {
                pvs.push(line.to_string());
            }
        }
    }
    Ok(pvs)
}

fn write_output(output: Option<&Path>, rendered: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            info!(path = %path.display(), "wrote output");
        }
        None => print!("{rendered}"),
    }
    Ok(())
}
