//! archappl-inspect — inspect the Archiver Appliance and its PVs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use archappl::{config, ArchiverMgmtClient};

/// Inspect the Archiver Appliance, with or without PVs.
#[derive(Parser)]
#[command(name = "archappl-inspect", version, about, long_about = None)]
struct Cli {
    /// PV to inspect; repeat for multiple PVs.
    #[arg(long = "pv", value_name = "PV")]
    pvs: Vec<String>,

    /// File with one PV per line; lines starting with '#' are skipped.
    #[arg(long = "pv-file", value_name = "FILE")]
    pv_file: Option<PathBuf>,

    /// List archived PVs matching a glob pattern instead of inspecting.
    #[arg(long, value_name = "GLOB", conflicts_with = "key")]
    pattern: Option<String>,

    /// Cap the number of names returned with --pattern.
    #[arg(long, requires = "pattern")]
    limit: Option<u32>,

    /// Kind of per-PV information to inspect.
    #[arg(long, value_enum, default_value = "status")]
    key: Key,

    /// Print the appliance information and exit.
    #[arg(long)]
    info: bool,

    /// Base URL of the Archiver Appliance, overriding the configured one.
    #[arg(long)]
    url: Option<String>,

    /// Write output to this file instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the resolved site configuration and exit.
    #[arg(long)]
    show_config: bool,
}

#[derive(Clone, Copy, PartialEq, ValueEnum)]
enum Key {
    Status,
    Type,
    Details,
    Stores,
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
    if config.admin_disabled && cli.url.is_none() {
        bail!("the management API is disabled in the site configuration");
    }

    let client = match &cli.url {
        Some(url) => ArchiverMgmtClient::with_url(url.clone(), &config)?,
        None => ArchiverMgmtClient::new(&config)?,
    };
    info!(url = client.url(), "inspecting archiver");

    if cli.info {
        let info = client.get_appliance_info().await?;
        write_output(cli.output.as_deref(), &to_pretty_json(&info)?)?;
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(pattern) = &cli.pattern {
        let names = client.get_all_pvs(Some(pattern), cli.limit).await?;
        let mut listing = String::new();
        for name in &names {
            listing.push_str(name);
            listing.push('\n');
        }
        write_output(cli.output.as_deref(), &listing)?;
        return Ok(ExitCode::SUCCESS);
    }

    let pvs = collect_pvs(cli.pvs, cli.pv_file.as_deref())?;
    if pvs.is_empty() {
        bail!("no PVs given; use --pv, --pv-file or --pattern (see --help)");
    }

    let mut failed = 0usize;
    let rendered = match cli.key {
        Key::Status => {
            let statuses = client.get_pv_status(&pvs).await?;
            to_pretty_json(&statuses)?
        }
        Key::Type => {
            let mut infos = BTreeMap::new();
            for pv in &pvs {
                match client.get_pv_type_info(pv).await {
                    Ok(info) => {
                        infos.insert(pv.clone(), info);
                    }
                    Err(err) => {
                        eprintln!("archappl-inspect: {pv}: {err}");
                        failed += 1;
                    }
                }
            }
            to_pretty_json(&infos)?
        }
        Key::Details => {
            let mut details = BTreeMap::new();
            for pv in &pvs {
                match client.get_pv_details(pv).await {
                    Ok(rows) => {
                        details.insert(pv.clone(), rows);
                    }
                    Err(err) => {
                        eprintln!("archappl-inspect: {pv}: {err}");
                        failed += 1;
                    }
                }
            }
            to_pretty_json(&details)?
        }
        Key::Stores => {
            let mut stores = BTreeMap::new();
            for pv in &pvs {
                match client.get_stores_for_pv(pv).await {
                    Ok(names) => {
                        stores.insert(pv.clone(), names);
                    }
                    Err(err) => {
                        eprintln!("archappl-inspect: {pv}: {err}");
                        failed += 1;
                    }
                }
            }
            to_pretty_json(&stores)?
        }
    };

    if failed == pvs.len() {
        bail!("no information retrieved");
    }
    write_output(cli.output.as_deref(), &rendered)?;

    if failed == 0 {
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

fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    Ok(text)
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
