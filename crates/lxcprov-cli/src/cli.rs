//! Command-line definition and the provisioning run behind it.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use lxcprov_common::config::ProvisionConfig;
use lxcprov_common::constants::CONFIG_ENV;
use lxcprov_common::types::load_records;
use lxcprov_runtime::backend;
use lxcprov_runtime::batch::BatchRunner;
use lxcprov_runtime::engine::ProvisioningEngine;

use crate::output;

const AFTER_HELP: &str = "\
Every container in the batch is destroyed and recreated, even if it already
exists. Containers are provisioned one after another; a failing container
does not stop the others.

Run a single lxcprov at a time per LXC path: concurrent runs on the same
container names corrupt each other.";

/// Container management utility: provision LXC containers from a JSON batch file.
#[derive(Parser, Debug)]
#[command(name = "lxcprov", version, about, long_about = None, after_help = AFTER_HELP)]
pub struct Cli {
    /// JSON configuration file listing the containers to provision.
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// JSON file overriding deployment defaults (LXC path, template, bridge, ...).
    #[arg(short, long, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,
}

/// Runs the batch named on the command line.
///
/// Without `--file` there is nothing to do and the run succeeds.
///
/// # Errors
///
/// Returns an error if the configuration or batch file cannot be loaded.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let Some(file) = cli.file else {
        tracing::info!("no batch file given, nothing to do");
        return Ok(ExitCode::SUCCESS);
    };

    let config = match &cli.config {
        Some(path) => ProvisionConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ProvisionConfig::default(),
    };
    let specs = load_records(&file)
        .with_context(|| format!("failed to load batch file {}", file.display()))?;

    let engine = ProvisioningEngine::new(config);
    if !engine.is_available() {
        output::print_backend_notice();
    }
    if !backend::running_as_root() {
        tracing::warn!("not running as root, LXC operations will likely be refused");
    }

    output::print_header(specs.len());
    let started = Instant::now();
    let report = BatchRunner::new(engine).run(&specs);
    output::print_summary(&report, started.elapsed());

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
