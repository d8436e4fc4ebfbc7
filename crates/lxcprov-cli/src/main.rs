//! # lxcprov
//!
//! Provisions LXC containers from a declarative JSON batch file: each
//! container is recreated, given a static network identity, booted, and
//! loaded with its packages.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod cli;
mod output;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    cli::execute(cli)
}
