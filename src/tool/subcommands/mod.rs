// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod batch_cmd;
pub mod checksum_cmd;
pub mod index_cmd;

use std::path::Path;

use crate::cli_shared::cli::Config;
use crate::cli_shared::logger::{setup_logger, setup_minimal_logger};
use crate::cli_shared::read_config;
use clap::Parser;
use tracing::debug;

/// Command-line options for the `preservation-tool` binary
#[derive(Parser)]
#[command(name = "preservation-tool", author = env!("CARGO_PKG_AUTHORS"), version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Subcommand,
}

/// preservation-tool sub-commands
#[derive(clap::Subcommand)]
pub enum Subcommand {
    /// Run batch jobs over container files
    #[command(subcommand)]
    Batch(batch_cmd::BatchCommands),

    /// Inspect and maintain the checksum ledger
    #[command(subcommand)]
    Checksum(checksum_cmd::ChecksumCommands),

    /// Fetch an index of a set of jobs
    Index(index_cmd::IndexCommand),
}

/// Reads the configuration and installs the logger it asks for. Without a
/// log directory only warnings go to stderr.
fn load_config(config: Option<&Path>) -> anyhow::Result<Config> {
    let (path, config) = read_config(config)?;
    if config.log.log_dir.is_some() {
        setup_logger(&config.log);
    } else {
        setup_minimal_logger();
    }
    match path {
        Some(path) => debug!("using configuration {}", path.to_path_buf().display()),
        None => debug!("using the default configuration"),
    }
    Ok(config)
}
