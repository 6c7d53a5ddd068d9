// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use super::load_config;
use crate::checksum::{ChecksumStore, ParityLedger};
use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum ChecksumCommands {
    /// Load a `filename##checksum` listing into the ledger
    Load {
        /// Listing file, as written by `batch checksum` or `checksum dump`
        listing: PathBuf,
        /// Optional TOML file containing the configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the whole ledger
    Dump {
        /// Print file names only
        #[arg(long)]
        filenames_only: bool,
        /// Optional TOML file containing the configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the recorded checksum of a file
    Get {
        filename: String,
        /// Optional TOML file containing the configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Record the checksum of a file
    Upload {
        filename: String,
        checksum: String,
        /// Optional TOML file containing the configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Replace the recorded checksum of a file with the checksum of a correct copy
    Correct {
        filename: String,
        /// The correct content of the file
        content: PathBuf,
        /// Optional TOML file containing the configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

impl ChecksumCommands {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = match &self {
            Self::Load { config, .. }
            | Self::Dump { config, .. }
            | Self::Get { config, .. }
            | Self::Upload { config, .. }
            | Self::Correct { config, .. } => load_config(config.as_deref())?,
        };
        let store = ChecksumStore::open(config.checksum)?;
        let outcome = tokio::task::block_in_place(|| self.run_with(&store));
        store.cleanup()?;
        outcome
    }

    fn run_with(self, store: &ChecksumStore<ParityLedger>) -> anyhow::Result<()> {
        match self {
            Self::Load { listing, .. } => {
                let loaded = store.load_from_listing(BufReader::new(File::open(&listing)?))?;
                println!("Loaded {loaded} entries from {}", listing.display());
            }
            Self::Dump { filenames_only, .. } => {
                let dump = if filenames_only {
                    store.get_all_filenames()?
                } else {
                    store.get_archive_as_file()?
                };
                io::copy(&mut File::open(dump.path())?, &mut io::stdout().lock())?;
            }
            Self::Get { filename, .. } => match store.get_checksum(&filename)? {
                Some(checksum) => println!("{checksum}"),
                None => anyhow::bail!("no checksum recorded for '{filename}'"),
            },
            Self::Upload {
                filename, checksum, ..
            } => {
                anyhow::ensure!(
                    store.has_enough_space(),
                    "not enough space left in {}",
                    store.config().base_dir.display()
                );
                store.upload(&filename, &checksum)?;
            }
            Self::Correct {
                filename, content, ..
            } => {
                let removed = store.correct(&filename, File::open(&content)?)?;
                println!(
                    "Replaced checksum '{}' of '{}'",
                    removed.checksum, removed.filename
                );
            }
        }
        Ok(())
    }
}
