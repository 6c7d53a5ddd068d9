// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::PathBuf;

use super::load_config;
use crate::batch::jobs::{CdxJob, ChecksumJob, CrawlLogJob};
use crate::batch::{BatchJob, BatchResult, BatchRunner, FileSelection, RecordBatch};
use clap::{Args, Subcommand};

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Container files to process
    #[arg(num_args = 1.., required = true)]
    files: Vec<PathBuf>,
    /// Where the job output is written, once the job succeeds
    #[arg(short, long)]
    output: PathBuf,
    /// Only process files whose name matches this regular expression
    #[arg(long)]
    matching: Option<String>,
    /// Optional TOML file containing the configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum BatchCommands {
    /// Write `filename##md5` for every file
    Checksum(BatchArgs),
    /// Extract a sorted CDX index of the captured responses
    Cdx(BatchArgs),
    /// Extract crawl log lines from metadata records
    CrawlLog {
        /// Only lines of deduplicated URLs
        #[arg(long)]
        dedup: bool,
        #[command(flatten)]
        args: BatchArgs,
    },
}

impl BatchCommands {
    pub async fn run(self) -> anyhow::Result<()> {
        match self {
            Self::Checksum(args) => run_batch(ChecksumJob, args).await,
            Self::Cdx(args) => run_batch(RecordBatch::new(CdxJob), args).await,
            Self::CrawlLog { dedup, args } => {
                let job = if dedup {
                    CrawlLogJob::duplicates_only()
                } else {
                    CrawlLogJob::full()
                };
                run_batch(RecordBatch::new(job), args).await
            }
        }
    }
}

async fn run_batch(job: impl BatchJob + 'static, args: BatchArgs) -> anyhow::Result<()> {
    let BatchArgs {
        files,
        output,
        matching,
        config,
    } = args;
    let config = load_config(config.as_deref())?;
    let selection = match matching {
        Some(pattern) => FileSelection::matching(&pattern)?,
        None => FileSelection::All,
    };
    let result = BatchRunner::new(config.batch)
        .run(job, files, &selection, &output)
        .await?;
    report(&result);
    anyhow::ensure!(
        result.failed_files.is_empty(),
        "{} files could not be processed",
        result.failed_files.len()
    );
    Ok(())
}

fn report(result: &BatchResult) {
    println!("Files processed: {}", result.files_processed);
    println!("Records processed: {}", result.records_processed);
    for file in &result.failed_files {
        println!("Failed: {}", file.display());
    }
    for exception in &result.exceptions {
        let file = exception
            .file
            .as_ref()
            .map(|f| f.display().to_string())
            .unwrap_or_default();
        match exception.file_offset {
            Some(offset) => eprintln!("{} {file}@{offset}: {}", exception.phase, exception.error),
            None => eprintln!("{} {file}: {}", exception.phase, exception.error),
        }
    }
    if result.exceptions_dropped > 0 {
        eprintln!("{} more exceptions not shown", result.exceptions_dropped);
    }
}
