// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use smart_default::SmartDefault;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use super::{BatchJob, BatchResult, ExceptionOccurrence, FileSelection, JobPhase};
use crate::error::{Error, Result};

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct BatchConfig {
    /// Timeout of jobs that do not declare their own. One week.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[default(Duration::from_secs(7 * 24 * 60 * 60))]
    pub default_timeout: Duration,
    /// Number of exception occurrences kept per run.
    #[default(100)]
    pub max_exceptions: usize,
}

/// What a [`BatchJob`] sees while processing a file: the output stream,
/// the result being built and the cancellation flag.
pub struct ScanContext<'a> {
    output: CountingWriter<&'a mut dyn Write>,
    result: BatchResult,
    cancel: CancellationToken,
    max_exceptions: usize,
}

impl<'a> ScanContext<'a> {
    fn new(output: &'a mut dyn Write, cancel: CancellationToken, max_exceptions: usize) -> Self {
        Self {
            output: CountingWriter {
                inner: output,
                written: 0,
            },
            result: BatchResult::default(),
            cancel,
            max_exceptions,
        }
    }

    pub fn output(&mut self) -> &mut dyn Write {
        &mut self.output
    }

    pub fn output_offset(&self) -> u64 {
        self.output.written
    }

    pub fn result_mut(&mut self) -> &mut BatchResult {
        &mut self.result
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn record_exception(
        &mut self,
        phase: JobPhase,
        file: Option<&Path>,
        file_offset: Option<u64>,
        error: &anyhow::Error,
    ) {
        trace!(
            "{phase} exception in {:?} at {file_offset:?}: {error:#}",
            file.map(Path::display)
        );
        if self.result.exceptions.len() >= self.max_exceptions {
            self.result.exceptions_dropped += 1;
            return;
        }
        self.result.exceptions.push(ExceptionOccurrence {
            phase,
            file: file.map(Path::to_path_buf),
            file_offset,
            output_offset: self.output.written,
            error: format!("{error:#}"),
        });
    }
}

/// Drives `job` over `files` in the given order, on the current thread.
///
/// `initialize` and `finish` are called exactly once; a failing file only
/// adds to `failed_files`. Processing stops early once `cancel` fires.
pub fn run_job(
    job: &mut dyn BatchJob,
    files: &[PathBuf],
    output: &mut dyn Write,
    cancel: &CancellationToken,
    max_exceptions: usize,
) -> BatchResult {
    let mut ctx = ScanContext::new(output, cancel.clone(), max_exceptions);
    if let Err(e) = job.initialize(ctx.output()) {
        ctx.record_exception(JobPhase::Initialize, None, None, &e);
    }
    for file in files {
        if ctx.is_cancelled() {
            break;
        }
        if job.process(file, &mut ctx) {
            ctx.result.files_processed += 1;
        } else {
            warn!("batch job {} failed on {}", job.name(), file.display());
            ctx.result.failed_files.insert(file.clone());
        }
    }
    if let Err(e) = job.finish(ctx.output()) {
        ctx.record_exception(JobPhase::Finish, None, None, &e);
    }
    ctx.result
}

/// Runs batch jobs on a blocking thread, bounded by a timeout, and publishes
/// their output only when they complete.
#[derive(Debug, Clone, Default)]
pub struct BatchRunner {
    config: BatchConfig,
}

impl BatchRunner {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Runs `job` over the selected `files` in lexicographic order and moves
    /// the output to `output`.
    ///
    /// On timeout the job is cancelled, its partial output is deleted and
    /// [`Error::Timeout`] is returned; `output` is left untouched.
    #[tracing::instrument(skip_all, fields(job = %job.name()))]
    pub async fn run<J>(
        &self,
        mut job: J,
        files: Vec<PathBuf>,
        selection: &FileSelection,
        output: &Path,
    ) -> Result<BatchResult>
    where
        J: BatchJob + 'static,
    {
        let name = job.name();
        let timeout = job.timeout().unwrap_or(self.config.default_timeout);
        let files = selection.select(files);
        let out_dir = match output.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&out_dir)?;

        info!("starting batch job {name} on {} files", files.len());
        let cancel = CancellationToken::new();
        let max_exceptions = self.config.max_exceptions;
        let task = tokio::task::spawn_blocking({
            let cancel = cancel.clone();
            move || -> Result<(BatchResult, NamedTempFile)> {
                let mut raw = NamedTempFile::new_in(&out_dir)?;
                let result = {
                    let mut writer = BufWriter::new(raw.as_file_mut());
                    let result = run_job(&mut job, &files, &mut writer, &cancel, max_exceptions);
                    writer.flush()?;
                    result
                };
                let mut processed = NamedTempFile::new_in(&out_dir)?;
                let rewritten = {
                    let mut input = BufReader::new(File::open(raw.path())?);
                    let mut writer = BufWriter::new(processed.as_file_mut());
                    let rewritten = job
                        .post_process(&mut input, &mut writer)
                        .map_err(|e| Error::io_failure("post-processing failed", e))?;
                    writer.flush()?;
                    rewritten
                };
                let published = if rewritten { processed } else { raw };
                published.as_file().sync_all()?;
                Ok((result, published))
            }
        });

        match tokio::time::timeout(timeout, task).await {
            Err(_) => {
                cancel.cancel();
                warn!(
                    "batch job {name} timed out after {}",
                    humantime::format_duration(timeout)
                );
                Err(Error::timeout(format!("batch job {name}"), timeout))
            }
            Ok(Err(e)) => Err(Error::io_failure(format!("batch job {name} aborted"), e)),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Ok(Ok((result, published)))) => {
                published
                    .persist(output)
                    .map_err(|e| Error::io_failure("failed to publish batch output", e.error))?;
                info!(
                    "batch job {name} done: {} files, {} records, {} failed files, {} exceptions",
                    result.files_processed,
                    result.records_processed,
                    result.failed_files.len(),
                    result.exceptions.len()
                );
                Ok(result)
            }
        }
    }
}

struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
