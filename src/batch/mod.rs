// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Batch jobs over container files.
//!
//! A [`BatchJob`] is driven over a list of files by [`run_job`] (synchronous)
//! or [`BatchRunner`] (asynchronous, with a timeout and atomic output).
//! Failures of single records or files are recorded in the [`BatchResult`]
//! and never abort the scan.

mod filter;
pub mod jobs;
mod result;
mod runner;

pub use filter::{FileSelection, RecordFilter};
pub use result::{BatchResult, ExceptionOccurrence, JobPhase};
pub use runner::{BatchConfig, BatchRunner, ScanContext, run_job};

use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::container::{Record, open_container};

/// A job that processes whole container files.
pub trait BatchJob: Send {
    fn name(&self) -> String;

    /// Maximum wall clock time for a whole run, `None` for the configured
    /// default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    fn initialize(&mut self, _output: &mut dyn Write) -> anyhow::Result<()> {
        Ok(())
    }

    /// Processes one file. Returns `false` if the file could not be
    /// processed; the reason is recorded in the context.
    fn process(&mut self, file: &Path, ctx: &mut ScanContext<'_>) -> bool;

    fn finish(&mut self, _output: &mut dyn Write) -> anyhow::Result<()> {
        Ok(())
    }

    /// Rewrites the complete output of a run. Returns `false` when the job
    /// has no post-processing, in which case `output` is ignored.
    fn post_process(
        &mut self,
        _input: &mut dyn BufRead,
        _output: &mut dyn Write,
    ) -> anyhow::Result<bool> {
        Ok(false)
    }
}

impl<J: BatchJob + ?Sized> BatchJob for Box<J> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn timeout(&self) -> Option<Duration> {
        (**self).timeout()
    }

    fn initialize(&mut self, output: &mut dyn Write) -> anyhow::Result<()> {
        (**self).initialize(output)
    }

    fn process(&mut self, file: &Path, ctx: &mut ScanContext<'_>) -> bool {
        (**self).process(file, ctx)
    }

    fn finish(&mut self, output: &mut dyn Write) -> anyhow::Result<()> {
        (**self).finish(output)
    }

    fn post_process(
        &mut self,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
    ) -> anyhow::Result<bool> {
        (**self).post_process(input, output)
    }
}

/// A job that processes the records of container files one at a time.
pub trait RecordJob: Send {
    fn name(&self) -> String;

    fn filter(&self) -> RecordFilter {
        RecordFilter::NoFilter
    }

    fn timeout(&self) -> Option<Duration> {
        None
    }

    fn initialize(&mut self, _output: &mut dyn Write) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called for every accepted record, in container order. An error is
    /// recorded against the record's offset and the scan goes on.
    fn process_record(&mut self, record: &Record, output: &mut dyn Write) -> anyhow::Result<()>;

    fn finish(&mut self, _output: &mut dyn Write) -> anyhow::Result<()> {
        Ok(())
    }

    fn post_process(
        &mut self,
        _input: &mut dyn BufRead,
        _output: &mut dyn Write,
    ) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Runs a [`RecordJob`] as a [`BatchJob`].
pub struct RecordBatch<J> {
    job: J,
    filter: RecordFilter,
}

impl<J: RecordJob> RecordBatch<J> {
    pub fn new(job: J) -> Self {
        let filter = job.filter();
        Self { job, filter }
    }
}

impl<J: RecordJob> BatchJob for RecordBatch<J> {
    fn name(&self) -> String {
        self.job.name()
    }

    fn timeout(&self) -> Option<Duration> {
        self.job.timeout()
    }

    fn initialize(&mut self, output: &mut dyn Write) -> anyhow::Result<()> {
        self.job.initialize(output)
    }

    fn process(&mut self, file: &Path, ctx: &mut ScanContext<'_>) -> bool {
        let reader = match open_container(file) {
            Ok(reader) => reader,
            Err(e) => {
                ctx.record_exception(JobPhase::Open, Some(file), None, &e.into());
                return false;
            }
        };
        for record in reader {
            if ctx.is_cancelled() {
                debug!("cancelled while processing {}", file.display());
                return false;
            }
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    ctx.record_exception(JobPhase::Open, Some(file), None, &e.into());
                    return false;
                }
            };
            if !self.filter.accept(&record) {
                continue;
            }
            ctx.result_mut().records_processed += 1;
            if let Err(e) = self.job.process_record(&record, ctx.output()) {
                ctx.record_exception(JobPhase::Record, Some(file), Some(record.offset), &e);
            }
        }
        true
    }

    fn finish(&mut self, output: &mut dyn Write) -> anyhow::Result<()> {
        self.job.finish(output)
    }

    fn post_process(
        &mut self,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
    ) -> anyhow::Result<bool> {
        self.job.post_process(input, output)
    }
}
