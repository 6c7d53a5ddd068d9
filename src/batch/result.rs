// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::Display;

/// Stage of a batch job in which an exception occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum JobPhase {
    Initialize,
    /// The container could not be opened or read.
    Open,
    /// A file level job failed on a whole file.
    File,
    Record,
    Finish,
}

/// A failure recorded during a scan instead of aborting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionOccurrence {
    pub phase: JobPhase,
    pub file: Option<PathBuf>,
    /// Offset of the failing record in its container, when known.
    pub file_offset: Option<u64>,
    /// Number of bytes the job had written when the failure occurred.
    pub output_offset: u64,
    pub error: String,
}

/// Outcome of one batch run. Built by a single run and never shared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Containers processed to the end.
    pub files_processed: u64,
    /// Records handed to the job, including those whose processing failed.
    pub records_processed: u64,
    pub failed_files: BTreeSet<PathBuf>,
    /// Exceptions in the order they occurred, up to the configured cap.
    pub exceptions: Vec<ExceptionOccurrence>,
    /// Exceptions not kept because the cap was reached.
    pub exceptions_dropped: u64,
}

impl BatchResult {
    /// True when no file failed and no exception was raised.
    pub fn is_clean(&self) -> bool {
        self.failed_files.is_empty() && self.exceptions.is_empty() && self.exceptions_dropped == 0
    }

    pub fn exceptions_for<'a>(
        &'a self,
        file: &'a Path,
    ) -> impl Iterator<Item = &'a ExceptionOccurrence> + 'a {
        self.exceptions
            .iter()
            .filter(move |e| e.file.as_deref() == Some(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_result() {
        let mut result = BatchResult::default();
        assert!(result.is_clean());
        result.exceptions_dropped = 1;
        assert!(!result.is_clean());
    }

    #[test]
    fn exceptions_are_grouped_by_file() {
        let occurrence = |file: &str| ExceptionOccurrence {
            phase: JobPhase::Record,
            file: Some(file.into()),
            file_offset: Some(0),
            output_offset: 0,
            error: "boom".into(),
        };
        let result = BatchResult {
            exceptions: vec![occurrence("a.warc"), occurrence("b.warc"), occurrence("a.warc")],
            ..Default::default()
        };
        assert_eq!(result.exceptions_for(Path::new("a.warc")).count(), 2);
        assert_eq!(result.exceptions_for(Path::new("c.warc")).count(), 0);
    }
}
