// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::Path;

use crate::batch::{BatchJob, JobPhase, ScanContext};
use crate::utils::io::md5_hex_of_file;

/// Separates filename and checksum in checksum listings.
pub const CHECKSUM_SEPARATOR: &str = "##";

/// Renders one `filename##checksum` listing line, without newline.
pub fn checksum_line(filename: &str, checksum: &str) -> String {
    format!("{filename}{CHECKSUM_SEPARATOR}{checksum}")
}

/// Splits a listing line into filename and checksum.
pub fn parse_checksum_line(line: &str) -> Option<(&str, &str)> {
    let (filename, checksum) = line.trim_end().split_once(CHECKSUM_SEPARATOR)?;
    (!filename.is_empty() && !checksum.is_empty() && !checksum.contains(CHECKSUM_SEPARATOR))
        .then_some((filename, checksum))
}

/// Writes a `filename##md5` line for every file.
#[derive(Debug, Default)]
pub struct ChecksumJob;

impl BatchJob for ChecksumJob {
    fn name(&self) -> String {
        "checksum".into()
    }

    fn process(&mut self, file: &Path, ctx: &mut ScanContext<'_>) -> bool {
        let outcome = md5_hex_of_file(file).and_then(|checksum| {
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            writeln!(ctx.output(), "{}", checksum_line(&filename, &checksum))
        });
        match outcome {
            Ok(()) => true,
            Err(e) => {
                ctx.record_exception(JobPhase::File, Some(file), None, &e.into());
                false
            }
        }
    }
}
