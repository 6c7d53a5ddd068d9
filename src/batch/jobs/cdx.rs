// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::io::{self, BufRead, Write};

use itertools::Itertools as _;

use crate::batch::{RecordFilter, RecordJob};
use crate::container::Record;
use crate::utils::io::md5_hex;

/// Extracts one CDX line per captured response:
/// `url ip date mime length container offset md5`.
///
/// The output is sorted, so that the result over a set of containers does
/// not depend on the order they were scanned in.
#[derive(Debug, Default)]
pub struct CdxJob;

impl CdxJob {
    fn line(record: &Record) -> io::Result<String> {
        let field = |s: &str| {
            if s.is_empty() {
                "-".to_owned()
            } else {
                s.split_whitespace().join("%20")
            }
        };
        Ok(format!(
            "{} {} {} {} {} {} {} {}",
            field(&record.url),
            field(&record.ip),
            field(&record.date),
            field(&record.mime),
            record.length(),
            record.container,
            record.offset,
            md5_hex(&record.payload[..])?
        ))
    }
}

impl RecordJob for CdxJob {
    fn name(&self) -> String {
        "cdx".into()
    }

    fn filter(&self) -> RecordFilter {
        RecordFilter::ExcludeNonResponse
    }

    fn process_record(&mut self, record: &Record, output: &mut dyn Write) -> anyhow::Result<()> {
        writeln!(output, "{}", Self::line(record)?)?;
        Ok(())
    }

    fn post_process(
        &mut self,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
    ) -> anyhow::Result<bool> {
        let lines: Vec<String> = input.lines().collect::<io::Result<_>>()?;
        for line in lines.into_iter().sorted() {
            writeln!(output, "{line}")?;
        }
        Ok(true)
    }
}
