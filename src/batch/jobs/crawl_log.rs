// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::io::Write;
use std::sync::LazyLock;

use regex::Regex;

use crate::batch::{RecordFilter, RecordJob};
use crate::container::Record;

/// URL of the metadata records that hold a harvest's crawl log.
pub const CRAWL_LOG_URL_PATTERN: &str = r"metadata://[^/]*/crawl/logs/crawl\.log.*";

static CRAWL_LOG_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^(?:{CRAWL_LOG_URL_PATTERN})$")).expect("Infallible")
});

/// Marker left in crawl log annotations for URLs that were deduplicated.
const DUPLICATE_MARKER: &str = "duplicate:";

/// Copies crawl log lines out of metadata containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlLogJob {
    duplicates_only: bool,
}

impl CrawlLogJob {
    /// Keeps every crawl log line.
    pub fn full() -> Self {
        Self {
            duplicates_only: false,
        }
    }

    /// Keeps only the lines of URLs that were deduplicated.
    pub fn duplicates_only() -> Self {
        Self {
            duplicates_only: true,
        }
    }
}

impl RecordJob for CrawlLogJob {
    fn name(&self) -> String {
        if self.duplicates_only {
            "dedup-crawl-log".into()
        } else {
            "crawl-log".into()
        }
    }

    fn filter(&self) -> RecordFilter {
        RecordFilter::All(vec![
            RecordFilter::ExcludeFileHeaders,
            RecordFilter::UrlMatching(CRAWL_LOG_URL.clone()),
        ])
    }

    fn process_record(&mut self, record: &Record, output: &mut dyn Write) -> anyhow::Result<()> {
        let content = String::from_utf8_lossy(record.body());
        for line in content.lines() {
            if line.trim().is_empty() || (self.duplicates_only && !line.contains(DUPLICATE_MARKER))
            {
                continue;
            }
            writeln!(output, "{line}")?;
        }
        Ok(())
    }
}
