// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Batch jobs shipped with the crate.

mod cdx;
mod checksum;
mod crawl_log;

pub use cdx::CdxJob;
pub use checksum::{CHECKSUM_SEPARATOR, ChecksumJob, checksum_line, parse_checksum_line};
pub use crawl_log::CrawlLogJob;
