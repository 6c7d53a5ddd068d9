// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The index request service.
//!
//! Indexes (CDX files, crawl log extracts) are derived from the containers of
//! a set of harvest jobs. A [`IndexRequestClient`] answers from its local
//! cache or asks an [`IndexRequestServer`] over an [`IndexTransport`]; the
//! server computes missing indexes with the batch engine and caches them too.
//! Identical requests in flight at the same time share one computation.

mod builder;
mod cache;
mod client;
mod message;
mod packaging;
mod pending;
mod registry;
mod server;
mod transport;

pub use builder::IndexBuilder;
pub use cache::IndexCache;
pub use client::{IndexClientConfig, IndexRequestClient, IndexResult};
pub use message::{IndexRequestMessage, Payload};
pub use pending::InFlight;
pub use registry::IndexClients;
pub use server::{IndexRequestServer, IndexServerConfig, RequestState};
pub use transport::{InProcessTransport, IndexTransport};

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools as _;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::batch::jobs::{CdxJob, CrawlLogJob};
use crate::batch::{BatchJob, RecordBatch};
use crate::replica::FileClass;
use crate::utils::io::md5_hex;

/// Cache names longer than this are shortened with a digest.
const MAX_CACHE_NAME_LENGTH: usize = 60;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexKind {
    /// Every crawl log line of the jobs.
    FullCrawlLog,
    /// Only the crawl log lines of deduplicated (already archived) URLs.
    DedupCrawlLog,
    /// A sorted CDX file of the jobs' responses.
    Cdx,
}

/// How an index is delivered: one file, or a directory of files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PayloadShape {
    Single,
    Multi,
}

impl IndexKind {
    pub fn shape(self) -> PayloadShape {
        match self {
            Self::Cdx => PayloadShape::Single,
            Self::FullCrawlLog | Self::DedupCrawlLog => PayloadShape::Multi,
        }
    }

    /// The containers the index is computed from.
    pub fn source_class(self) -> FileClass {
        match self {
            Self::Cdx => FileClass::Data,
            Self::FullCrawlLog | Self::DedupCrawlLog => FileClass::Metadata,
        }
    }

    /// A fresh batch job computing this kind of index.
    pub fn batch_job(self) -> Box<dyn BatchJob> {
        match self {
            Self::Cdx => Box::new(RecordBatch::new(CdxJob::default())),
            Self::FullCrawlLog => Box::new(RecordBatch::new(CrawlLogJob::full())),
            Self::DedupCrawlLog => Box::new(RecordBatch::new(CrawlLogJob::duplicates_only())),
        }
    }

    /// Directory name of this kind's cache.
    pub fn dir_name(self) -> String {
        self.to_string().to_lowercase()
    }
}

/// An exact set of harvest job ids. Two sets are the same request only if
/// they hold the same ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobSet(BTreeSet<u64>);

impl JobSet {
    pub fn new(ids: impl IntoIterator<Item = u64>) -> Self {
        Self(ids.into_iter().collect())
    }

    /// Ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.0.contains(&id)
    }

    pub fn is_subset(&self, other: &JobSet) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Ids of `self` missing from `found`.
    pub fn missing(&self, found: &JobSet) -> JobSet {
        Self(self.0.difference(&found.0).copied().collect())
    }

    /// File name of the cache entry for this set: the sorted ids joined with
    /// `-`, shortened to `<first>-<last>-<md5>` when too long.
    pub fn cache_name(&self) -> String {
        let (Some(first), Some(last)) = (self.0.first(), self.0.last()) else {
            return "empty-cache".to_owned();
        };
        let joined = self.0.iter().join("-");
        if joined.len() + "-cache".len() <= MAX_CACHE_NAME_LENGTH {
            return format!("{joined}-cache");
        }
        // md5 over an in-memory buffer cannot fail
        let digest = md5_hex(joined.as_bytes()).unwrap_or_default();
        format!("{first}-{last}-{digest}-cache")
    }

    /// Parses a comma separated list, as given on the command line.
    pub fn parse(list: &str) -> anyhow::Result<Self> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u64>()
                    .map_err(|e| anyhow::anyhow!("invalid job id '{s}': {e}"))
            })
            .collect()
    }
}

impl FromIterator<u64> for JobSet {
    fn from_iter<T: IntoIterator<Item = u64>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl fmt::Display for JobSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.iter().join(","))
    }
}
