// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use smart_default::SmartDefault;
use tracing::{debug, info};

use super::cache::IndexCache;
use super::message::{IndexRequestMessage, Payload};
use super::packaging;
use super::pending::InFlight;
use super::transport::IndexTransport;
use super::{IndexKind, JobSet, PayloadShape};
use crate::error::{Error, Result};

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct IndexClientConfig {
    #[default(PathBuf::from("index_client_cache"))]
    pub cache_dir: PathBuf,
    /// How long to wait for the server to answer. Twelve hours.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[default(Duration::from_secs(12 * 60 * 60))]
    pub request_timeout: Duration,
}

/// A cached index, covering `found_job_ids` out of the requested `job_ids`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexResult {
    kind: IndexKind,
    job_ids: JobSet,
    found_job_ids: JobSet,
    entry: PathBuf,
}

impl IndexResult {
    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn job_ids(&self) -> &JobSet {
        &self.job_ids
    }

    pub fn found_job_ids(&self) -> &JobSet {
        &self.found_job_ids
    }

    /// True when the index covers every requested job.
    pub fn is_complete(&self) -> bool {
        self.found_job_ids == self.job_ids
    }

    pub fn shape(&self) -> PayloadShape {
        self.kind.shape()
    }

    /// The index file of a single-file index.
    pub fn index_file(&self) -> Result<&Path> {
        match self.shape() {
            PayloadShape::Single => Ok(&self.entry),
            PayloadShape::Multi => Err(Error::illegal_state(format!(
                "a {} index is a directory of files",
                self.kind
            ))),
        }
    }

    /// The directory of a multi-file index.
    pub fn index_dir(&self) -> Result<&Path> {
        match self.shape() {
            PayloadShape::Multi => Ok(&self.entry),
            PayloadShape::Single => Err(Error::illegal_state(format!(
                "a {} index is a single file",
                self.kind
            ))),
        }
    }

    /// The files of a multi-file index, sorted by name.
    pub fn index_files(&self) -> Result<Vec<PathBuf>> {
        let dir = self.index_dir()?;
        let mut files = std::fs::read_dir(dir)?
            .map(|e| e.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        files.sort();
        Ok(files)
    }
}

/// Fetches indexes of one kind, from the local cache when possible.
pub struct IndexRequestClient {
    kind: IndexKind,
    cache: IndexCache,
    transport: Arc<dyn IndexTransport>,
    timeout: Duration,
    in_flight: InFlight<JobSet>,
}

impl IndexRequestClient {
    pub fn new(
        kind: IndexKind,
        config: &IndexClientConfig,
        transport: Arc<dyn IndexTransport>,
    ) -> Self {
        Self {
            kind,
            cache: IndexCache::new(&config.cache_dir, kind),
            transport,
            timeout: config.request_timeout,
            in_flight: InFlight::default(),
        }
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn cache(&self) -> &IndexCache {
        &self.cache
    }

    /// The index of `jobs`.
    ///
    /// When only some of the jobs have data the result is the index of
    /// those, fetched under their own cache key.
    #[tracing::instrument(skip_all, fields(kind = %self.kind, jobs = %jobs))]
    pub async fn get_index(&self, jobs: &JobSet) -> Result<IndexResult> {
        let found = self.cache_data(jobs).await?;
        if &found != jobs {
            info!("only jobs {found} of {jobs} have data, requesting their index");
            let refound = self.cache_data(&found).await?;
            if refound != found {
                return Err(Error::illegal_state(format!(
                    "{} index of jobs {found}: server now only finds jobs {refound}",
                    self.kind
                )));
            }
        }
        Ok(IndexResult {
            kind: self.kind,
            job_ids: jobs.clone(),
            entry: self.cache.entry_path(&found),
            found_job_ids: found,
        })
    }

    /// Makes sure the index of `jobs` is in the local cache if the server
    /// has data for all of them. Returns the jobs the server has data for.
    async fn cache_data(&self, jobs: &JobSet) -> Result<JobSet> {
        if self.cache.lookup(jobs).is_some() {
            debug!("{} index of jobs {jobs} found in the local cache", self.kind);
            return Ok(jobs.clone());
        }
        self.in_flight
            .run(jobs, || async {
                // whoever held the key before may have fetched it
                if self.cache.lookup(jobs).is_some() {
                    debug!("{} index of jobs {jobs} fetched meanwhile", self.kind);
                    return Ok(jobs.clone());
                }
                self.request(jobs).await
            })
            .await
    }

    async fn request(&self, jobs: &JobSet) -> Result<JobSet> {
        let kind = self.kind;
        info!("requesting a {kind} index of the jobs {jobs}");
        debug!(
            "waiting {} for the index",
            humantime::format_duration(self.timeout)
        );
        let request = IndexRequestMessage::new(kind, jobs.clone());
        let reply = match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Err(_) => {
                return Err(Error::timeout(
                    format!("{kind} index request for jobs {jobs}"),
                    self.timeout,
                ));
            }
            Ok(Err(e)) => {
                return Err(Error::io_failure(
                    format!("failed to send the {kind} index request for jobs {jobs}"),
                    e,
                ));
            }
            Ok(Ok(reply)) => reply,
        };
        let found = self.check_reply(jobs, &reply)?;
        if &found == jobs {
            let payload = match kind.shape() {
                PayloadShape::Single => Payload::Single(reply.result_file()?.to_owned()),
                PayloadShape::Multi => Payload::Multi(reply.result_files()?.to_vec()),
            };
            let cache = self.cache.clone();
            let owned_jobs = jobs.clone();
            tokio::task::spawn_blocking(move || packaging::unpack(&cache, &owned_jobs, &payload))
                .await
                .map_err(|e| Error::io_failure("unpacking the index aborted", e))?
                .map_err(|e| Error::io_failure(format!("failed to unpack the {kind} index"), e))?;
            debug!("received the {kind} index of jobs {jobs}");
        } else {
            if let Some(payload) = reply.payload() {
                packaging::discard(payload);
            }
            debug!(
                "no {kind} index received, jobs {} were not found",
                jobs.missing(&found)
            );
        }
        Ok(found)
    }

    fn check_reply(&self, jobs: &JobSet, reply: &IndexRequestMessage) -> Result<JobSet> {
        let kind = self.kind;
        if !reply.is_ok() {
            return Err(Error::illegal_state(format!(
                "reply not ok: '{}' in {kind} index request for jobs {jobs}",
                reply.error().unwrap_or_default()
            )));
        }
        let found = reply.found_jobs().cloned().ok_or_else(|| {
            Error::illegal_state(format!(
                "reply to the {kind} index request for jobs {jobs} lacks the found jobs"
            ))
        })?;
        if !found.is_subset(jobs) {
            return Err(Error::illegal_state(format!(
                "found jobs {found} are not a subset of the requested jobs {jobs}"
            )));
        }
        Ok(found)
    }
}
