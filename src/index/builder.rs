// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::cache::IndexCache;
use super::{IndexKind, JobSet, PayloadShape};
use crate::batch::{BatchResult, BatchRunner, FileSelection};
use crate::error::{Error, Result};
use crate::replica::{JobFileIndex, Replica};

/// Computes indexes from the containers of a replica and keeps them in the
/// server side cache.
pub struct IndexBuilder {
    replica: Arc<dyn Replica>,
    runner: BatchRunner,
    cache_dir: PathBuf,
}

impl IndexBuilder {
    pub fn new(
        replica: Arc<dyn Replica>,
        runner: BatchRunner,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            replica,
            runner,
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache(&self, kind: IndexKind) -> IndexCache {
        IndexCache::new(&self.cache_dir, kind)
    }

    /// Makes sure the index of `jobs` is cached, if all of them have
    /// containers. Returns the jobs that have; the index is built only when
    /// that is all of them.
    pub async fn build(&self, kind: IndexKind, jobs: &JobSet) -> Result<JobSet> {
        let cache = self.cache(kind);
        if cache.lookup(jobs).is_some() {
            debug!("{kind} index of jobs {jobs} is cached");
            return Ok(jobs.clone());
        }

        let replica = self.replica.clone();
        let files = tokio::task::spawn_blocking(move || JobFileIndex::build(replica.as_ref()))
            .await
            .map_err(|e| Error::io_failure("replica listing aborted", e))?
            .map_err(|e| {
                Error::io_failure(format!("failed to list replica {}", self.replica.id()), e)
            })?;

        let class = kind.source_class();
        let found = files.found(jobs, class);
        if &found != jobs {
            debug!(
                "{kind} index of jobs {jobs}: containers of jobs {} missing",
                jobs.missing(&found)
            );
            return Ok(found);
        }

        let sources = files.files(jobs, class);
        let staging = cache.staging()?;
        let staged = cache.staged_path(&staging)?;
        info!(
            "building {kind} index of jobs {jobs} from {} containers",
            sources.len()
        );
        match kind.shape() {
            PayloadShape::Single => {
                let result = self
                    .runner
                    .run(kind.batch_job(), sources, &FileSelection::All, &staged)
                    .await?;
                check_result(kind, jobs, &result)?;
            }
            PayloadShape::Multi => {
                // one output per container
                for source in sources {
                    let output = staged.join(output_name(&source));
                    let result = self
                        .runner
                        .run(kind.batch_job(), vec![source], &FileSelection::All, &output)
                        .await?;
                    check_result(kind, jobs, &result)?;
                }
            }
        }
        cache.publish(jobs, &staged)?;
        Ok(found)
    }
}

fn output_name(source: &Path) -> String {
    source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// An unreadable container fails the index. Record level exceptions are
/// logged and tolerated.
fn check_result(kind: IndexKind, jobs: &JobSet, result: &BatchResult) -> Result<()> {
    if let Some(file) = result.failed_files.iter().next() {
        let reason = result
            .exceptions_for(file)
            .next()
            .map(|e| e.error.clone())
            .unwrap_or_default();
        return Err(Error::io_failure(
            format!(
                "{kind} index of jobs {jobs}: {} of the containers could not be read",
                result.failed_files.len()
            ),
            anyhow::anyhow!("{}: {reason}", file.display()),
        ));
    }
    if !result.is_clean() {
        warn!(
            "{kind} index of jobs {jobs}: {} record exceptions ({} not kept)",
            result.exceptions.len(),
            result.exceptions_dropped
        );
    }
    Ok(())
}
