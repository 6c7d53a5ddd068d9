// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use strum::Display;
use tokio::sync::{Semaphore, oneshot};
use tracing::{debug, info, warn};

use super::builder::IndexBuilder;
use super::message::IndexRequestMessage;
use super::packaging;
use super::pending::InFlight;
use super::{IndexKind, JobSet};
use crate::error::{Error, Result};
use crate::utils::io::write_atomically;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct IndexServerConfig {
    #[default(PathBuf::from("index_server_cache"))]
    pub cache_dir: PathBuf,
    /// Requests in progress are kept here to survive a restart.
    #[default(PathBuf::from("index_requests"))]
    pub request_dir: PathBuf,
    /// Where packaged results are handed to clients.
    #[default(PathBuf::from("index_transfer"))]
    pub transfer_dir: PathBuf,
    #[default(2)]
    pub max_concurrent_requests: usize,
    /// Above this share of requested jobs found, the index of the found jobs
    /// is served for the whole request.
    #[default(70)]
    pub satisfactory_threshold_percentage: u8,
}

/// Life of one request on the server. Both completed states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Received,
    Dispatched,
    CompletedOk,
    CompletedFailed,
}

/// Answers index requests from the cache, building missing indexes with
/// the batch engine.
pub struct IndexRequestServer {
    config: IndexServerConfig,
    builder: IndexBuilder,
    permits: Semaphore,
    in_flight: InFlight<(IndexKind, JobSet)>,
}

impl IndexRequestServer {
    pub fn new(config: IndexServerConfig, builder: IndexBuilder) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&config.request_dir)?;
        std::fs::create_dir_all(&config.transfer_dir)?;
        let permits = Semaphore::new(config.max_concurrent_requests.max(1));
        Ok(Arc::new(Self {
            config,
            builder,
            permits,
            in_flight: InFlight::default(),
        }))
    }

    pub fn config(&self) -> &IndexServerConfig {
        &self.config
    }

    /// Handles one request and returns it as the reply.
    ///
    /// The work runs on its own task: a caller that stops waiting does not
    /// stop it, and its result still lands in the cache. The packaged files
    /// of a reply nobody receives are removed.
    pub async fn handle(self: &Arc<Self>, request: IndexRequestMessage) -> IndexRequestMessage {
        log_state(&request, RequestState::Received);
        if let Err(e) = self.store(&request) {
            let mut reply = request;
            warn!("unable to store request {}: {e}", reply.id());
            reply.set_not_ok(format!("unable to initiate indexing: {e}"));
            log_state(&reply, RequestState::CompletedFailed);
            return reply;
        }
        let mut fallback = request.clone();
        let (tx, rx) = oneshot::channel();
        let server = self.clone();
        tokio::spawn(async move {
            let reply = server.process(request).await;
            if let Err(unclaimed) = tx.send(reply) {
                debug!("nobody waits for the reply to {}", unclaimed.id());
                discard_payload(&unclaimed);
            }
        });
        match rx.await {
            Ok(reply) => reply,
            Err(e) => {
                fallback.set_not_ok(format!("index request {} aborted: {e}", fallback.id()));
                fallback
            }
        }
    }

    /// Reprocesses the requests stored by an earlier run. Their replies have
    /// no one waiting, so this only fills the cache. Returns the number of
    /// requests restored.
    pub async fn restore_pending(self: &Arc<Self>) -> Result<usize> {
        let requests = self.stored_requests()?;
        let count = requests.len();
        for request in &requests {
            info!("restarting index request {}", request.id());
        }
        let replies = futures::future::join_all(requests.into_iter().map(|request| {
            let server = self.clone();
            async move { server.process(request).await }
        }))
        .await;
        replies.iter().for_each(discard_payload);
        let failed = replies.iter().filter(|r| !r.is_ok()).count();
        info!("restored {count} index requests, {failed} failed");
        Ok(count)
    }

    #[tracing::instrument(skip_all, fields(id = %request.id()))]
    async fn process(self: Arc<Self>, mut request: IndexRequestMessage) -> IndexRequestMessage {
        let outcome = match self.permits.acquire().await {
            Ok(_permit) => {
                log_state(&request, RequestState::Dispatched);
                self.answer(&mut request).await
            }
            Err(e) => Err(Error::illegal_state(format!("server is shutting down: {e}"))),
        };
        if let Err(e) = outcome {
            warn!("unable to generate index for request {}: {e}", request.id());
            request.set_not_ok(e.to_string());
        }
        self.forget(&request);
        let state = if request.is_ok() {
            RequestState::CompletedOk
        } else {
            RequestState::CompletedFailed
        };
        log_state(&request, state);
        request
    }

    async fn answer(&self, request: &mut IndexRequestMessage) -> Result<()> {
        let (kind, jobs) = request.validate()?;
        let jobs = jobs.clone();
        info!(
            "request for a {kind} index of the {} jobs {jobs}",
            jobs.len()
        );
        let key = (kind, jobs.clone());
        self.in_flight
            .run(&key, || async {
                let found = self.builder.build(kind, &jobs).await?;
                let cache = self.builder.cache(kind);
                let entry = if found == jobs {
                    info!("{kind} index of jobs {jobs} is available");
                    cache.lookup(&jobs)
                } else if found.is_empty() {
                    return Err(Error::illegal_state(format!(
                        "no containers found for any of the jobs {jobs}"
                    )));
                } else if self.satisfactory(&found, &jobs) {
                    info!(
                        "only found data for {} of {} jobs, serving the {kind} index of jobs {found} for {jobs}",
                        found.len(),
                        jobs.len()
                    );
                    let built = self.builder.build(kind, &found).await?;
                    if built != found {
                        return Err(Error::illegal_state(format!(
                            "containers of jobs {} disappeared while indexing",
                            found.missing(&built)
                        )));
                    }
                    Some(cache.copy_entry(&found, &jobs)?)
                } else {
                    warn!(
                        "failed generating {kind} index of jobs {jobs}, missing data for jobs {}",
                        jobs.missing(&found)
                    );
                    request.set_found_jobs(found)?;
                    return Ok(());
                };
                let entry = entry.ok_or_else(|| {
                    Error::illegal_state(format!(
                        "{kind} index of jobs {jobs} vanished from the cache"
                    ))
                })?;
                let payload = packaging::package(&cache, &entry, &self.config.transfer_dir)?;
                request.set_found_jobs(jobs.clone())?;
                request.set_payload(payload)
            })
            .await
    }

    fn satisfactory(&self, found: &JobSet, requested: &JobSet) -> bool {
        if requested.is_empty() {
            return false;
        }
        let percentage = found.len() * 100 / requested.len();
        percentage > usize::from(self.config.satisfactory_threshold_percentage)
    }

    fn request_path(&self, id: &str) -> PathBuf {
        self.config.request_dir.join(format!("{id}.json"))
    }

    fn store(&self, request: &IndexRequestMessage) -> Result<()> {
        let path = self.request_path(request.id());
        debug!("storing request to {}", path.display());
        write_atomically(&path, &request.to_json()?)?;
        Ok(())
    }

    fn forget(&self, request: &IndexRequestMessage) {
        let path = self.request_path(request.id());
        if let Err(e) = std::fs::remove_file(&path) {
            debug!("stored request {} not removed: {e}", path.display());
        }
    }

    fn stored_requests(&self) -> Result<Vec<IndexRequestMessage>> {
        let mut requests = vec![];
        for entry in std::fs::read_dir(&self.config.request_dir)? {
            let path = entry?.path();
            if !is_stored_request(&path) {
                debug!("ignoring {} in the request directory", path.display());
                continue;
            }
            let restored = std::fs::read(&path)
                .map_err(Error::from)
                .and_then(|bytes| IndexRequestMessage::from_json(&bytes));
            match restored {
                Ok(request) => requests.push(request),
                Err(e) => warn!("unable to restore request from {}: {e}", path.display()),
            }
        }
        requests.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(requests)
    }
}

fn is_stored_request(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "json")
}

fn discard_payload(reply: &IndexRequestMessage) {
    if let Some(payload) = reply.payload() {
        packaging::discard(payload);
    }
}

fn log_state(request: &IndexRequestMessage, state: RequestState) {
    match state {
        RequestState::Received | RequestState::Dispatched => {
            debug!("index request {} {state}", request.id())
        }
        RequestState::CompletedOk | RequestState::CompletedFailed => {
            info!("index request {} {state}", request.id())
        }
    }
}
