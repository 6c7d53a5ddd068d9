// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::{IndexKind, JobSet, PayloadShape};
use crate::error::{Error, Result};

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Files carrying an index from the server to the client, gzip compressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "files", rename_all = "lowercase")]
pub enum Payload {
    Single(PathBuf),
    Multi(Vec<PathBuf>),
}

impl Payload {
    pub fn shape(&self) -> PayloadShape {
        match self {
            Self::Single(_) => PayloadShape::Single,
            Self::Multi(_) => PayloadShape::Multi,
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        match self {
            Self::Single(file) => std::slice::from_ref(file),
            Self::Multi(files) => files,
        }
    }
}

/// Request for an index, answered in place by the server.
///
/// The requested fields are optional on the wire; the server rejects a
/// message without them. The reply fields may each be set once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRequestMessage {
    id: String,
    kind: Option<IndexKind>,
    requested_jobs: Option<JobSet>,
    #[serde(default = "default_ok")]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    found_jobs: Option<JobSet>,
    #[serde(default)]
    payload: Option<Payload>,
}

fn default_ok() -> bool {
    true
}

impl IndexRequestMessage {
    pub fn new(kind: IndexKind, jobs: JobSet) -> Self {
        let sequence = NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let id = format!(
            "{}-{}-{}-{sequence}",
            kind.dir_name(),
            std::process::id(),
            chrono::Utc::now().timestamp_millis()
        );
        Self {
            id,
            kind: Some(kind),
            requested_jobs: Some(jobs),
            ok: true,
            error: None,
            found_jobs: None,
            payload: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> Option<IndexKind> {
        self.kind
    }

    pub fn requested_jobs(&self) -> Option<&JobSet> {
        self.requested_jobs.as_ref()
    }

    /// Checks the request fields, returning them.
    pub fn validate(&self) -> Result<(IndexKind, &JobSet)> {
        let kind = self
            .kind
            .ok_or_else(|| Error::argument(format!("request {} has no index kind", self.id)))?;
        let jobs = self
            .requested_jobs
            .as_ref()
            .ok_or_else(|| Error::argument(format!("request {} has no job set", self.id)))?;
        Ok((kind, jobs))
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Marks the reply as failed. Any partial result is dropped.
    pub fn set_not_ok(&mut self, reason: impl Into<String>) {
        self.ok = false;
        self.error = Some(reason.into());
        self.found_jobs = None;
        self.payload = None;
    }

    pub fn found_jobs(&self) -> Option<&JobSet> {
        self.found_jobs.as_ref()
    }

    pub fn set_found_jobs(&mut self, jobs: JobSet) -> Result<()> {
        if self.found_jobs.is_some() {
            return Err(Error::illegal_state(format!(
                "request {} already has found jobs",
                self.id
            )));
        }
        self.found_jobs = Some(jobs);
        Ok(())
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn set_payload(&mut self, payload: Payload) -> Result<()> {
        if self.payload.is_some() {
            return Err(Error::illegal_state(format!(
                "request {} already has result",
                self.id
            )));
        }
        self.payload = Some(payload);
        Ok(())
    }

    /// The single result file. Fails on a multi-file reply.
    pub fn result_file(&self) -> Result<&Path> {
        match &self.payload {
            Some(Payload::Single(file)) => Ok(file),
            Some(Payload::Multi(_)) => Err(Error::illegal_state(format!(
                "request {} carries multiple result files",
                self.id
            ))),
            None => Err(Error::illegal_state(format!(
                "request {} carries no result",
                self.id
            ))),
        }
    }

    /// The result files. Fails on a single-file reply.
    pub fn result_files(&self) -> Result<&[PathBuf]> {
        match &self.payload {
            Some(Payload::Multi(files)) => Ok(files),
            Some(Payload::Single(_)) => Err(Error::illegal_state(format!(
                "request {} carries a single result file",
                self.id
            ))),
            None => Err(Error::illegal_state(format!(
                "request {} carries no result",
                self.id
            ))),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> IndexRequestMessage {
        IndexRequestMessage::new(IndexKind::Cdx, JobSet::new([1, 2]))
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(request().id(), request().id());
    }

    #[test]
    fn reply_fields_are_set_once() {
        let mut msg = request();
        msg.set_found_jobs(JobSet::new([1])).unwrap();
        assert!(msg.set_found_jobs(JobSet::new([1, 2])).unwrap_err().is_illegal_state());

        msg.set_payload(Payload::Single("a.gz".into())).unwrap();
        let e = msg.set_payload(Payload::Multi(vec![])).unwrap_err();
        assert!(e.is_illegal_state());
        assert!(e.to_string().contains("already has result"));
        assert_eq!(msg.found_jobs(), Some(&JobSet::new([1])));
    }

    #[test]
    fn shape_accessors() {
        let mut single = request();
        assert!(single.result_file().unwrap_err().is_illegal_state());
        single.set_payload(Payload::Single("a.gz".into())).unwrap();
        assert_eq!(single.result_file().unwrap(), Path::new("a.gz"));
        assert!(single.result_files().unwrap_err().is_illegal_state());

        let mut multi = request();
        multi
            .set_payload(Payload::Multi(vec!["a.gz".into(), "b.gz".into()]))
            .unwrap();
        assert_eq!(multi.result_files().unwrap().len(), 2);
        assert!(multi.result_file().unwrap_err().is_illegal_state());
    }

    #[test]
    fn failure_drops_partial_result() {
        let mut msg = request();
        msg.set_found_jobs(JobSet::new([1])).unwrap();
        msg.set_not_ok("scan timed out");
        assert!(!msg.is_ok());
        assert_eq!(msg.error(), Some("scan timed out"));
        assert_eq!(msg.found_jobs(), None);
        assert_eq!(msg.payload(), None);
    }

    #[test]
    fn wire_format() {
        let mut msg = request();
        msg.set_payload(Payload::Multi(vec!["x.gz".into()])).unwrap();
        let json = msg.to_json().unwrap();
        assert_eq!(IndexRequestMessage::from_json(&json).unwrap(), msg);

        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["kind"], "CDX");
        assert_eq!(value["requested_jobs"], serde_json::json!([1, 2]));
        assert_eq!(value["payload"]["shape"], "multi");

        let bare = IndexRequestMessage::from_json(br#"{"id":"x","kind":null,"requested_jobs":[3]}"#)
            .unwrap();
        assert!(bare.is_ok());
        assert!(bare.validate().unwrap_err().is_argument_not_valid());
        assert!(IndexRequestMessage::from_json(b"{").unwrap_err().is_io_failure());
    }
}
