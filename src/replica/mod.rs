// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Storage replicas holding container files, and the mapping from harvest
//! job ids to the containers a job produced.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context as _;
use regex::Regex;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use tracing::debug;
use walkdir::WalkDir;

use crate::index::JobSet;

static DATA_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)-\d+-.*\.w?arc(\.gz)?$").expect("Infallible")
});
static METADATA_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)-metadata-\d+\.w?arc(\.gz)?$").expect("Infallible")
});

/// One storage location holding a copy of the archived container files.
pub trait Replica: Send + Sync {
    fn id(&self) -> &str;

    /// All container files held, sorted by path.
    fn list_files(&self) -> anyhow::Result<Vec<PathBuf>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct ReplicaConfig {
    #[default("ONE".to_owned())]
    pub id: String,
    #[default(PathBuf::from("replica"))]
    pub root_dir: PathBuf,
}

/// A replica in a local directory tree.
#[derive(Debug, Clone)]
pub struct LocalReplica {
    id: String,
    root: PathBuf,
}

impl LocalReplica {
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
        }
    }

    pub fn from_config(config: &ReplicaConfig) -> Self {
        Self::new(config.id.clone(), config.root_dir.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Replica for LocalReplica {
    fn id(&self) -> &str {
        &self.id
    }

    fn list_files(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut files = vec![];
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry.with_context(|| {
                format!("failed to list replica {} at {}", self.id, self.root.display())
            })?;
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_file() && is_container_name(&name) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }
}

fn is_container_name(name: &str) -> bool {
    [".arc", ".warc", ".arc.gz", ".warc.gz"]
        .iter()
        .any(|suffix| name.ends_with(suffix))
}

/// Whether a container holds harvested content or the harvest's metadata
/// (crawl logs and the like).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileClass {
    Data,
    Metadata,
}

impl FileClass {
    /// Classifies a container by its file name, returning the job id too.
    /// Data files are named `<job>-<harvest>-...`, metadata files
    /// `<job>-metadata-<n>`.
    pub fn of(name: &str) -> Option<(u64, Self)> {
        let (captures, class) = if let Some(c) = METADATA_FILE.captures(name) {
            (c, Self::Metadata)
        } else {
            (DATA_FILE.captures(name)?, Self::Data)
        };
        let job = captures.get(1)?.as_str().parse().ok()?;
        Some((job, class))
    }
}

/// Container files of a replica grouped by job id and class.
#[derive(Debug, Default, Clone)]
pub struct JobFileIndex {
    files: BTreeMap<(u64, FileClass), Vec<PathBuf>>,
}

impl JobFileIndex {
    pub fn build(replica: &dyn Replica) -> anyhow::Result<Self> {
        let mut index = Self::default();
        let mut ignored = 0usize;
        for path in replica.list_files()? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match FileClass::of(&name) {
                Some(key) => index.files.entry(key).or_default().push(path),
                None => ignored += 1,
            }
        }
        debug!(
            "indexed {} job file groups of replica {}, ignored {ignored} unrecognised files",
            index.files.len(),
            replica.id()
        );
        Ok(index)
    }

    /// The requested jobs that have at least one file of `class`.
    pub fn found(&self, jobs: &JobSet, class: FileClass) -> JobSet {
        jobs.iter()
            .filter(|job| self.files.contains_key(&(*job, class)))
            .collect()
    }

    /// Files of `class` belonging to `jobs`, sorted by path.
    pub fn files(&self, jobs: &JobSet, class: FileClass) -> Vec<PathBuf> {
        let files: BTreeSet<_> = jobs
            .iter()
            .filter_map(|job| self.files.get(&(job, class)))
            .flatten()
            .cloned()
            .collect();
        files.into_iter().collect()
    }
}
