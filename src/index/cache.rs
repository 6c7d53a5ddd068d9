// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use super::{IndexKind, JobSet, PayloadShape};

const STAGING_PREFIX: &str = ".staging-";

/// On-disk cache of computed indexes of one kind, keyed by job set.
///
/// An entry is a file (single-file kinds) or a directory of files, named by
/// [`JobSet::cache_name`]. Entries are built in a staging directory next to
/// them and renamed into place, so a reader never sees a partial entry.
#[derive(Debug, Clone)]
pub struct IndexCache {
    kind: IndexKind,
    dir: PathBuf,
}

impl IndexCache {
    /// The cache of `kind` below `base_dir`.
    pub fn new(base_dir: &Path, kind: IndexKind) -> Self {
        Self {
            kind,
            dir: base_dir.join(kind.dir_name()),
        }
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, jobs: &JobSet) -> PathBuf {
        self.dir.join(jobs.cache_name())
    }

    /// The entry for `jobs`, if one has been published.
    pub fn lookup(&self, jobs: &JobSet) -> Option<PathBuf> {
        let path = self.entry_path(jobs);
        let present = match self.kind.shape() {
            PayloadShape::Single => path.is_file(),
            PayloadShape::Multi => path.is_dir(),
        };
        present.then_some(path)
    }

    /// A fresh staging directory. Build the entry at [`Self::staged_path`]
    /// inside it, then [`Self::publish`] it. Dropping the directory removes
    /// anything not published.
    pub fn staging(&self) -> io::Result<TempDir> {
        std::fs::create_dir_all(&self.dir)?;
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.dir)
    }

    /// Where the entry is built inside `staging`. For multi-file kinds this
    /// directory is created.
    pub fn staged_path(&self, staging: &TempDir) -> io::Result<PathBuf> {
        let path = staging.path().join("entry");
        if self.kind.shape() == PayloadShape::Multi {
            std::fs::create_dir_all(&path)?;
        }
        Ok(path)
    }

    /// Moves a staged entry into place. If another writer published the same
    /// entry first, that one is kept.
    pub fn publish(&self, jobs: &JobSet, staged: &Path) -> io::Result<PathBuf> {
        let target = self.entry_path(jobs);
        if let Some(existing) = self.lookup(jobs) {
            debug!("{} entry {} already published", self.kind, existing.display());
            return Ok(existing);
        }
        match std::fs::rename(staged, &target) {
            Ok(()) => {
                debug!("published {} entry {}", self.kind, target.display());
                Ok(target)
            }
            // a concurrent writer renamed its directory onto the same name
            Err(_) if self.lookup(jobs).is_some() => Ok(target),
            Err(e) => Err(e),
        }
    }

    /// Copies the entry of `from` to the entry of `to`, for serving a job
    /// set from the index of a subset of it.
    pub fn copy_entry(&self, from: &JobSet, to: &JobSet) -> io::Result<PathBuf> {
        let source = self.lookup(from).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {} entry for jobs {from}", self.kind),
            )
        })?;
        let staging = self.staging()?;
        let staged = self.staged_path(&staging)?;
        match self.kind.shape() {
            PayloadShape::Single => {
                std::fs::copy(&source, &staged)?;
            }
            PayloadShape::Multi => {
                for entry in std::fs::read_dir(&source)? {
                    let entry = entry?;
                    std::fs::copy(entry.path(), staged.join(entry.file_name()))?;
                }
            }
        }
        self.publish(to, &staged)
    }

    /// Files of an entry: the entry itself, or the files in it sorted by name.
    pub fn entry_files(&self, entry: &Path) -> io::Result<Vec<PathBuf>> {
        match self.kind.shape() {
            PayloadShape::Single => Ok(vec![entry.to_owned()]),
            PayloadShape::Multi => {
                let mut files = std::fs::read_dir(entry)?
                    .map(|e| e.map(|e| e.path()))
                    .collect::<io::Result<Vec<_>>>()?;
                files.sort();
                Ok(files)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path(), IndexKind::Cdx);
        let jobs = JobSet::new([1, 2, 3]);
        assert_eq!(cache.lookup(&jobs), None);

        let staging = cache.staging().unwrap();
        let staged = cache.staged_path(&staging).unwrap();
        std::fs::write(&staged, b"a b c\n").unwrap();
        let entry = cache.publish(&jobs, &staged).unwrap();
        drop(staging);

        assert_eq!(entry, dir.path().join("cdx").join("1-2-3-cache"));
        assert_eq!(cache.lookup(&jobs), Some(entry.clone()));
        assert_eq!(cache.lookup(&JobSet::new([1, 2, 3, 6])), None);
        assert_eq!(cache.entry_files(&entry).unwrap(), [entry.clone()]);

        let copy = cache.copy_entry(&jobs, &JobSet::new([1, 2, 3, 4])).unwrap();
        assert_eq!(std::fs::read(copy).unwrap(), b"a b c\n");
        // only the two entries remain, staging is gone
        assert_eq!(std::fs::read_dir(cache.dir()).unwrap().count(), 2);
    }

    #[test]
    fn multi_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path(), IndexKind::FullCrawlLog);
        let jobs = JobSet::new([4]);

        let staging = cache.staging().unwrap();
        let staged = cache.staged_path(&staging).unwrap();
        std::fs::write(staged.join("b.log"), b"2").unwrap();
        std::fs::write(staged.join("a.log"), b"1").unwrap();
        let entry = cache.publish(&jobs, &staged).unwrap();
        assert!(entry.is_dir());

        let names: Vec<_> = cache
            .entry_files(&entry)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.log", "b.log"]);

        // a second publish keeps the first entry
        let other = cache.staging().unwrap();
        let staged = cache.staged_path(&other).unwrap();
        assert_eq!(cache.publish(&jobs, &staged).unwrap(), entry);
        assert_eq!(cache.entry_files(&entry).unwrap().len(), 2);
    }

    #[test]
    fn copying_a_missing_entry_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path(), IndexKind::Cdx);
        let e = cache
            .copy_entry(&JobSet::new([1]), &JobSet::new([1, 2]))
            .unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::NotFound);
    }
}
