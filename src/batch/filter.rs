// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::container::{Record, RecordKind};

/// Acceptance predicate applied to every record before a record job sees it.
#[derive(Debug, Clone, Default)]
pub enum RecordFilter {
    #[default]
    NoFilter,
    /// Skips the synthetic record describing the container itself.
    ExcludeFileHeaders,
    /// Accepts captured responses only.
    ExcludeNonResponse,
    /// Accepts records whose whole URL matches.
    UrlMatching(Regex),
    /// Accepts records whose whole mime type matches.
    MimeMatching(Regex),
    All(Vec<RecordFilter>),
}

impl RecordFilter {
    pub fn url_matching(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::UrlMatching(whole_match(pattern)?))
    }

    pub fn mime_matching(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::MimeMatching(whole_match(pattern)?))
    }

    pub fn accept(&self, record: &Record) -> bool {
        match self {
            Self::NoFilter => true,
            Self::ExcludeFileHeaders => record.kind != RecordKind::FileHeader,
            Self::ExcludeNonResponse => record.kind == RecordKind::Response,
            Self::UrlMatching(re) => re.is_match(&record.url),
            Self::MimeMatching(re) => re.is_match(&record.mime),
            Self::All(filters) => filters.iter().all(|f| f.accept(record)),
        }
    }
}

/// Restricts which files of a listing a batch job is run on.
#[derive(Debug, Clone, Default)]
pub enum FileSelection {
    #[default]
    All,
    /// Only files with exactly these names.
    Named(BTreeSet<String>),
    /// Only files whose whole name matches.
    Matching(Regex),
}

impl FileSelection {
    pub fn named<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self::Named(names.into_iter().map(Into::into).collect())
    }

    pub fn matching(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Matching(whole_match(pattern)?))
    }

    pub fn accepts(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        match self {
            Self::All => true,
            Self::Named(names) => names.contains(&*name),
            Self::Matching(re) => re.is_match(&name),
        }
    }

    /// Returns the accepted files in lexicographic order.
    pub fn select(&self, files: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
        let mut selected: Vec<PathBuf> = files.into_iter().filter(|f| self.accepts(f)).collect();
        selected.sort();
        selected.dedup();
        selected
    }
}

fn whole_match(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}
