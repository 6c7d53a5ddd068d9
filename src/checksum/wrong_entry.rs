// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;

use crate::batch::jobs::{checksum_line, parse_checksum_line};

const TIMESTAMP_SEPARATOR: &str = " : ";

/// One line of the wrong entry log: a checksum that was replaced by a
/// correction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrongEntry {
    pub timestamp: String,
    pub filename: String,
    pub superseded_checksum: String,
}

/// Append-only, human readable audit trail of corrections, named
/// `removed_<replica>.checksum`. Lines read
/// `<timestamp> : <filename>##<superseded checksum>`.
pub struct WrongEntryLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl WrongEntryLog {
    pub fn file_name(replica_id: &str) -> String {
        format!("removed_{replica_id}.checksum")
    }

    /// Opens the log in `dir`, creating it if needed.
    pub fn open(dir: &Path, replica_id: &str) -> io::Result<Self> {
        let path = dir.join(Self::file_name(replica_id));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends and syncs one entry. Returns the line written.
    pub fn append(&self, filename: &str, superseded_checksum: &str) -> io::Result<String> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let line = format!(
            "{timestamp}{TIMESTAMP_SEPARATOR}{}",
            checksum_line(filename, superseded_checksum)
        );
        let mut file = self.file.lock();
        writeln!(file, "{line}")?;
        file.sync_data()?;
        Ok(line)
    }

    /// Reads back all entries, skipping lines that do not parse.
    pub fn entries(&self) -> io::Result<Vec<WrongEntry>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = vec![];
        for line in reader.lines() {
            let line = line?;
            let Some((timestamp, rest)) = line.split_once(TIMESTAMP_SEPARATOR) else {
                continue;
            };
            if let Some((filename, checksum)) = parse_checksum_line(rest) {
                entries.push(WrongEntry {
                    timestamp: timestamp.to_owned(),
                    filename: filename.to_owned(),
                    superseded_checksum: checksum.to_owned(),
                });
            }
        }
        Ok(entries)
    }
}
