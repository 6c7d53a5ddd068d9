// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The checksum store: an authoritative, correctable ledger of per-file
//! checksums with an audit trail of every correction.

mod ledger;
mod parity_ledger;
mod wrong_entry;

pub use ledger::{ChecksumLedger, MemoryLedger};
pub use parity_ledger::ParityLedger;
pub use wrong_entry::{WrongEntry, WrongEntryLog};

use std::io::{BufRead, BufWriter, Read, Write};
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::batch::jobs::{checksum_line, parse_checksum_line};
use crate::error::{Error, Result, check_not_empty};
use crate::utils::io::md5_hex;

/// Directory below the base directory holding the ledger database.
pub const LEDGER_DIR_NAME: &str = "checksum_ledger";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct ChecksumStoreConfig {
    /// Holds the ledger and the wrong entry log.
    #[default(PathBuf::from("checksum"))]
    pub base_dir: PathBuf,
    /// Free space, in bytes, that must remain in `base_dir` for uploads.
    #[default(100_000_000)]
    pub min_space_left: u64,
    /// Names the wrong entry log.
    #[default("CS".to_owned())]
    pub replica_id: String,
    /// Where dumps are written. The system temporary directory by default.
    pub temp_dir: Option<PathBuf>,
}

/// A correction's superseded entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectedEntry {
    pub filename: String,
    pub checksum: String,
}

/// MD5 checksum of `content`, lowercase hex.
pub fn calculate_checksum(content: impl Read) -> Result<String> {
    md5_hex(content).map_err(|e| Error::io_failure("failed to read content to checksum", e))
}

/// Checksum store over a [`ChecksumLedger`].
///
/// Lookups go straight to the ledger; mutations (`upload`, `correct`) are
/// serialized.
pub struct ChecksumStore<L> {
    config: ChecksumStoreConfig,
    ledger: L,
    wrong_entries: WrongEntryLog,
    mutation: Mutex<()>,
}

impl ChecksumStore<ParityLedger> {
    /// Opens (or creates) the store in `config.base_dir`.
    pub fn open(config: ChecksumStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.base_dir)?;
        let ledger = ParityLedger::open(config.base_dir.join(LEDGER_DIR_NAME))
            .map_err(|e| Error::io_failure("failed to open the checksum ledger", e))?;
        Self::with_ledger(config, ledger)
    }
}

impl<L: ChecksumLedger> ChecksumStore<L> {
    pub fn with_ledger(config: ChecksumStoreConfig, ledger: L) -> Result<Self> {
        check_not_empty(&config.replica_id, "replica id")?;
        std::fs::create_dir_all(&config.base_dir)?;
        let wrong_entries = WrongEntryLog::open(&config.base_dir, &config.replica_id)?;
        Ok(Self {
            config,
            ledger,
            wrong_entries,
            mutation: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &ChecksumStoreConfig {
        &self.config
    }

    pub fn wrong_entry_log(&self) -> &WrongEntryLog {
        &self.wrong_entries
    }

    /// True iff the base directory exists, is writable and has more than
    /// `min_space_left` bytes free.
    pub fn has_enough_space(&self) -> bool {
        let dir = &self.config.base_dir;
        if !dir.is_dir() {
            warn!("checksum base directory {} does not exist", dir.display());
            return false;
        }
        if let Err(e) = tempfile::tempfile_in(dir) {
            warn!("checksum base directory {} is not writable: {e}", dir.display());
            return false;
        }
        match fs4::available_space(dir) {
            Ok(free) if free > self.config.min_space_left => true,
            Ok(free) => {
                warn!(
                    "not enough space left in {}: {free} bytes free, {} required",
                    dir.display(),
                    self.config.min_space_left
                );
                false
            }
            Err(e) => {
                warn!("cannot determine free space in {}: {e}", dir.display());
                false
            }
        }
    }

    pub fn has_entry(&self, filename: &str) -> Result<bool> {
        check_not_empty(filename, "filename")?;
        self.ledger
            .exists(filename)
            .map_err(|e| Error::io_failure(format!("failed to look up '{filename}'"), e))
    }

    /// The recorded checksum, `None` if `filename` was never uploaded.
    pub fn get_checksum(&self, filename: &str) -> Result<Option<String>> {
        check_not_empty(filename, "filename")?;
        self.read(filename)
    }

    /// Records `checksum` for `filename`.
    ///
    /// Uploading the recorded checksum again is a logged no-op; uploading a
    /// different one fails with [`Error::IllegalState`].
    pub fn upload(&self, filename: &str, checksum: &str) -> Result<()> {
        check_not_empty(filename, "filename")?;
        check_not_empty(checksum, "checksum")?;
        self.insert(filename, checksum).map(|_| ())
    }

    /// Like [`Self::upload`], computing the checksum of `content`.
    pub fn upload_stream(&self, filename: &str, content: impl Read) -> Result<String> {
        check_not_empty(filename, "filename")?;
        let checksum = calculate_checksum(content)?;
        self.insert(filename, &checksum)?;
        Ok(checksum)
    }

    /// Replaces the checksum of `filename` with the checksum of `content`.
    ///
    /// The superseded entry is appended to the wrong entry log before the
    /// ledger is overwritten, so a failed overwrite still leaves the evidence.
    pub fn correct(&self, filename: &str, content: impl Read) -> Result<CorrectedEntry> {
        check_not_empty(filename, "filename")?;
        let new_checksum = calculate_checksum(content)?;

        let _guard = self.mutation.lock();
        let Some(old_checksum) = self.read(filename)? else {
            return Err(Error::illegal_state(format!(
                "cannot correct '{filename}': no entry exists"
            )));
        };
        if old_checksum == new_checksum {
            return Err(Error::illegal_state(format!(
                "cannot correct '{filename}': the recorded checksum is already '{old_checksum}'"
            )));
        }
        self.wrong_entries.append(filename, &old_checksum)?;
        warn!("correcting checksum of '{filename}': '{old_checksum}' replaced by '{new_checksum}'");
        self.write(filename, &new_checksum)?;
        Ok(CorrectedEntry {
            filename: filename.to_owned(),
            checksum: old_checksum,
        })
    }

    /// Dumps the whole ledger as `filename##checksum` lines to a new
    /// temporary file.
    pub fn get_archive_as_file(&self) -> Result<NamedTempFile> {
        self.dump(|filename, checksum| checksum_line(filename, checksum))
    }

    /// Dumps all recorded filenames, one per line, to a new temporary file.
    pub fn get_all_filenames(&self) -> Result<NamedTempFile> {
        self.dump(|filename, _| filename.to_owned())
    }

    /// Loads a `filename##checksum` listing, as produced by
    /// [`crate::batch::jobs::ChecksumJob`] or [`Self::get_archive_as_file`].
    /// Returns the number of new entries.
    ///
    /// Lines already recorded with the same checksum are skipped; a
    /// conflicting line aborts the load with [`Error::IllegalState`], leaving
    /// the lines before it loaded.
    pub fn load_from_listing(&self, listing: impl BufRead) -> Result<usize> {
        let mut loaded = 0;
        for (number, line) in listing.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let (filename, checksum) = parse_checksum_line(&line).ok_or_else(|| {
                Error::argument(format!("malformed listing line {}: {line:?}", number + 1))
            })?;
            check_not_empty(filename, "filename")?;
            check_not_empty(checksum, "checksum")?;
            if self.insert(filename, checksum)? {
                loaded += 1;
            }
        }
        info!("loaded {loaded} checksum entries");
        Ok(loaded)
    }

    /// Releases the ledger. Idempotent.
    pub fn cleanup(&self) -> Result<()> {
        self.ledger
            .close()
            .map_err(|e| Error::io_failure("failed to close the checksum ledger", e))
    }

    /// Inserts an entry unless present. Returns whether it was inserted.
    fn insert(&self, filename: &str, checksum: &str) -> Result<bool> {
        let _guard = self.mutation.lock();
        match self.read(filename)? {
            Some(existing) if existing == checksum => {
                warn!("'{filename}' has already been uploaded with checksum '{checksum}'");
                Ok(false)
            }
            Some(existing) => {
                error!(
                    "refusing to upload '{filename}' with checksum '{checksum}': recorded checksum is '{existing}'"
                );
                Err(Error::illegal_state(format!(
                    "'{filename}' is already archived with a different checksum ('{existing}', not '{checksum}')"
                )))
            }
            None => {
                self.write(filename, checksum)?;
                debug!("recorded checksum '{checksum}' for '{filename}'");
                Ok(true)
            }
        }
    }

    fn read(&self, filename: &str) -> Result<Option<String>> {
        self.ledger
            .read(filename)
            .map_err(|e| Error::io_failure(format!("failed to read the entry of '{filename}'"), e))
    }

    fn write(&self, filename: &str, checksum: &str) -> Result<()> {
        self.ledger
            .write(filename, checksum)
            .map_err(|e| Error::io_failure(format!("failed to write the entry of '{filename}'"), e))
    }

    fn dump(&self, line: impl Fn(&str, &str) -> String) -> Result<NamedTempFile> {
        let mut dump = match &self.config.temp_dir {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        {
            let mut writer = BufWriter::new(dump.as_file_mut());
            self.ledger
                .for_each_entry(&mut |filename, checksum| {
                    writeln!(writer, "{}", line(filename, checksum))?;
                    Ok(())
                })
                .map_err(|e| Error::io_failure("failed to dump the checksum ledger", e))?;
            writer.flush()?;
        }
        Ok(dump)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ChecksumStore<MemoryLedger> {
        let config = ChecksumStoreConfig {
            base_dir: dir.path().to_owned(),
            min_space_left: 0,
            ..Default::default()
        };
        ChecksumStore::with_ledger(config, MemoryLedger::default()).unwrap()
    }

    #[test]
    fn upload_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.upload("1-1.warc", "aaa").unwrap();
        store.upload("1-1.warc", "aaa").unwrap();
        assert_eq!(store.get_checksum("1-1.warc").unwrap().as_deref(), Some("aaa"));
    }

    #[test]
    fn conflicting_upload_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.upload("1-1.warc", "aaa").unwrap();
        let e = store.upload("1-1.warc", "bbb").unwrap_err();
        assert!(e.is_illegal_state());
        assert_eq!(store.get_checksum("1-1.warc").unwrap().as_deref(), Some("aaa"));
    }

    #[test]
    fn upload_stream_computes_md5() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let checksum = store.upload_stream("empty.warc", &b""[..]).unwrap();
        assert_eq!(checksum, "d41d8cd98f00b204e9800998ecf8427e");
        assert!(store.has_entry("empty.warc").unwrap());
        assert!(!store.has_entry("other.warc").unwrap());
    }

    #[test]
    fn arguments_are_checked_first() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.cleanup().unwrap();
        // the ledger is closed, so anything reaching it would be an io failure
        assert!(store.upload("", "aaa").unwrap_err().is_argument_not_valid());
        assert!(store.upload("f", "").unwrap_err().is_argument_not_valid());
        assert!(store.get_checksum(" ").unwrap_err().is_argument_not_valid());
        assert!(store.correct("", &b"x"[..]).unwrap_err().is_argument_not_valid());
        assert!(store.get_checksum("f").unwrap_err().is_io_failure());
    }

    #[test]
    fn correction_replaces_and_audits() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.upload("1-1.warc", "aaa").unwrap();
        let removed = store.correct("1-1.warc", &b""[..]).unwrap();
        assert_eq!(
            removed,
            CorrectedEntry {
                filename: "1-1.warc".into(),
                checksum: "aaa".into()
            }
        );
        assert_eq!(
            store.get_checksum("1-1.warc").unwrap().as_deref(),
            Some("d41d8cd98f00b204e9800998ecf8427e")
        );
        let entries = store.wrong_entry_log().entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].superseded_checksum, "aaa");
    }

    #[test]
    fn pointless_correction_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.upload_stream("1-1.warc", &b"content"[..]).unwrap();
        let e = store.correct("1-1.warc", &b"content"[..]).unwrap_err();
        assert!(e.is_illegal_state());
        assert!(store.wrong_entry_log().entries().unwrap().is_empty());

        let e = store.correct("missing.warc", &b"content"[..]).unwrap_err();
        assert!(e.is_illegal_state());
    }

    /// Accepts the first write of each file only.
    #[derive(Default)]
    struct WriteOnceLedger(MemoryLedger);

    impl ChecksumLedger for WriteOnceLedger {
        fn read(&self, filename: &str) -> anyhow::Result<Option<String>> {
            self.0.read(filename)
        }

        fn write(&self, filename: &str, checksum: &str) -> anyhow::Result<()> {
            anyhow::ensure!(!self.0.exists(filename)?, "disk full");
            self.0.write(filename, checksum)
        }

        fn for_each_entry(
            &self,
            f: &mut dyn FnMut(&str, &str) -> anyhow::Result<()>,
        ) -> anyhow::Result<()> {
            self.0.for_each_entry(f)
        }

        fn close(&self) -> anyhow::Result<()> {
            self.0.close()
        }
    }

    #[test]
    fn failed_overwrite_keeps_the_audit_line() {
        let dir = TempDir::new().unwrap();
        let config = ChecksumStoreConfig {
            base_dir: dir.path().to_owned(),
            ..Default::default()
        };
        let store = ChecksumStore::with_ledger(config, WriteOnceLedger::default()).unwrap();
        store.upload("1-1.warc", "aaa").unwrap();
        let e = store.correct("1-1.warc", &b"x"[..]).unwrap_err();
        assert!(e.is_io_failure());
        assert_eq!(store.get_checksum("1-1.warc").unwrap().as_deref(), Some("aaa"));
        assert_eq!(store.wrong_entry_log().entries().unwrap().len(), 1);
    }

    #[test]
    fn dumps_list_every_entry() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.upload("b.warc", "bbb").unwrap();
        store.upload("a.warc", "aaa").unwrap();
        let archive =
            std::fs::read_to_string(store.get_archive_as_file().unwrap().path()).unwrap();
        assert_eq!(archive, "a.warc##aaa\nb.warc##bbb\n");
        let names = std::fs::read_to_string(store.get_all_filenames().unwrap().path()).unwrap();
        assert_eq!(names, "a.warc\nb.warc\n");
    }

    #[test]
    fn listing_is_loaded() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.upload("a.warc", "aaa").unwrap();
        let loaded = store
            .load_from_listing(&b"a.warc##aaa\n\nb.warc##bbb\n"[..])
            .unwrap();
        assert_eq!(loaded, 1);
        assert!(
            store
                .load_from_listing(&b"garbage\n"[..])
                .unwrap_err()
                .is_argument_not_valid()
        );
        assert!(
            store
                .load_from_listing(&b"a.warc##zzz\n"[..])
                .unwrap_err()
                .is_illegal_state()
        );
    }

    #[test]
    fn blank_listing_fields_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        for listing in [&b"   ##abc\n"[..], &b"a.warc##  \n"[..]] {
            assert!(
                store
                    .load_from_listing(listing)
                    .unwrap_err()
                    .is_argument_not_valid()
            );
        }
        assert!(!store.has_entry("   ").unwrap());
        assert!(!store.has_entry("a.warc").unwrap());
    }

    #[test]
    fn space_check() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.has_enough_space());

        let config = ChecksumStoreConfig {
            base_dir: dir.path().to_owned(),
            min_space_left: u64::MAX,
            ..Default::default()
        };
        let greedy = ChecksumStore::with_ledger(config, MemoryLedger::default()).unwrap();
        assert!(!greedy.has_enough_space());

        let gone = TempDir::new().unwrap();
        let config = ChecksumStoreConfig {
            base_dir: gone.path().join("base"),
            ..Default::default()
        };
        let store = ChecksumStore::with_ledger(config, MemoryLedger::default()).unwrap();
        std::fs::remove_dir_all(gone.path().join("base")).unwrap();
        assert!(!store.has_enough_space());
    }

    #[test]
    fn parity_backed_store_persists() {
        let dir = TempDir::new().unwrap();
        let config = ChecksumStoreConfig {
            base_dir: dir.path().to_owned(),
            ..Default::default()
        };
        {
            let store = ChecksumStore::open(config.clone()).unwrap();
            store.upload("1-1.warc", "aaa").unwrap();
            store.cleanup().unwrap();
            store.cleanup().unwrap();
        }
        let store = ChecksumStore::open(config).unwrap();
        assert_eq!(store.get_checksum("1-1.warc").unwrap().as_deref(), Some("aaa"));
    }
}
