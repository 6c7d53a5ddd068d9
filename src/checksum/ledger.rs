// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeMap;

use anyhow::Context as _;
use parking_lot::RwLock;

/// Persistent `filename -> checksum` mapping behind a checksum store.
pub trait ChecksumLedger: Send + Sync {
    /// Reads the checksum recorded for `filename`.
    fn read(&self, filename: &str) -> anyhow::Result<Option<String>>;

    /// Records `checksum` for `filename`, replacing any previous value.
    fn write(&self, filename: &str, checksum: &str) -> anyhow::Result<()>;

    /// Returns `Ok(true)` if `filename` has an entry.
    fn exists(&self, filename: &str) -> anyhow::Result<bool> {
        Ok(self.read(filename)?.is_some())
    }

    /// Walks all entries with a forward cursor, in the ledger's native order.
    /// The order is stable for as long as the ledger is not modified.
    fn for_each_entry(
        &self,
        f: &mut dyn FnMut(&str, &str) -> anyhow::Result<()>,
    ) -> anyhow::Result<()>;

    /// Releases the underlying storage. Further calls fail, closing twice
    /// does not.
    fn close(&self) -> anyhow::Result<()>;
}

/// In-memory ledger, ordered by filename.
#[derive(Debug)]
pub struct MemoryLedger {
    entries: RwLock<Option<BTreeMap<String, String>>>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Some(BTreeMap::new())),
        }
    }
}

impl ChecksumLedger for MemoryLedger {
    fn read(&self, filename: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .entries
            .read()
            .as_ref()
            .context("checksum ledger is closed")?
            .get(filename)
            .cloned())
    }

    fn write(&self, filename: &str, checksum: &str) -> anyhow::Result<()> {
        self.entries
            .write()
            .as_mut()
            .context("checksum ledger is closed")?
            .insert(filename.to_owned(), checksum.to_owned());
        Ok(())
    }

    fn for_each_entry(
        &self,
        f: &mut dyn FnMut(&str, &str) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        let guard = self.entries.read();
        for (filename, checksum) in guard.as_ref().context("checksum ledger is closed")? {
            f(filename, checksum)?;
        }
        Ok(())
    }

    fn close(&self) -> anyhow::Result<()> {
        self.entries.write().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_ledger_roundtrip() {
        let ledger = MemoryLedger::default();
        assert_eq!(ledger.read("a").unwrap(), None);
        ledger.write("b", "2").unwrap();
        ledger.write("a", "1").unwrap();
        ledger.write("a", "3").unwrap();
        assert!(ledger.exists("a").unwrap());

        let mut seen = vec![];
        ledger
            .for_each_entry(&mut |f, c| {
                seen.push(format!("{f}={c}"));
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, ["a=3", "b=2"]);

        ledger.close().unwrap();
        ledger.close().unwrap();
        assert!(ledger.read("a").is_err());
    }
}
