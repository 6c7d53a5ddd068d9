// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use parity_db::{Db, Options};
use parking_lot::RwLock;
use strum::{Display, EnumIter, IntoEnumIterator};
use tracing::info;

use super::ChecksumLedger;

/// Columns of the checksum ledger database.
#[derive(Copy, Clone, Debug, Display, PartialEq, EnumIter)]
#[repr(u8)]
enum LedgerColumn {
    /// `filename -> checksum`, both UTF-8.
    Checksums,
}

impl LedgerColumn {
    fn create_column_options() -> Vec<parity_db::ColumnOptions> {
        LedgerColumn::iter()
            .map(|col| match col {
                LedgerColumn::Checksums => parity_db::ColumnOptions {
                    // entries get overwritten on correction
                    preimage: false,
                    // This is needed for key retrieval.
                    btree_index: true,
                    ..Default::default()
                },
            })
            .collect()
    }
}

/// Checksum ledger stored in a `ParityDb` database.
pub struct ParityLedger {
    db: RwLock<Option<Db>>,
    path: PathBuf,
}

impl ParityLedger {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let mut options = Options::with_columns(&path, 0);
        options.columns = LedgerColumn::create_column_options();
        let db = Db::open_or_create(&options)
            .with_context(|| format!("failed to open checksum ledger at {}", path.display()))?;
        info!("opened checksum ledger at {}", path.display());
        Ok(Self {
            db: RwLock::new(Some(db)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_db<T>(&self, f: impl FnOnce(&Db) -> anyhow::Result<T>) -> anyhow::Result<T> {
        let guard = self.db.read();
        let db = guard
            .as_ref()
            .with_context(|| format!("checksum ledger at {} is closed", self.path.display()))?;
        f(db)
    }
}

impl ChecksumLedger for ParityLedger {
    fn read(&self, filename: &str) -> anyhow::Result<Option<String>> {
        let column = LedgerColumn::Checksums;
        self.with_db(|db| {
            db.get(column as u8, filename.as_bytes())
                .map_err(|e| anyhow!("error from column {column}: {e}"))?
                .map(|value| anyhow::Ok(std::str::from_utf8(&value)?.to_owned()))
                .transpose()
        })
    }

    fn write(&self, filename: &str, checksum: &str) -> anyhow::Result<()> {
        let column = LedgerColumn::Checksums;
        self.with_db(|db| {
            let tx = [(
                column as u8,
                filename.as_bytes(),
                Some(checksum.as_bytes().to_vec()),
            )];
            db.commit(tx)
                .map_err(|e| anyhow!("error writing to column {column}: {e}"))
        })
    }

    fn exists(&self, filename: &str) -> anyhow::Result<bool> {
        self.with_db(|db| {
            db.get_size(LedgerColumn::Checksums as u8, filename.as_bytes())
                .map(|size| size.is_some())
                .context("error checking if key exists")
        })
    }

    fn for_each_entry(
        &self,
        f: &mut dyn FnMut(&str, &str) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        self.with_db(|db| {
            let mut iter = db.iter(LedgerColumn::Checksums as u8)?;
            while let Some((key, value)) = iter.next()? {
                f(std::str::from_utf8(&key)?, std::str::from_utf8(&value)?)?;
            }
            Ok(())
        })
    }

    fn close(&self) -> anyhow::Result<()> {
        if self.db.write().take().is_some() {
            info!("closed checksum ledger at {}", self.path.display());
        }
        Ok(())
    }
}
