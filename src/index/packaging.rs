// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Moves cache entries from the server to the client as gzip files in a
//! transfer directory.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write as _};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use tracing::debug;

use super::cache::IndexCache;
use super::message::Payload;
use super::{JobSet, PayloadShape};

const GZIP_SUFFIX: &str = ".gz";

/// Compresses the files of `entry` into a new directory below `transfer_dir`.
pub fn package(cache: &IndexCache, entry: &Path, transfer_dir: &Path) -> io::Result<Payload> {
    std::fs::create_dir_all(transfer_dir)?;
    let outbox = tempfile::Builder::new()
        .prefix(&format!("{}-", cache.kind().dir_name()))
        .tempdir_in(transfer_dir)?;
    let mut packed = vec![];
    for file in cache.entry_files(entry)? {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = outbox.path().join(format!("{name}{GZIP_SUFFIX}"));
        gzip_file(&file, &target)?;
        packed.push(target);
    }
    // the client removes the files once it has them
    let outbox = outbox.keep();
    debug!("packaged {} files into {}", packed.len(), outbox.display());
    Ok(match cache.kind().shape() {
        PayloadShape::Single => match packed.pop() {
            Some(file) if packed.is_empty() => Payload::Single(file),
            _ => {
                return Err(io::Error::other(format!(
                    "entry {} is not a single file",
                    entry.display()
                )));
            }
        },
        PayloadShape::Multi => Payload::Multi(packed),
    })
}

/// Decompresses `payload` into the cache entry of `jobs` and deletes the
/// transferred files.
pub fn unpack(cache: &IndexCache, jobs: &JobSet, payload: &Payload) -> io::Result<PathBuf> {
    if payload.shape() != cache.kind().shape() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "{} payload for a {} index",
                payload.shape(),
                cache.kind()
            ),
        ));
    }
    let staging = cache.staging()?;
    let staged = cache.staged_path(&staging)?;
    match payload {
        Payload::Single(file) => gunzip_file(file, &staged)?,
        Payload::Multi(files) => {
            for file in files {
                let name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let name = name.strip_suffix(GZIP_SUFFIX).unwrap_or(&name);
                gunzip_file(file, &staged.join(name))?;
            }
        }
    }
    let entry = cache.publish(jobs, &staged)?;
    discard(payload);
    Ok(entry)
}

/// Best effort removal of transferred files and their directory.
pub fn discard(payload: &Payload) {
    for file in payload.files() {
        if let Err(e) = std::fs::remove_file(file) {
            debug!("could not remove transferred file {}: {e}", file.display());
        }
    }
    if let Some(outbox) = payload.files().first().and_then(|f| f.parent()) {
        // fails while other files are left, which is fine
        let _ = std::fs::remove_dir(outbox);
    }
}

fn gzip_file(source: &Path, target: &Path) -> io::Result<()> {
    let mut input = BufReader::new(File::open(source)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(target)?), Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()
}

fn gunzip_file(source: &Path, target: &Path) -> io::Result<()> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(source)?));
    let mut output = BufWriter::new(File::create(target)?);
    io::copy(&mut decoder, &mut output)?;
    output.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexKind;

    fn publish(cache: &IndexCache, jobs: &JobSet, files: &[(&str, &str)]) -> PathBuf {
        let staging = cache.staging().unwrap();
        let staged = cache.staged_path(&staging).unwrap();
        for (name, content) in files {
            let path = if cache.kind().shape() == PayloadShape::Single {
                staged.clone()
            } else {
                staged.join(name)
            };
            std::fs::write(path, content).unwrap();
        }
        cache.publish(jobs, &staged).unwrap()
    }

    #[test]
    fn multi_file_transfer() {
        let server = tempfile::tempdir().unwrap();
        let client = tempfile::tempdir().unwrap();
        let transfer = tempfile::tempdir().unwrap();
        let jobs = JobSet::new([1, 2]);

        let server_cache = IndexCache::new(server.path(), IndexKind::FullCrawlLog);
        let entry = publish(
            &server_cache,
            &jobs,
            &[("1-metadata-1.arc", "x\ny\n"), ("2-metadata-1.arc", "z\n")],
        );
        let payload = package(&server_cache, &entry, transfer.path()).unwrap();
        assert_eq!(payload.files().len(), 2);

        let client_cache = IndexCache::new(client.path(), IndexKind::FullCrawlLog);
        let unpacked = unpack(&client_cache, &jobs, &payload).unwrap();
        assert_eq!(
            std::fs::read_to_string(unpacked.join("1-metadata-1.arc")).unwrap(),
            "x\ny\n"
        );
        assert_eq!(
            std::fs::read_to_string(unpacked.join("2-metadata-1.arc")).unwrap(),
            "z\n"
        );
        assert_eq!(std::fs::read_dir(transfer.path()).unwrap().count(), 0);
    }

    #[test]
    fn single_file_transfer() {
        let server = tempfile::tempdir().unwrap();
        let client = tempfile::tempdir().unwrap();
        let transfer = tempfile::tempdir().unwrap();
        let jobs = JobSet::new([3]);

        let server_cache = IndexCache::new(server.path(), IndexKind::Cdx);
        let entry = publish(&server_cache, &jobs, &[("", "a\nb\n")]);
        let payload = package(&server_cache, &entry, transfer.path()).unwrap();
        assert!(matches!(payload, Payload::Single(_)));

        // a crawl log cache cannot take a single file
        let wrong = IndexCache::new(client.path(), IndexKind::DedupCrawlLog);
        assert_eq!(
            unpack(&wrong, &jobs, &payload).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );

        let client_cache = IndexCache::new(client.path(), IndexKind::Cdx);
        let unpacked = unpack(&client_cache, &jobs, &payload).unwrap();
        assert_eq!(std::fs::read_to_string(unpacked).unwrap(), "a\nb\n");
    }
}
