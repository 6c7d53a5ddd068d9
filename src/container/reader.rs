// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use flate2::bufread::GzDecoder;

use super::{ContainerFormat, Record, arc, warc};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Opens a container file, detecting its flavour and compression, and reads
/// the first record eagerly so that empty, truncated or foreign files are
/// rejected here rather than half way through a scan.
pub fn open_container(path: impl AsRef<Path>) -> io::Result<ContainerReader> {
    let path = path.as_ref();
    let with_path = |e: io::Error| io::Error::new(e.kind(), format!("{}: {e}", path.display()));

    let mut source = CountingReader::new(BufReader::new(File::open(path).map_err(with_path)?));
    let prefix = source.fill_buf().map_err(with_path)?;
    if prefix.is_empty() {
        return Err(with_path(invalid_data("empty container")));
    }
    let compressed = prefix.starts_with(&GZIP_MAGIC);
    let plain_format = ContainerFormat::detect(prefix);

    let mut pending = VecDeque::new();
    let format = if compressed {
        let (offset, member) = decompress_member(&mut source)
            .map_err(with_path)?
            .ok_or_else(|| with_path(invalid_data("empty container")))?;
        let format = ContainerFormat::detect(&member)
            .ok_or_else(|| with_path(invalid_data("unknown container format")))?;
        pending.extend(parse_member(format, &member, offset).map_err(with_path)?);
        format
    } else {
        plain_format.ok_or_else(|| with_path(invalid_data("unknown container format")))?
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut reader = ContainerReader {
        name: name.into(),
        path: path.to_owned(),
        format,
        compressed,
        source,
        pending,
        done: false,
    };
    if reader.pending.is_empty() {
        reader.fill_pending().map_err(with_path)?;
    }
    if reader.pending.is_empty() {
        return Err(with_path(invalid_data("container holds no records")));
    }
    Ok(reader)
}

/// Iterates the records of one container in physical order.
///
/// Iteration stops after the first read error; the error itself is yielded
/// once.
pub struct ContainerReader {
    name: Arc<str>,
    path: PathBuf,
    format: ContainerFormat,
    compressed: bool,
    source: CountingReader<BufReader<File>>,
    pending: VecDeque<Record>,
    done: bool,
}

impl ContainerReader {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Offset just past the data consumed so far.
    pub fn position(&self) -> u64 {
        self.source.position
    }

    fn stamp(&self, mut record: Record) -> Record {
        record.container = self.name.clone();
        record
    }

    fn fill_pending(&mut self) -> io::Result<()> {
        if self.compressed {
            while self.pending.is_empty() {
                match decompress_member(&mut self.source)? {
                    Some((offset, member)) => {
                        self.pending
                            .extend(parse_member(self.format, &member, offset)?);
                    }
                    None => break,
                }
            }
        } else {
            skip_separators(&mut self.source)?;
            if !self.source.fill_buf()?.is_empty() {
                let offset = self.source.position;
                let record = read_record(self.format, &mut self.source, offset)?;
                self.pending.push_back(record);
            }
        }
        Ok(())
    }
}

impl Iterator for ContainerReader {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(record) = self.pending.pop_front() {
            return Some(Ok(self.stamp(record)));
        }
        if self.done {
            return None;
        }
        match self.fill_pending() {
            Ok(()) => {
                let next = self.pending.pop_front();
                self.done = next.is_none();
                next.map(|record| Ok(self.stamp(record)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn read_record<R: BufRead>(
    format: ContainerFormat,
    reader: &mut R,
    offset: u64,
) -> io::Result<Record> {
    match format {
        ContainerFormat::Arc => arc::read_record(reader, offset),
        ContainerFormat::Warc => warc::read_record(reader, offset),
    }
}

/// Inflates the gzip member starting at the current position. Returns its
/// compressed offset and content, or `None` at the end of the file.
fn decompress_member<R: BufRead>(
    source: &mut CountingReader<R>,
) -> io::Result<Option<(u64, Vec<u8>)>> {
    if source.fill_buf()?.is_empty() {
        return Ok(None);
    }
    let offset = source.position;
    let mut member = vec![];
    GzDecoder::new(&mut *source).read_to_end(&mut member)?;
    Ok(Some((offset, member)))
}

/// All records of one gzip member share the member's offset.
fn parse_member(format: ContainerFormat, member: &[u8], offset: u64) -> io::Result<Vec<Record>> {
    let mut cursor = member;
    let mut records = vec![];
    loop {
        skip_separators(&mut cursor)?;
        if cursor.is_empty() {
            return Ok(records);
        }
        records.push(read_record(format, &mut cursor, offset)?);
    }
}

/// Skips the blank lines that terminate ARC and WARC records.
fn skip_separators<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        let n = reader
            .fill_buf()?
            .iter()
            .take_while(|b| matches!(b, b'\r' | b'\n'))
            .count();
        if n == 0 {
            return Ok(());
        }
        reader.consume(n);
    }
}

pub(super) fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Reads a header line without its line terminator.
pub(super) fn read_line<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut line = vec![];
    if reader.read_until(b'\n', &mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "unexpected end of container",
        ));
    }
    while line.last().is_some_and(|b| matches!(b, b'\r' | b'\n')) {
        line.pop();
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

pub(super) fn read_payload<R: BufRead>(reader: &mut R, length: u64) -> io::Result<Bytes> {
    let mut payload = Vec::with_capacity(usize::try_from(length.min(1 << 20)).unwrap_or_default());
    reader.by_ref().take(length).read_to_end(&mut payload)?;
    if (payload.len() as u64) < length {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "truncated record: expected {length} bytes, found {}",
                payload.len()
            ),
        ));
    }
    Ok(Bytes::from(payload))
}

/// A buffered reader that tracks how many bytes have been consumed.
struct CountingReader<R> {
    inner: R,
    position: u64,
}

impl<R> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }
}

impl<R: BufRead> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.inner.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for CountingReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.position += amt as u64;
        self.inner.consume(amt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerWriter, RecordKind};
    use tempfile::TempDir;

    fn write_sample(
        dir: &TempDir,
        name: &str,
        format: ContainerFormat,
        gzip: bool,
    ) -> (PathBuf, Vec<u64>) {
        let path = dir.path().join(name);
        let mut writer = ContainerWriter::create(&path, format, gzip).unwrap();
        let offsets = vec![
            writer
                .write_response(
                    "http://example.org/",
                    "192.0.2.1",
                    "20240101120000",
                    b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n<html/>",
                )
                .unwrap(),
            writer
                .write_metadata(
                    "metadata://example.org/crawl/logs/crawl.log",
                    "text/plain",
                    "20240101120001",
                    b"line one\nline two\n",
                )
                .unwrap(),
        ];
        writer.finish().unwrap();
        (path, offsets)
    }

    #[test]
    fn reads_records_in_physical_order() {
        for (format, gzip) in [
            (ContainerFormat::Arc, false),
            (ContainerFormat::Arc, true),
            (ContainerFormat::Warc, false),
            (ContainerFormat::Warc, true),
        ] {
            let dir = TempDir::new().unwrap();
            let (path, offsets) = write_sample(&dir, "sample", format, gzip);
            let reader = open_container(&path).unwrap();
            assert_eq!(reader.format(), format);
            assert_eq!(reader.is_compressed(), gzip);
            let records: Vec<Record> = reader.collect::<io::Result<_>>().unwrap();
            let kinds: Vec<RecordKind> = records.iter().map(|r| r.kind).collect();
            assert_eq!(
                kinds,
                [
                    RecordKind::FileHeader,
                    RecordKind::Response,
                    RecordKind::Metadata
                ]
            );
            assert_eq!(records[0].offset, 0);
            assert_eq!(records[1].offset, offsets[0]);
            assert_eq!(records[2].offset, offsets[1]);
            assert_eq!(records[1].mime, "text/html");
            assert_eq!(&*records[1].container, "sample");
            assert_eq!(records[2].body(), b"line one\nline two\n");
        }
    }

    #[test]
    fn missing_file_cannot_be_opened() {
        let dir = TempDir::new().unwrap();
        let e = open_container(dir.path().join("missing.warc")).err().unwrap();
        assert_eq!(e.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn empty_and_foreign_files_cannot_be_opened() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("empty.arc");
        std::fs::write(&empty, b"").unwrap();
        assert!(open_container(&empty).is_err());

        let foreign = dir.path().join("foreign.warc");
        std::fs::write(&foreign, b"<html>not an archive</html>").unwrap();
        assert_eq!(
            open_container(&foreign).err().unwrap().kind(),
            io::ErrorKind::InvalidData
        );
    }

    #[test]
    fn truncated_first_record_cannot_be_opened() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("truncated.warc");
        std::fs::write(
            &path,
            b"WARC/1.0\r\nWARC-Type: warcinfo\r\nContent-Length: 500\r\n\r\nabc",
        )
        .unwrap();
        assert_eq!(
            open_container(&path).err().unwrap().kind(),
            io::ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn truncation_after_first_record_is_yielded_once() {
        let dir = TempDir::new().unwrap();
        let (path, _) = write_sample(&dir, "sample.arc", ContainerFormat::Arc, false);
        let mut data = std::fs::read(&path).unwrap();
        data.truncate(data.len() - 5);
        std::fs::write(&path, data).unwrap();

        let results: Vec<io::Result<Record>> = open_container(&path).unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok() && results[1].is_ok());
        assert!(results[2].is_err());
    }
}
