// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::io::{self, BufRead};

use super::reader::{invalid_data, read_line, read_payload};
use super::{ContainerFormat, Record, RecordKind};

pub(super) const FILE_HEADER_PREFIX: &[u8] = b"filedesc://";
pub(super) const METADATA_PREFIX: &str = "metadata://";

/// Placeholder used in ARC header lines when a field is unknown.
pub(super) const NO_TYPE: &str = "no-type";

/// Reads one ARC record: a header line, `length` bytes of content and the
/// trailing newline (left for the caller to skip).
///
/// Version 1 header lines carry `url ip date mime length`; version 2 lines
/// carry more fields, with the length always last.
pub(super) fn read_record<R: BufRead>(reader: &mut R, offset: u64) -> io::Result<Record> {
    let line = read_line(reader)?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    let (url, ip, date, mime, length) = match fields.as_slice() {
        [url, ip, date, mime, .., length] => (*url, *ip, *date, *mime, *length),
        _ => return Err(invalid_data(format!("malformed ARC header line: {line:?}"))),
    };
    let length = length
        .parse::<u64>()
        .map_err(|e| invalid_data(format!("malformed ARC record length {length:?}: {e}")))?;
    let payload = read_payload(reader, length)?;
    let kind = if url.as_bytes().starts_with(FILE_HEADER_PREFIX) {
        RecordKind::FileHeader
    } else if url.starts_with(METADATA_PREFIX) {
        RecordKind::Metadata
    } else {
        RecordKind::Response
    };
    Ok(Record {
        container: Default::default(),
        format: ContainerFormat::Arc,
        offset,
        kind,
        url: url.to_owned(),
        ip: ip.to_owned(),
        date: date.to_owned(),
        mime: mime.to_owned(),
        headers: vec![],
        payload,
    })
}

/// Renders an ARC version 1 header line, including the newline.
pub(super) fn header_line(url: &str, ip: &str, date: &str, mime: &str, length: usize) -> String {
    format!("{url} {ip} {date} {mime} {length}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_v1_record() {
        let data = b"http://example.org/ 10.0.0.1 20240101120000 text/html 5\nhello\n";
        let record = read_record(&mut &data[..], 42).unwrap();
        assert_eq!(record.offset, 42);
        assert_eq!(record.kind, RecordKind::Response);
        assert_eq!(record.url, "http://example.org/");
        assert_eq!(record.ip, "10.0.0.1");
        assert_eq!(record.date, "20240101120000");
        assert_eq!(record.mime, "text/html");
        assert_eq!(&record.payload[..], b"hello");
    }

    #[test]
    fn reads_v2_header_line() {
        let data = b"http://a/ 1.2.3.4 20240101120000 text/plain 200 - - 0 f.arc 2\nok\n";
        let record = read_record(&mut &data[..], 0).unwrap();
        assert_eq!(record.length(), 2);
    }

    #[test]
    fn classifies_metadata_and_file_header() {
        let data = b"filedesc://x.arc 0.0.0.0 20240101120000 text/plain 0\n\n";
        assert_eq!(
            read_record(&mut &data[..], 0).unwrap().kind,
            RecordKind::FileHeader
        );
        let data = b"metadata://netarkivet.dk/crawl/logs/crawl.log 0.0.0.0 20240101120000 text/plain 0\n\n";
        assert_eq!(
            read_record(&mut &data[..], 0).unwrap().kind,
            RecordKind::Metadata
        );
    }

    #[test]
    fn truncated_content_is_an_error() {
        let data = b"http://a/ 1.2.3.4 20240101120000 text/plain 100\nshort";
        let e = read_record(&mut &data[..], 0).unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn malformed_header_is_invalid_data() {
        let e = read_record(&mut &b"garbage\n"[..], 0).unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::InvalidData);
    }
}
