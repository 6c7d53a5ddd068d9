// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::io::{self, BufRead};

use chrono::{DateTime, NaiveDateTime};

use super::arc::NO_TYPE;
use super::reader::{invalid_data, read_line, read_payload};
use super::{ContainerFormat, Record, RecordKind, http_content_type};

pub(super) const VERSION_PREFIX: &[u8] = b"WARC/";
pub(super) const VERSION: &str = "WARC/1.0";

const COMPACT_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Reads one WARC record: version line, header fields, blank line and
/// `Content-Length` bytes of block. The `\r\n\r\n` terminator is left for the
/// caller to skip.
pub(super) fn read_record<R: BufRead>(reader: &mut R, offset: u64) -> io::Result<Record> {
    let version = read_line(reader)?;
    if !version.as_bytes().starts_with(VERSION_PREFIX) {
        return Err(invalid_data(format!("not a WARC version line: {version:?}")));
    }
    let mut headers = vec![];
    loop {
        let line = read_line(reader)?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| invalid_data(format!("malformed WARC header field: {line:?}")))?;
        headers.push((name.trim().to_owned(), value.trim().to_owned()));
    }
    let field = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };
    let length = field("Content-Length")
        .ok_or_else(|| invalid_data("WARC record without Content-Length"))?;
    let length = length
        .parse::<u64>()
        .map_err(|e| invalid_data(format!("malformed Content-Length {length:?}: {e}")))?;
    let kind = match field("WARC-Type").unwrap_or_default() {
        "warcinfo" => RecordKind::FileHeader,
        "response" => RecordKind::Response,
        "request" => RecordKind::Request,
        "metadata" => RecordKind::Metadata,
        "resource" => RecordKind::Resource,
        "revisit" => RecordKind::Revisit,
        _ => RecordKind::Other,
    };
    let url = field("WARC-Target-URI").unwrap_or_default().to_owned();
    let ip = field("WARC-IP-Address").unwrap_or("-").to_owned();
    let date = compact_date(field("WARC-Date").unwrap_or_default());
    let declared_mime = field("Content-Type").unwrap_or(NO_TYPE).to_owned();

    let payload = read_payload(reader, length)?;
    let mime = match kind {
        RecordKind::Response => http_content_type(&payload).unwrap_or_else(|| NO_TYPE.into()),
        _ => declared_mime,
    };
    Ok(Record {
        container: Default::default(),
        format: ContainerFormat::Warc,
        offset,
        kind,
        url,
        ip,
        date,
        mime,
        headers,
        payload,
    })
}

/// Converts a `WARC-Date` (ISO 8601) into the 14 digit form used by CDX.
pub(super) fn compact_date(iso: &str) -> String {
    DateTime::parse_from_rfc3339(iso)
        .map(|d| d.format(COMPACT_DATE_FORMAT).to_string())
        .unwrap_or_else(|_| iso.chars().filter(char::is_ascii_digit).take(14).collect())
}

/// Converts a 14 digit date into a `WARC-Date` value.
pub(super) fn iso_date(compact: &str) -> io::Result<String> {
    NaiveDateTime::parse_from_str(compact, COMPACT_DATE_FORMAT)
        .map(|d| d.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{compact:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &[u8] = b"WARC/1.0\r\n\
WARC-Type: response\r\n\
WARC-Target-URI: http://example.org/a\r\n\
WARC-Date: 2024-03-05T10:11:12Z\r\n\
WARC-IP-Address: 192.0.2.1\r\n\
Content-Type: application/http; msgtype=response\r\n\
Content-Length: 55\r\n\
\r\n\
HTTP/1.1 200 OK\r\nContent-Type: image/png\r\n\r\n0123456789a\r\n\r\n";

    #[test]
    fn reads_response_record() {
        let record = read_record(&mut &RESPONSE[..], 7).unwrap();
        assert_eq!(record.offset, 7);
        assert_eq!(record.kind, RecordKind::Response);
        assert_eq!(record.url, "http://example.org/a");
        assert_eq!(record.ip, "192.0.2.1");
        assert_eq!(record.date, "20240305101112");
        assert_eq!(record.mime, "image/png");
        assert_eq!(record.length(), 55);
        assert_eq!(record.body(), b"0123456789a");
        assert_eq!(
            record.header("content-type"),
            Some("application/http; msgtype=response")
        );
    }

    #[test]
    fn missing_length_is_invalid() {
        let data = b"WARC/1.0\r\nWARC-Type: resource\r\n\r\n";
        let e = read_record(&mut &data[..], 0).unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn date_conversions() {
        assert_eq!(compact_date("2024-03-05T10:11:12Z"), "20240305101112");
        assert_eq!(compact_date("2024-03-05T10:11:12.123456Z"), "20240305101112");
        assert_eq!(iso_date("20240305101112").unwrap(), "2024-03-05T10:11:12Z");
        assert!(iso_date("yesterday").is_err());
    }
}
