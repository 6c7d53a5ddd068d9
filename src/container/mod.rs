// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Readers and writers for web archive container files.
//!
//! Two flavours are supported: the older ARC format and the self-describing
//! WARC format. Either may be stored plain or as a sequence of gzip members,
//! one member per record. In the compressed case a record's offset is the
//! offset of its gzip member in the file, which is what CDX lines refer to.

mod arc;
mod reader;
mod warc;
mod writer;

pub use reader::{ContainerReader, open_container};
pub use writer::ContainerWriter;

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum ContainerFormat {
    Arc,
    Warc,
}

impl ContainerFormat {
    /// Guesses the flavour from the first bytes of an uncompressed stream.
    pub fn detect(prefix: &[u8]) -> Option<Self> {
        if prefix.starts_with(warc::VERSION_PREFIX) {
            Some(Self::Warc)
        } else if prefix.starts_with(arc::FILE_HEADER_PREFIX) {
            Some(Self::Arc)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RecordKind {
    /// The synthetic first record describing the container itself
    /// (`filedesc://` in ARC files, `warcinfo` in WARC files).
    FileHeader,
    Response,
    Request,
    Metadata,
    Resource,
    Revisit,
    Other,
}

/// One logical entry of a container file.
#[derive(Debug, Clone)]
pub struct Record {
    /// Name of the container file the record was read from.
    pub container: Arc<str>,
    pub format: ContainerFormat,
    /// Byte offset of the record (or of its gzip member) in the container.
    pub offset: u64,
    pub kind: RecordKind,
    pub url: String,
    pub ip: String,
    /// Capture date as 14 digits, `YYYYMMDDhhmmss`.
    pub date: String,
    /// For responses the content type of the captured HTTP payload, otherwise
    /// the record's own content type.
    pub mime: String,
    /// Raw header fields, in file order. Empty for ARC records.
    pub headers: Vec<(String, String)>,
    pub payload: Bytes,
}

impl Record {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn length(&self) -> u64 {
        self.payload.len() as u64
    }

    /// The payload without its HTTP status line and headers, when it has any.
    pub fn body(&self) -> &[u8] {
        http_body(&self.payload)
    }
}

/// Extracts the media type of an HTTP response message, lowercased and
/// without parameters.
pub(crate) fn http_content_type(payload: &[u8]) -> Option<String> {
    if !payload.starts_with(b"HTTP/") {
        return None;
    }
    let head = &payload[..payload.len() - http_body(payload).len()];
    String::from_utf8_lossy(head)
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
        .filter(|mime| !mime.is_empty())
}

fn http_body(payload: &[u8]) -> &[u8] {
    if !payload.starts_with(b"HTTP/") {
        return payload;
    }
    let crlf = payload.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4);
    let lf = payload.windows(2).position(|w| w == b"\n\n").map(|i| i + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => &payload[a.min(b)..],
        (Some(i), None) | (None, Some(i)) => &payload[i..],
        (None, None) => &payload[payload.len()..],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_format() {
        assert_eq!(
            ContainerFormat::detect(b"WARC/1.0\r\n"),
            Some(ContainerFormat::Warc)
        );
        assert_eq!(
            ContainerFormat::detect(b"filedesc://x.arc 0.0.0.0"),
            Some(ContainerFormat::Arc)
        );
        assert_eq!(ContainerFormat::detect(b"<html>"), None);
    }

    #[test]
    fn content_type_of_http_response() {
        let payload = b"HTTP/1.1 200 OK\r\nServer: x\r\nContent-Type: Text/HTML; charset=utf-8\r\n\r\n<html/>";
        assert_eq!(http_content_type(payload).as_deref(), Some("text/html"));
        assert_eq!(http_body(payload), b"<html/>");
    }

    #[test]
    fn content_type_is_absent_for_non_http() {
        assert_eq!(http_content_type(b"plain text"), None);
        assert_eq!(http_body(b"plain text"), b"plain text");
        assert_eq!(http_content_type(b"HTTP/1.0 404\r\n\r\n"), None);
    }
}
