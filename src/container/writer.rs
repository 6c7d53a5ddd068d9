// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

use super::arc::{self, NO_TYPE};
use super::warc;
use super::{ContainerFormat, http_content_type};

const ARC_VERSION_BLOCK: &str =
    "1 0 InternetArchive\nURL IP-address Archive-date Content-type Archive-length\n";
const WARC_INFO_BLOCK: &str = "software: archive-preservation\r\nformat: WARC File Format 1.0\r\n";

/// Writes ARC or WARC container files, used for metadata containers and
/// test fixtures. The file header record is written on creation.
pub struct ContainerWriter {
    format: ContainerFormat,
    gzip: bool,
    out: BufWriter<File>,
    position: u64,
}

impl ContainerWriter {
    pub fn create(path: impl AsRef<Path>, format: ContainerFormat, gzip: bool) -> io::Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut writer = Self {
            format,
            gzip,
            out: BufWriter::new(File::create(path)?),
            position: 0,
        };
        let date = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();
        match format {
            ContainerFormat::Arc => {
                let url = format!("filedesc://{name}");
                writer.write_arc(
                    &url,
                    "0.0.0.0",
                    &date,
                    "text/plain",
                    ARC_VERSION_BLOCK.as_bytes(),
                )?;
            }
            ContainerFormat::Warc => {
                let warc_date = warc::iso_date(&date)?;
                writer.write_warc(
                    &[
                        ("WARC-Type", "warcinfo"),
                        ("WARC-Date", warc_date.as_str()),
                        ("WARC-Filename", name.as_str()),
                        ("Content-Type", "application/warc-fields"),
                    ],
                    WARC_INFO_BLOCK.as_bytes(),
                )?;
            }
        }
        Ok(writer)
    }

    /// Appends a captured HTTP response and returns the record's offset.
    pub fn write_response(
        &mut self,
        url: &str,
        ip: &str,
        date: &str,
        http_response: &[u8],
    ) -> io::Result<u64> {
        match self.format {
            ContainerFormat::Arc => {
                let mime = http_content_type(http_response).unwrap_or_else(|| NO_TYPE.into());
                self.write_arc(url, ip, date, &mime, http_response)
            }
            ContainerFormat::Warc => {
                let warc_date = warc::iso_date(date)?;
                self.write_warc(
                    &[
                        ("WARC-Type", "response"),
                        ("WARC-Target-URI", url),
                        ("WARC-Date", warc_date.as_str()),
                        ("WARC-IP-Address", ip),
                        ("Content-Type", "application/http; msgtype=response"),
                    ],
                    http_response,
                )
            }
        }
    }

    /// Appends a metadata record (for instance a crawl log) and returns its
    /// offset.
    pub fn write_metadata(
        &mut self,
        url: &str,
        mime: &str,
        date: &str,
        content: &[u8],
    ) -> io::Result<u64> {
        match self.format {
            ContainerFormat::Arc => self.write_arc(url, "0.0.0.0", date, mime, content),
            ContainerFormat::Warc => {
                let warc_date = warc::iso_date(date)?;
                self.write_warc(
                    &[
                        ("WARC-Type", "metadata"),
                        ("WARC-Target-URI", url),
                        ("WARC-Date", warc_date.as_str()),
                        ("Content-Type", mime),
                    ],
                    content,
                )
            }
        }
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_all()
    }

    fn write_arc(
        &mut self,
        url: &str,
        ip: &str,
        date: &str,
        mime: &str,
        content: &[u8],
    ) -> io::Result<u64> {
        let mut record = arc::header_line(url, ip, date, mime, content.len()).into_bytes();
        record.extend_from_slice(content);
        record.push(b'\n');
        self.append(&record)
    }

    fn write_warc(&mut self, fields: &[(&str, &str)], block: &[u8]) -> io::Result<u64> {
        let mut record = format!("{}\r\n", warc::VERSION);
        for (name, value) in fields {
            record.push_str(&format!("{name}: {value}\r\n"));
        }
        record.push_str(&format!("Content-Length: {}\r\n\r\n", block.len()));
        let mut record = record.into_bytes();
        record.extend_from_slice(block);
        record.extend_from_slice(b"\r\n\r\n");
        self.append(&record)
    }

    fn append(&mut self, record: &[u8]) -> io::Result<u64> {
        let offset = self.position;
        let written = if self.gzip {
            let mut encoder = GzEncoder::new(vec![], Compression::default());
            encoder.write_all(record)?;
            let member = encoder.finish()?;
            self.out.write_all(&member)?;
            member.len()
        } else {
            self.out.write_all(record)?;
            record.len()
        };
        self.position += written as u64;
        Ok(offset)
    }
}
