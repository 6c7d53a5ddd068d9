// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_cmd::{Command, cargo::cargo_bin_cmd};
use preservation::batch::{BatchConfig, BatchRunner};
use preservation::container::{ContainerFormat, ContainerWriter};
use preservation::index::{
    IndexBuilder, IndexClientConfig, IndexClients, IndexRequestServer, IndexServerConfig,
    IndexTransport, InProcessTransport,
};
use preservation::replica::LocalReplica;
use tempfile::TempDir;

pub const CAPTURE_DATE: &str = "20240315120000";

pub fn tool() -> Command {
    cargo_bin_cmd!("preservation-tool")
}

pub fn http_response(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}

/// Writes a harvest data file of `job` holding one response per url.
pub fn write_data_file(dir: &Path, job: u64, urls: &[&str]) -> PathBuf {
    let path = dir.join(format!("{job}-1-{CAPTURE_DATE}-00000-test.warc"));
    let mut writer = ContainerWriter::create(&path, ContainerFormat::Warc, false).unwrap();
    for url in urls {
        writer
            .write_response(url, "127.0.0.1", CAPTURE_DATE, &http_response(url))
            .unwrap();
    }
    writer.finish().unwrap();
    path
}

/// Writes the metadata file of `job` holding the given crawl log lines.
pub fn write_metadata_file(dir: &Path, job: u64, crawl_log: &[&str]) -> PathBuf {
    let path = dir.join(format!("{job}-metadata-1.arc"));
    let mut writer = ContainerWriter::create(&path, ContainerFormat::Arc, false).unwrap();
    let mut log = crawl_log.join("\n");
    log.push('\n');
    writer
        .write_metadata(
            &format!("metadata://test.example/crawl/logs/crawl.log?job={job}"),
            "text/plain",
            CAPTURE_DATE,
            log.as_bytes(),
        )
        .unwrap();
    writer.finish().unwrap();
    path
}

pub fn crawl_log_line(job: u64, url: &str, duplicate: bool) -> String {
    let annotation = if duplicate {
        "duplicate:\"1-1-20240101-00000.warc,512\""
    } else {
        "-"
    };
    format!(
        "2024-03-15T12:00:00.000Z 200 1024 {url} L - text/html #001 20240315120000000+12 sha1:ABC job{job} {annotation}"
    )
}

/// A replica with data and metadata for each of `jobs`, served by an
/// in-process index server.
pub struct IndexFixture {
    pub dir: TempDir,
    pub server: Arc<IndexRequestServer>,
    pub transport: Arc<InProcessTransport>,
    pub clients: IndexClients,
}

impl IndexFixture {
    pub fn new(jobs: &[u64]) -> Self {
        Self::with_client_config(jobs, |_| {})
    }

    pub fn with_client_config(jobs: &[u64], tweak: impl FnOnce(&mut IndexClientConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let replica_dir = dir.path().join("replica");
        std::fs::create_dir_all(&replica_dir).unwrap();
        for &job in jobs {
            write_data_file(
                &replica_dir,
                job,
                &[&format!("http://job{job}.example/"), &format!("http://job{job}.example/about")],
            );
            write_metadata_file(
                &replica_dir,
                job,
                &[
                    &crawl_log_line(job, &format!("http://job{job}.example/"), false),
                    &crawl_log_line(job, &format!("http://job{job}.example/logo.png"), true),
                ],
            );
        }
        let server = start_server(dir.path(), &replica_dir);
        let transport = Arc::new(InProcessTransport::new(server.clone()));
        let mut client_config = IndexClientConfig {
            cache_dir: dir.path().join("client_cache"),
            ..Default::default()
        };
        tweak(&mut client_config);
        let transport_handle: Arc<dyn IndexTransport> = transport.clone();
        let clients = IndexClients::new(&client_config, transport_handle);
        Self {
            dir,
            server,
            transport,
            clients,
        }
    }

    pub fn replica_dir(&self) -> PathBuf {
        self.dir.path().join("replica")
    }
}

pub fn server_config(base: &Path) -> IndexServerConfig {
    IndexServerConfig {
        cache_dir: base.join("server_cache"),
        request_dir: base.join("requests"),
        transfer_dir: base.join("transfer"),
        ..Default::default()
    }
}

pub fn start_server(base: &Path, replica_dir: &Path) -> Arc<IndexRequestServer> {
    let config = server_config(base);
    let builder = IndexBuilder::new(
        Arc::new(LocalReplica::new("ONE", replica_dir)),
        BatchRunner::new(BatchConfig::default()),
        config.cache_dir.clone(),
    );
    IndexRequestServer::new(config, builder).unwrap()
}
