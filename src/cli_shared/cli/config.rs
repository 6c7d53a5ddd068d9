// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::batch::BatchConfig;
use crate::checksum::ChecksumStoreConfig;
use crate::index::{IndexClientConfig, IndexServerConfig};
use crate::replica::ReplicaConfig;

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
#[serde(default)]
pub struct LogConfig {
    /// Hourly rolling log files are written here when set.
    pub log_dir: Option<PathBuf>,
    /// `tracing` directives, e.g. `info,preservation::index=debug`.
    /// `RUST_LOG` takes precedence.
    pub filters: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Default, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub checksum: ChecksumStoreConfig,
    pub batch: BatchConfig,
    pub index_client: IndexClientConfig,
    pub index_server: IndexServerConfig,
    pub replica: ReplicaConfig,
    pub log: LogConfig,
}
