// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::HashMap;
use std::str::FromStr as _;
use std::sync::Arc;

use strum::IntoEnumIterator as _;

use super::client::{IndexClientConfig, IndexRequestClient};
use super::transport::IndexTransport;
use super::IndexKind;
use crate::error::{Error, Result};

/// One client per index kind, built once at startup and shared.
pub struct IndexClients {
    clients: HashMap<IndexKind, Arc<IndexRequestClient>>,
}

impl IndexClients {
    pub fn new(config: &IndexClientConfig, transport: Arc<dyn IndexTransport>) -> Self {
        let clients = IndexKind::iter()
            .map(|kind| {
                let client = IndexRequestClient::new(kind, config, transport.clone());
                (kind, Arc::new(client))
            })
            .collect();
        Self { clients }
    }

    pub fn get(&self, kind: IndexKind) -> Result<Arc<IndexRequestClient>> {
        self.clients
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::argument(format!("no client for index kind {kind}")))
    }

    /// The client of the kind named `name`, e.g. `CDX`.
    pub fn by_name(&self, name: &str) -> Result<Arc<IndexRequestClient>> {
        let kind = IndexKind::from_str(name)
            .map_err(|_| Error::argument(format!("unknown index kind '{name}'")))?;
        self.get(kind)
    }
}
