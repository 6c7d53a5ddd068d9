// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::trace;

use super::message::IndexRequestMessage;
use super::server::IndexRequestServer;

/// Carries index requests to a server and its replies back.
#[async_trait]
pub trait IndexTransport: Send + Sync {
    async fn send(&self, request: IndexRequestMessage) -> anyhow::Result<IndexRequestMessage>;
}

/// Delivers requests to a server in the same process, passing them through
/// their JSON wire form both ways.
pub struct InProcessTransport {
    server: Arc<IndexRequestServer>,
    sent: AtomicUsize,
}

impl InProcessTransport {
    pub fn new(server: Arc<IndexRequestServer>) -> Self {
        Self {
            server,
            sent: AtomicUsize::new(0),
        }
    }

    /// Number of requests that reached the server.
    pub fn requests_sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexTransport for InProcessTransport {
    async fn send(&self, request: IndexRequestMessage) -> anyhow::Result<IndexRequestMessage> {
        let wire = request.to_json()?;
        trace!("sending {}", String::from_utf8_lossy(&wire));
        self.sent.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .server
            .handle(IndexRequestMessage::from_json(&wire)?)
            .await;
        Ok(IndexRequestMessage::from_json(&reply.to_json()?)?)
    }
}
