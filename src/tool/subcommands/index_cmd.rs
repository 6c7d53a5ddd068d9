// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::PathBuf;
use std::sync::Arc;

use super::load_config;
use crate::batch::BatchRunner;
use crate::index::{
    IndexBuilder, IndexClients, IndexRequestServer, InProcessTransport, JobSet, PayloadShape,
};
use crate::replica::LocalReplica;
use clap::Args;

#[derive(Debug, Args)]
pub struct IndexCommand {
    /// Index kind: `CDX`, `FULL_CRAWL_LOG` or `DEDUP_CRAWL_LOG`
    kind: String,
    /// Comma separated job ids
    #[arg(long, default_value = "")]
    jobs: String,
    /// Optional TOML file containing the configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl IndexCommand {
    /// Serves the request with an in-process server over the configured
    /// replica, after finishing any request an earlier run left behind.
    pub async fn run(self) -> anyhow::Result<()> {
        let config = load_config(self.config.as_deref())?;
        let jobs = JobSet::parse(&self.jobs)?;

        let replica = Arc::new(LocalReplica::from_config(&config.replica));
        let builder = IndexBuilder::new(
            replica,
            BatchRunner::new(config.batch.clone()),
            config.index_server.cache_dir.clone(),
        );
        let server = IndexRequestServer::new(config.index_server.clone(), builder)?;
        server.restore_pending().await?;

        let clients = IndexClients::new(
            &config.index_client,
            Arc::new(InProcessTransport::new(server)),
        );
        let client = clients.by_name(&self.kind)?;
        let result = client.get_index(&jobs).await?;

        println!("Jobs found: {}", result.found_job_ids());
        if !result.is_complete() {
            println!("Jobs missing: {}", jobs.missing(result.found_job_ids()));
        }
        match result.shape() {
            PayloadShape::Single => println!("{}", result.index_file()?.display()),
            PayloadShape::Multi => {
                for file in result.index_files()? {
                    println!("{}", file.display());
                }
            }
        }
        Ok(())
    }
}
