// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Preservation services for web archive containers: a correctable checksum
//! ledger, batch jobs over ARC and WARC files, and a cached index request
//! service on top of them.

pub mod batch;
pub mod checksum;
pub mod cli_shared;
pub mod container;
pub mod error;
pub mod index;
pub mod replica;
mod tool;
pub mod utils;

pub use error::{Error, Result};
pub use tool::main::main as preservation_tool_main;
