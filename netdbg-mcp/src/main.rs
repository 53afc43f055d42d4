// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! MCP server exposing the .NET debug engine over stdio.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

mod rpc;
mod server;
mod tools;

use tools::{ServerOptions, ServerState};

#[derive(Parser)]
#[command(
    name = "netdbg-mcp",
    version,
    about = "MCP debugging server for managed .NET processes on Linux"
)]
struct Args {
    /// Explicit path to libdbgshim.so, overriding the search order.
    #[arg(long)]
    dbgshim: Option<PathBuf>,

    /// Seconds to wait for the debuggee to stop before a tool call gives
    /// up.
    #[arg(long, default_value_t = 30)]
    stop_timeout_secs: u64,
}

fn main() -> Result<()> {
    // Protocol traffic owns stdout; logs go to stderr.
    env_logger::init();

    let args = Args::parse();

    let state = ServerState::new(ServerOptions {
        dbgshim_path: args.dbgshim,
        stop_timeout: Duration::from_secs(args.stop_timeout_secs),
    });

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server::serve(state))
}
