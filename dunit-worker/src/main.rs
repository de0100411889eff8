//! dunit-worker - stock worker process with the built-in task set.
//!
//! Normally started by the launcher, which passes identity and wiring
//! through `DUNIT_*` environment variables.

use anyhow::{Context, Result};
use clap::Parser;
use dunit_worker::{run, TaskRegistry, WorkerArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let args = WorkerArgs::parse();
    let vm_id = args.vm_id;
    run(args, TaskRegistry::with_builtins())
        .await
        .with_context(|| format!("dunit worker vm{} failed", vm_id))?;
    Ok(())
}
