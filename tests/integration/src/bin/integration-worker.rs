//! Worker binary used by the integration tests.

use anyhow::{Context, Result};
use clap::Parser;
use dunit_integration_tests::tasks;
use dunit_worker::{run, WorkerArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let args = WorkerArgs::parse();
    let vm_id = args.vm_id;
    run(args, tasks::registry())
        .await
        .with_context(|| format!("worker vm{} failed", vm_id))?;
    Ok(())
}
