//! Worker startup arguments.
//!
//! The launcher passes everything through environment variables so custom
//! worker binaries can keep their own command line. Each value can also be
//! given as a flag when starting a worker by hand.

use clap::Parser;
use dunit_types::{DistributedSystemProperties, LocatorInfo, VmId};
use std::path::PathBuf;

use crate::WorkerError;

/// Environment variable carrying the worker's VmId.
pub const ENV_VM_ID: &str = "DUNIT_VM_ID";
/// Environment variable carrying the controller's `host:port`.
pub const ENV_CONTROLLER: &str = "DUNIT_CONTROLLER";
/// Environment variable carrying the working directory.
pub const ENV_WORKING_DIR: &str = "DUNIT_WORKING_DIR";
/// Environment variable carrying the locator string (`address[port]`).
pub const ENV_LOCATOR: &str = "DUNIT_LOCATOR";
/// Environment variable carrying the property snapshot as JSON.
pub const ENV_PROPERTIES: &str = "DUNIT_PROPERTIES";

/// Identity and wiring for one worker process.
#[derive(Parser, Debug, Clone)]
#[command(name = "dunit-worker")]
#[command(version, about = "dunit worker process", long_about = None)]
pub struct WorkerArgs {
    /// Logical VM id this process serves as
    #[arg(long, env = ENV_VM_ID, allow_negative_numbers = true)]
    pub vm_id: i32,

    /// Controller address to dial (host:port)
    #[arg(long, env = ENV_CONTROLLER)]
    pub controller: String,

    /// Stable working directory for this VM
    #[arg(long, env = ENV_WORKING_DIR)]
    pub working_dir: PathBuf,

    /// Locator string, `address[port]`
    #[arg(long, env = ENV_LOCATOR)]
    pub locator: Option<LocatorInfo>,

    /// Distributed system properties as a JSON object
    #[arg(long, env = ENV_PROPERTIES, value_parser = parse_properties)]
    pub properties: Option<DistributedSystemProperties>,
}

impl WorkerArgs {
    /// The VmId this worker runs as.
    pub fn vm_id(&self) -> VmId {
        VmId::new(self.vm_id)
    }

    /// Environment variables that reproduce these arguments in a child process.
    pub fn to_env(&self) -> Result<Vec<(&'static str, String)>, WorkerError> {
        let mut env = vec![
            (ENV_VM_ID, self.vm_id.to_string()),
            (ENV_CONTROLLER, self.controller.clone()),
            (ENV_WORKING_DIR, self.working_dir.display().to_string()),
        ];

        if let Some(locator) = &self.locator {
            env.push((ENV_LOCATOR, locator.to_string()));
        }

        if let Some(props) = &self.properties {
            let json = serde_json::to_string(props)
                .map_err(|e| WorkerError::InvalidArgs(format!("properties: {}", e)))?;
            env.push((ENV_PROPERTIES, json));
        }

        Ok(env)
    }
}

fn parse_properties(raw: &str) -> Result<DistributedSystemProperties, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid properties JSON: {}", e))
}
