//! Backend capability interface.
//!
//! A backend is the concrete environment behind [`crate::DUnitEnv`]. The
//! controller process uses the launcher's backend, which owns the worker
//! processes. Each worker process uses a worker backend that knows its own
//! identity. The backend is chosen once, explicitly, at bootstrap.

use async_trait::async_trait;
use dunit_types::{BounceResult, DistributedSystemProperties, LocatorInfo, Pid, VmId};
use std::fmt::Debug;
use std::path::PathBuf;

use crate::EnvError;

/// The narrow set of capabilities an environment must provide.
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// Locator discovery info.
    ///
    /// Fails with [`EnvError::LocatorUnavailable`] if discovery has not
    /// completed.
    fn locator(&self) -> Result<LocatorInfo, EnvError>;

    /// The immutable property snapshot for this run.
    fn distributed_system_properties(&self) -> DistributedSystemProperties;

    /// Process id of the current process.
    fn pid(&self) -> Pid;

    /// Logical identity of the current process within the topology.
    fn vm_id(&self) -> VmId;

    /// Kill and restart the worker whose current process is `pid`.
    async fn bounce(&self, pid: Pid) -> Result<BounceResult, EnvError>;

    /// Stable working directory of the VM that `pid` belongs or belonged to.
    fn working_directory(&self, pid: Pid) -> Result<PathBuf, EnvError>;
}
