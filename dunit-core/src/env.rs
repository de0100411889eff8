//! DUnitEnv - the environment facade.
//!
//! Test code and tasks get a [`DUnitEnv`] handle passed to them explicitly
//! (host registry, VM handles and task contexts all carry one). For the
//! rare caller with no handle in reach, [`crate::bootstrap::current`]
//! returns the one installed for the process.
//!
//! # Example
//!
//! ```ignore
//! let env = harness.env();
//! let props = env.merge_properties(my_props);
//! let result = env.bounce(vm.pid()).await?;
//! let dir = env.working_directory(result.previous_pid)?;
//! ```

use dunit_types::{
    BounceResult, DistributedSystemProperties, LocatorInfo, Pid, PropertyMap, VmId,
};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{logging, merge, Backend, EnvError};

/// Cheap-to-clone handle to the environment backend.
#[derive(Clone)]
pub struct DUnitEnv {
    backend: Arc<dyn Backend>,
}

impl DUnitEnv {
    /// Wrap a backend.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Wrap a backend by value.
    pub fn from_backend<B: Backend + 'static>(backend: B) -> Self {
        Self::new(Arc::new(backend))
    }

    /// Locator info, identical for every caller in a run.
    pub fn locator(&self) -> Result<LocatorInfo, EnvError> {
        self.backend.locator()
    }

    /// Locator string in `address[port]` form.
    pub fn locator_string(&self) -> Result<String, EnvError> {
        Ok(self.locator()?.to_string())
    }

    /// Locator host address.
    pub fn locator_address(&self) -> Result<String, EnvError> {
        Ok(self.locator()?.address)
    }

    /// Locator port.
    pub fn locator_port(&self) -> Result<u16, EnvError> {
        Ok(self.locator()?.port)
    }

    /// The backend's immutable property snapshot.
    pub fn distributed_system_properties(&self) -> DistributedSystemProperties {
        self.backend.distributed_system_properties()
    }

    /// Merge the backend snapshot onto `caller`. See [`merge::merge_properties`].
    pub fn merge_properties(&self, caller: PropertyMap) -> PropertyMap {
        merge::merge_properties(&self.distributed_system_properties(), caller)
    }

    /// Log level configured for the run, defaulting to `config`.
    pub fn log_level(&self) -> String {
        merge::log_level(&self.distributed_system_properties())
    }

    /// Merge `caller` with the snapshot and install a tracing subscriber for
    /// the merged `log-level`. Returns the merged properties.
    ///
    /// Installing is a no-op if a subscriber is already set.
    pub fn init_logging(&self, caller: PropertyMap) -> PropertyMap {
        let merged = self.merge_properties(caller);
        logging::init(&merged);
        merged
    }

    /// Process id of the current process.
    pub fn pid(&self) -> Pid {
        self.backend.pid()
    }

    /// Which worker the current process is ([`VmId::CONTROLLER`] in the controller).
    pub fn vm_id(&self) -> VmId {
        self.backend.vm_id()
    }

    /// Kill and restart the worker whose current process is `pid`.
    pub async fn bounce(&self, pid: Pid) -> Result<BounceResult, EnvError> {
        self.backend.bounce(pid).await
    }

    /// Working directory of the VM `pid` belongs to, valid for every pid
    /// the VM has ever had.
    pub fn working_directory(&self, pid: Pid) -> Result<PathBuf, EnvError> {
        self.backend.working_directory(pid)
    }
}

impl fmt::Debug for DUnitEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DUnitEnv")
            .field("backend", &self.backend)
            .finish()
    }
}
