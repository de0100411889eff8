//! Controller-side environment backend.

use async_trait::async_trait;
use dunit_core::{Backend, EnvError};
use dunit_types::{BounceResult, DistributedSystemProperties, LocatorInfo, Pid, VmId};
use std::path::PathBuf;
use std::sync::Arc;

use crate::bounce::BounceController;
use crate::vm::Topology;

/// Backend the harness installs in the controller process.
#[derive(Debug)]
pub struct LauncherBackend {
    locator: LocatorInfo,
    properties: DistributedSystemProperties,
    topology: Arc<Topology>,
    bounce: Arc<BounceController>,
}

impl LauncherBackend {
    pub(crate) fn new(
        locator: LocatorInfo,
        properties: DistributedSystemProperties,
        topology: Arc<Topology>,
        bounce: Arc<BounceController>,
    ) -> Self {
        Self {
            locator,
            properties,
            topology,
            bounce,
        }
    }
}

#[async_trait]
impl Backend for LauncherBackend {
    fn locator(&self) -> Result<LocatorInfo, EnvError> {
        Ok(self.locator.clone())
    }

    fn distributed_system_properties(&self) -> DistributedSystemProperties {
        self.properties.clone()
    }

    fn pid(&self) -> Pid {
        Pid::current()
    }

    fn vm_id(&self) -> VmId {
        VmId::CONTROLLER
    }

    async fn bounce(&self, pid: Pid) -> Result<BounceResult, EnvError> {
        // Run detached so a caller that stops waiting cannot strand the VM
        // half way through a restart.
        let controller = Arc::clone(&self.bounce);
        let task = tokio::spawn(async move { controller.bounce(pid).await });
        match task.await {
            Ok(result) => result,
            Err(e) => Err(EnvError::BounceFailure {
                vm_id: self
                    .topology
                    .slot_for_pid(pid)
                    .map(|slot| slot.vm_id())
                    .unwrap_or(VmId::CONTROLLER),
                reason: e.to_string(),
            }),
        }
    }

    fn working_directory(&self, pid: Pid) -> Result<PathBuf, EnvError> {
        self.topology
            .slot_for_pid(pid)
            .map(|slot| slot.working_dir().to_path_buf())
            .ok_or(EnvError::UnknownProcess { pid })
    }
}
