//! Backend used inside worker processes.

use async_trait::async_trait;
use dunit_core::{Backend, EnvError};
use dunit_types::{BounceResult, DistributedSystemProperties, LocatorInfo, Pid, VmId};
use std::path::PathBuf;

/// Environment backend for the current worker process.
///
/// Knows its own identity and the run's locator and properties. Process
/// lifecycle belongs to the controller, so `bounce` is not available here.
#[derive(Debug, Clone)]
pub struct WorkerBackend {
    vm_id: VmId,
    pid: Pid,
    working_dir: PathBuf,
    locator: Option<LocatorInfo>,
    properties: DistributedSystemProperties,
}

impl WorkerBackend {
    /// Create the backend for the calling process.
    pub fn new(
        vm_id: VmId,
        working_dir: PathBuf,
        locator: Option<LocatorInfo>,
        properties: DistributedSystemProperties,
    ) -> Self {
        Self {
            vm_id,
            pid: Pid::current(),
            working_dir,
            locator,
            properties,
        }
    }
}

#[async_trait]
impl Backend for WorkerBackend {
    fn locator(&self) -> Result<LocatorInfo, EnvError> {
        self.locator.clone().ok_or(EnvError::LocatorUnavailable)
    }

    fn distributed_system_properties(&self) -> DistributedSystemProperties {
        self.properties.clone()
    }

    fn pid(&self) -> Pid {
        self.pid
    }

    fn vm_id(&self) -> VmId {
        self.vm_id
    }

    async fn bounce(&self, _pid: Pid) -> Result<BounceResult, EnvError> {
        Err(EnvError::Unsupported(
            "bounce must be requested from the controller".into(),
        ))
    }

    fn working_directory(&self, pid: Pid) -> Result<PathBuf, EnvError> {
        if pid == self.pid {
            Ok(self.working_dir.clone())
        } else {
            Err(EnvError::UnknownProcess { pid })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dunit_core::DUnitEnv;

    fn backend() -> WorkerBackend {
        WorkerBackend::new(
            VmId::new(1),
            PathBuf::from("/tmp/vm1"),
            Some(LocatorInfo::new("127.0.0.1", 4000)),
            DistributedSystemProperties::default(),
        )
    }

    #[test]
    fn knows_its_own_identity() {
        let env = DUnitEnv::from_backend(backend());
        assert_eq!(env.vm_id(), VmId::new(1));
        assert_eq!(env.pid(), Pid::current());
        assert_eq!(
            env.working_directory(Pid::current()).unwrap(),
            PathBuf::from("/tmp/vm1")
        );
    }

    #[test]
    fn other_pids_are_unknown() {
        let env = DUnitEnv::from_backend(backend());
        let other = Pid::new(Pid::current().get().wrapping_add(1));
        assert_eq!(
            env.working_directory(other),
            Err(EnvError::UnknownProcess { pid: other })
        );
    }

    #[tokio::test]
    async fn bounce_is_unsupported() {
        let env = DUnitEnv::from_backend(backend());
        let err = env.bounce(Pid::current()).await.unwrap_err();
        assert!(matches!(err, EnvError::Unsupported(_)));
    }
}
