//! Launcher - brings up a whole run and tears it down.

use dunit_core::{bootstrap, DUnitEnv, EnvError, LifecycleEvent, DEFAULT_LOG_LEVEL};
use dunit_types::{
    keys, DistributedSystemProperties, LocatorInfo, PropertyMap, PropertyValue, VmId,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::LauncherBackend;
use crate::bounce::BounceController;
use crate::config::LauncherConfig;
use crate::host::{Host, HostRegistry};
use crate::hub::HandshakeHub;
use crate::locator::LocatorService;
use crate::spawner::Spawner;
use crate::vm::{InvokeSettings, Topology, VmSlot};
use crate::{LaunchError, Vm};

/// Builds the property snapshot for a run: defaults, then the configured
/// properties, then the locator.
pub fn build_properties(configured: &PropertyMap, locator: &LocatorInfo) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert(keys::LOG_LEVEL.into(), DEFAULT_LOG_LEVEL.into());
    props.insert(keys::MCAST_PORT.into(), PropertyValue::Int(0));
    props.extend(configured.iter().map(|(k, v)| (k.clone(), v.clone())));
    props.insert(keys::LOCATORS.into(), locator.to_string().into());
    props
}

/// Starts a run from a [`LauncherConfig`].
#[derive(Debug, Clone)]
pub struct Launcher {
    config: LauncherConfig,
}

impl Launcher {
    /// Create a launcher.
    pub fn new(config: LauncherConfig) -> Self {
        Self { config }
    }

    /// Bring up the run.
    ///
    /// Starts the locator, builds the property snapshot, starts the
    /// handshake hub, creates the working directories and spawns every
    /// worker at once. Returns when every worker has completed its
    /// handshake, or fails if any does not within the startup timeout.
    pub async fn launch(self) -> Result<Harness, LaunchError> {
        let config = self.config;
        config.validate()?;
        let binary = config.topology.resolve_worker_binary()?;

        let locator = LocatorService::start(&config.locator)
            .await
            .map_err(LaunchError::Locator)?;
        let properties = DistributedSystemProperties::new(build_properties(
            &config.properties,
            locator.info(),
        ));

        let hub = HandshakeHub::bind(&config.locator.bind_address)
            .await
            .map_err(LaunchError::Hub)?;

        let base_dir = match &config.topology.base_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir().join(format!("dunit-{}", Uuid::new_v4())),
        };

        let mut slots = Vec::with_capacity(config.topology.total_vms());
        for host in 0..config.topology.hosts {
            for _ in 0..config.topology.vms_per_host {
                let vm_id = VmId::new(slots.len() as i32);
                let dir = base_dir.join(format!("vm{}", vm_id.get()));
                std::fs::create_dir_all(&dir).map_err(|source| LaunchError::WorkingDir {
                    path: dir.clone(),
                    source,
                })?;
                slots.push(Arc::new(VmSlot::new(vm_id, host, dir)));
            }
        }

        info!(
            vms = slots.len(),
            hosts = config.topology.hosts,
            base_dir = %base_dir.display(),
            binary = %binary.display(),
            "launching workers"
        );

        let spawner = Arc::new(Spawner::new(
            binary,
            hub,
            locator.info().clone(),
            properties.clone(),
        ));
        let topology = Arc::new(Topology::new(slots));
        start_all(&topology, &spawner, config.timeouts.startup()).await?;

        let bounce = Arc::new(BounceController::new(
            Arc::clone(&topology),
            Arc::clone(&spawner),
            config.timeouts.exit(),
            config.timeouts.restart(),
        ));
        let env = DUnitEnv::from_backend(LauncherBackend::new(
            locator.info().clone(),
            properties,
            Arc::clone(&topology),
            bounce,
        ));

        let settings = InvokeSettings {
            timeout: config.timeouts.invoke(),
            policy: config.timeouts.invoke_during_bounce,
        };
        let mut hosts: Vec<Vec<Vm>> = vec![Vec::new(); config.topology.hosts];
        for slot in topology.slots() {
            hosts[slot.host()].push(Vm::new(Arc::clone(slot), env.clone(), settings));
        }
        let hosts = HostRegistry::new(
            hosts
                .into_iter()
                .enumerate()
                .map(|(index, vms)| Host::new(index, vms))
                .collect(),
        );

        info!(locator = %locator.info(), "harness ready");
        Ok(Harness {
            env,
            hosts,
            topology,
            locator,
            base_dir,
            exit_timeout: config.timeouts.exit(),
        })
    }
}

/// Spawn every worker concurrently and install the ones that come up.
async fn start_all(
    topology: &Arc<Topology>,
    spawner: &Arc<Spawner>,
    timeout: Duration,
) -> Result<(), LaunchError> {
    let mut starting = JoinSet::new();
    for slot in topology.slots() {
        let slot = Arc::clone(slot);
        let spawner = Arc::clone(spawner);
        starting.spawn(async move {
            let result = spawner.start(slot.vm_id(), slot.working_dir(), timeout).await;
            (slot, result)
        });
    }

    let mut first_error = None;
    while let Some(joined) = starting.join_next().await {
        let (slot, result) = joined?;
        match result {
            Ok(worker) => {
                let pid = slot.install(worker).await;
                topology.record_pid(pid, slot.vm_id());
                if let Err(e) = slot.apply(LifecycleEvent::Ready) {
                    warn!(vm_id = %slot.vm_id(), error = %e, "unexpected lifecycle transition");
                }
                info!(vm_id = %slot.vm_id(), %pid, "worker ready");
            }
            Err(source) => {
                if let Err(e) = slot.apply(LifecycleEvent::StartFailed) {
                    warn!(vm_id = %slot.vm_id(), error = %e, "unexpected lifecycle transition");
                }
                warn!(vm_id = %slot.vm_id(), error = %source, "worker failed to start");
                first_error.get_or_insert(LaunchError::Worker {
                    vm_id: slot.vm_id(),
                    source,
                });
            }
        }
    }

    // Workers that did come up are killed when the topology drops
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// A running set of workers.
///
/// Dropping the harness kills every worker. Call [`Harness::shutdown`] to
/// let them exit cleanly first.
#[derive(Debug)]
pub struct Harness {
    env: DUnitEnv,
    hosts: HostRegistry,
    topology: Arc<Topology>,
    locator: LocatorService,
    base_dir: PathBuf,
    exit_timeout: Duration,
}

impl Harness {
    /// The controller's environment handle.
    pub fn env(&self) -> &DUnitEnv {
        &self.env
    }

    /// All hosts.
    pub fn hosts(&self) -> &HostRegistry {
        &self.hosts
    }

    /// The host in slot `index`.
    pub fn host(&self, index: usize) -> Option<&Host> {
        self.hosts.host(index)
    }

    /// The VM with id `vm_id`, on any host.
    pub fn vm(&self, vm_id: impl Into<VmId>) -> Option<&Vm> {
        self.hosts.vm(vm_id)
    }

    /// Where workers find the locator.
    pub fn locator(&self) -> &LocatorService {
        &self.locator
    }

    /// Directory holding every VM's working directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Install this harness's environment as the process-wide one.
    ///
    /// Fails with `AlreadyInitialized` if the process already has one.
    pub fn install_environment(&self) -> Result<(), EnvError> {
        bootstrap::install(self.env.clone())
    }

    /// Ask every worker to exit and wait for them. Stragglers are killed.
    pub async fn shutdown(self) {
        let mut stopping = JoinSet::new();
        for slot in self.topology.slots() {
            let slot = Arc::clone(slot);
            let grace = self.exit_timeout;
            stopping.spawn(async move {
                // Wait out a bounce in progress
                let _gate = slot.gate.write().await;
                let live = slot.live.lock().await.take();
                if let Some(mut live) = live {
                    live.channel.shutdown();
                    match live.process.reap(grace).await {
                        Ok(outcome) => {
                            info!(vm_id = %slot.vm_id(), ?outcome, "worker stopped")
                        }
                        Err(e) => warn!(vm_id = %slot.vm_id(), error = %e, "worker stop failed"),
                    }
                }
            });
        }

        while let Some(joined) = stopping.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "shutdown task failed");
            }
        }
        info!("harness stopped");
    }
}
