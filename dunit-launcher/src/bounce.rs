//! Bounce controller - kill and restart a worker, keeping its identity.

use dunit_core::{BouncePhase, EnvError, LifecycleEvent};
use dunit_types::{BounceResult, Pid};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::process::Termination;
use crate::spawner::Spawner;
use crate::vm::{Topology, VmSlot};
use crate::ProcessError;

/// Runs the bounce sequence against the run's VMs.
#[derive(Debug)]
pub struct BounceController {
    topology: Arc<Topology>,
    spawner: Arc<Spawner>,
    exit_timeout: Duration,
    restart_timeout: Duration,
}

impl BounceController {
    pub(crate) fn new(
        topology: Arc<Topology>,
        spawner: Arc<Spawner>,
        exit_timeout: Duration,
        restart_timeout: Duration,
    ) -> Self {
        Self {
            topology,
            spawner,
            exit_timeout,
            restart_timeout,
        }
    }

    /// Bounce the VM whose current process is `pid`.
    ///
    /// 1. `pid` must be the current process of a RUNNING VM, else `UnknownProcess`.
    /// 2. The VM goes BOUNCING and waits for in-flight invocations.
    /// 3. SIGTERM, then up to the exit timeout for the process to go away.
    /// 4. A replacement starts with the same VmId, directory and properties.
    /// 5. Up to the restart timeout for its handshake.
    /// 6. The new pid is recorded and the VM is RUNNING again.
    ///
    /// A timeout in step 3 or 5, or a failed spawn, leaves the VM DEAD.
    pub async fn bounce(&self, pid: Pid) -> Result<BounceResult, EnvError> {
        let slot = self
            .topology
            .slot_for_current_pid(pid)
            .ok_or(EnvError::UnknownProcess { pid })?;

        if !slot.begin_bounce(pid) {
            return Err(EnvError::UnknownProcess { pid });
        }
        info!(vm_id = %slot.vm_id(), %pid, "bounce requested");

        let _gate = slot.gate.write().await;
        match self.restart(slot, pid).await {
            Ok(result) => {
                self.transition(slot, LifecycleEvent::Restarted);
                info!(vm_id = %slot.vm_id(), new_pid = %result.new_pid, "bounce complete");
                Ok(result)
            }
            Err((event, err)) => {
                self.transition(slot, event);
                warn!(vm_id = %slot.vm_id(), error = %err, "bounce failed, VM is dead");
                Err(err)
            }
        }
    }

    async fn restart(
        &self,
        slot: &VmSlot,
        previous_pid: Pid,
    ) -> Result<BounceResult, (LifecycleEvent, EnvError)> {
        let vm_id = slot.vm_id();
        let failure = |reason: String| {
            (
                LifecycleEvent::RestartFailed,
                EnvError::BounceFailure { vm_id, reason },
            )
        };

        let live = slot.live.lock().await.take();
        if let Some(mut live) = live {
            // Nothing can be in flight: we hold the gate exclusively
            drop(live.channel);
            match live.process.terminate(self.exit_timeout).await {
                Ok(Termination::Exited) => {}
                Ok(Termination::Killed) => {
                    return Err((
                        LifecycleEvent::ExitTimedOut,
                        EnvError::BounceTimeout {
                            vm_id,
                            phase: BouncePhase::Exit,
                        },
                    ))
                }
                Err(e) => return Err(failure(e.to_string())),
            }
        }

        let worker = match self
            .spawner
            .start(vm_id, slot.working_dir(), self.restart_timeout)
            .await
        {
            Ok(worker) => worker,
            Err(ProcessError::HandshakeTimeout { .. }) => {
                return Err((
                    LifecycleEvent::RestartTimedOut,
                    EnvError::BounceTimeout {
                        vm_id,
                        phase: BouncePhase::Restart,
                    },
                ))
            }
            Err(e) => return Err(failure(e.to_string())),
        };

        let new_pid = slot.install(worker).await;
        self.topology.record_pid(new_pid, vm_id);

        Ok(BounceResult {
            new_pid,
            previous_pid,
            success: true,
        })
    }

    fn transition(&self, slot: &VmSlot, event: LifecycleEvent) {
        if let Err(e) = slot.apply(event) {
            warn!(vm_id = %slot.vm_id(), error = %e, "unexpected lifecycle transition");
        }
    }
}
