//! VM handles and the per-VM state behind them.
//!
//! A [`VmSlot`] exists once per configured worker for the whole run. It is
//! never recreated: a bounce swaps the process and channel inside it and
//! updates its pid and state. [`Vm`] handles are cheap clones pointing at a
//! slot, so every handle for a VmId sees the same worker.
//!
//! Mutual exclusion between invocations and bounce is a read/write gate:
//! invocations hold it shared, a bounce holds it exclusively. The bounce
//! flips the state to BOUNCING before queueing for the gate, so invocations
//! that arrive afterwards see BOUNCING and wait or fail per policy, while
//! invocations already in flight finish first.

use dashmap::DashMap;
use dunit_core::{DUnitEnv, EnvError, InvalidTransition, LifecycleEvent, VmState};
use dunit_types::{decode, BounceResult, Pid, Task, VmId};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::channel::WorkerChannel;
use crate::config::BouncePolicy;
use crate::process::WorkerProcess;
use crate::spawner::LiveWorker;
use crate::InvokeError;

/// Process and channel currently serving a VM.
#[derive(Debug)]
pub(crate) struct Live {
    pub(crate) process: WorkerProcess,
    pub(crate) channel: Arc<WorkerChannel>,
}

/// Per-VM state shared by every handle.
#[derive(Debug)]
pub(crate) struct VmSlot {
    vm_id: VmId,
    host: usize,
    working_dir: PathBuf,
    pid: AtomicU32,
    state: watch::Sender<VmState>,
    pub(crate) gate: RwLock<()>,
    pub(crate) live: Mutex<Option<Live>>,
}

impl VmSlot {
    pub(crate) fn new(vm_id: VmId, host: usize, working_dir: PathBuf) -> Self {
        let (state, _) = watch::channel(VmState::Starting);
        Self {
            vm_id,
            host,
            working_dir,
            pid: AtomicU32::new(0),
            state,
            gate: RwLock::new(()),
            live: Mutex::new(None),
        }
    }

    pub(crate) fn vm_id(&self) -> VmId {
        self.vm_id
    }

    pub(crate) fn host(&self) -> usize {
        self.host
    }

    pub(crate) fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub(crate) fn pid(&self) -> Pid {
        Pid::new(self.pid.load(Ordering::SeqCst))
    }

    pub(crate) fn state(&self) -> VmState {
        *self.state.borrow()
    }

    /// Apply a lifecycle event through the state machine.
    pub(crate) fn apply(&self, event: LifecycleEvent) -> Result<VmState, InvalidTransition> {
        let mut outcome = Err(InvalidTransition {
            from: self.state(),
            event,
        });
        self.state.send_if_modified(|state| match state.on_event(event) {
            Ok(next) => {
                outcome = Ok(next);
                let changed = *state != next;
                *state = next;
                changed
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        if let Ok(next) = outcome {
            debug!(vm_id = %self.vm_id, ?event, state = %next, "state change");
        }
        outcome
    }

    /// RUNNING -> BOUNCING, but only if `pid` is the current process.
    /// Returns false when the VM is in any other state or `pid` is stale.
    pub(crate) fn begin_bounce(&self, pid: Pid) -> bool {
        let current = self.pid();
        self.state.send_if_modified(|state| {
            if *state == VmState::Running && current == pid {
                *state = VmState::Bouncing;
                true
            } else {
                false
            }
        })
    }

    /// Put a freshly started worker in place and record its pid.
    pub(crate) async fn install(&self, worker: LiveWorker) -> Pid {
        let pid = worker.pid;
        self.pid.store(pid.get(), Ordering::SeqCst);
        *self.live.lock().await = Some(Live {
            process: worker.process,
            channel: Arc::new(worker.channel),
        });
        pid
    }

    async fn channel(&self) -> Option<Arc<WorkerChannel>> {
        self.live
            .lock()
            .await
            .as_ref()
            .map(|live| Arc::clone(&live.channel))
    }

    /// Wait until the state is neither STARTING nor BOUNCING.
    async fn settled(&self) -> VmState {
        let mut rx = self.state.subscribe();
        let settled = match rx.wait_for(|s| !s.is_transient()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        settled
    }
}

/// Every slot in the run plus the history of pids they have had.
#[derive(Debug)]
pub(crate) struct Topology {
    slots: Vec<Arc<VmSlot>>,
    pid_history: DashMap<Pid, VmId>,
}

impl Topology {
    pub(crate) fn new(slots: Vec<Arc<VmSlot>>) -> Self {
        Self {
            slots,
            pid_history: DashMap::new(),
        }
    }

    pub(crate) fn slots(&self) -> &[Arc<VmSlot>] {
        &self.slots
    }

    pub(crate) fn slot(&self, vm_id: VmId) -> Option<&Arc<VmSlot>> {
        usize::try_from(vm_id.get())
            .ok()
            .and_then(|index| self.slots.get(index))
    }

    /// Remember that `pid` belonged to `vm_id`.
    pub(crate) fn record_pid(&self, pid: Pid, vm_id: VmId) {
        self.pid_history.insert(pid, vm_id);
    }

    /// The VM `pid` belongs or belonged to.
    pub(crate) fn slot_for_pid(&self, pid: Pid) -> Option<&Arc<VmSlot>> {
        let vm_id = *self.pid_history.get(&pid)?;
        self.slot(vm_id)
    }

    /// The VM whose *current* process is `pid`.
    pub(crate) fn slot_for_current_pid(&self, pid: Pid) -> Option<&Arc<VmSlot>> {
        self.slot_for_pid(pid).filter(|slot| slot.pid() == pid)
    }
}

/// Invocation settings shared by every handle.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InvokeSettings {
    pub(crate) timeout: Duration,
    pub(crate) policy: BouncePolicy,
}

/// Handle to one worker.
///
/// Identity is the VmId. The pid behind the handle changes when the worker
/// is bounced; the VmId and working directory never do.
#[derive(Debug, Clone)]
pub struct Vm {
    slot: Arc<VmSlot>,
    env: DUnitEnv,
    settings: InvokeSettings,
}

impl Vm {
    pub(crate) fn new(slot: Arc<VmSlot>, env: DUnitEnv, settings: InvokeSettings) -> Self {
        Self {
            slot,
            env,
            settings,
        }
    }

    /// Logical worker id.
    pub fn vm_id(&self) -> VmId {
        self.slot.vm_id()
    }

    /// Current OS process id.
    pub fn pid(&self) -> Pid {
        self.slot.pid()
    }

    /// Index of the host this VM belongs to.
    pub fn host(&self) -> usize {
        self.slot.host()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> VmState {
        self.slot.state()
    }

    /// Stable working directory, unchanged by bounces.
    pub fn working_directory(&self) -> &Path {
        self.slot.working_dir()
    }

    /// Run `task` in the worker with the configured timeout and decode the result.
    pub async fn invoke<R: DeserializeOwned>(&self, task: Task) -> Result<R, InvokeError> {
        self.invoke_with_timeout(task, self.settings.timeout).await
    }

    /// Run `task` with an explicit timeout and decode the result.
    pub async fn invoke_with_timeout<R: DeserializeOwned>(
        &self,
        task: Task,
        timeout: Duration,
    ) -> Result<R, InvokeError> {
        let bytes = self.invoke_raw(task, timeout).await?;
        Ok(decode(&bytes)?)
    }

    /// Run `task` and return the raw MessagePack result.
    ///
    /// A failure inside the worker comes back as [`InvokeError::Remote`]
    /// and leaves the VM RUNNING. The timeout covers everything, including
    /// time spent waiting out a bounce.
    pub async fn invoke_raw(&self, task: Task, timeout: Duration) -> Result<Vec<u8>, InvokeError> {
        let vm_id = self.vm_id();
        let deadline = Instant::now() + timeout;
        let timed_out = || InvokeError::Timeout { vm_id, timeout };

        loop {
            match self.slot.state() {
                VmState::Dead => return Err(InvokeError::VmDead { vm_id }),
                VmState::Starting | VmState::Bouncing => {
                    if self.settings.policy == BouncePolicy::Fail {
                        return Err(InvokeError::Bouncing { vm_id });
                    }
                    tokio::time::timeout_at(deadline, self.slot.settled())
                        .await
                        .map_err(|_| timed_out())?;
                    continue;
                }
                VmState::Running => {}
            }

            let _gate = tokio::time::timeout_at(deadline, self.slot.gate.read())
                .await
                .map_err(|_| timed_out())?;

            // A bounce may have started while we queued for the gate
            if !self.slot.state().accepts_invocations() {
                continue;
            }

            let channel = self
                .slot
                .channel()
                .await
                .ok_or(InvokeError::Disconnected { vm_id })?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            return match channel.invoke(task, remaining).await {
                Err(InvokeError::Timeout { .. }) => Err(timed_out()),
                other => other,
            };
        }
    }

    /// Kill and restart this worker. Same as `env.bounce(vm.pid())`.
    ///
    /// On success the handle reports the new pid.
    pub async fn bounce(&self) -> Result<BounceResult, EnvError> {
        let result = self.env.bounce(self.pid()).await?;
        info!(vm_id = %self.vm_id(), previous = %result.previous_pid, new = %result.new_pid, "bounced");
        Ok(result)
    }
}
