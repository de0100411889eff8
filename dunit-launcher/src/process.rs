//! Worker process spawning and termination.

use dunit_types::{Pid, VmId};
use dunit_worker::WorkerArgs;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::ProcessError;

/// File in each working directory that collects the worker's stdout and stderr.
pub const LOG_FILE: &str = "vm.log";

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited on its own or after SIGTERM.
    Exited,
    /// The grace period ran out and the process was killed.
    Killed,
}

/// One OS process serving as a worker.
#[derive(Debug)]
pub struct WorkerProcess {
    vm_id: VmId,
    pid: Pid,
    child: Child,
}

impl WorkerProcess {
    /// Start `binary` as worker `args.vm_id`, in its working directory, with
    /// output appended to [`LOG_FILE`].
    pub fn spawn(binary: &Path, args: &WorkerArgs) -> Result<Self, ProcessError> {
        let mut cmd = Command::new(binary);
        cmd.envs(args.to_env()?);
        Self::spawn_command(args.vm_id(), cmd, &args.working_dir)
    }

    pub(crate) fn spawn_command(
        vm_id: VmId,
        mut cmd: Command,
        working_dir: &Path,
    ) -> Result<Self, ProcessError> {
        let log_path = working_dir.join(LOG_FILE);
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|source| ProcessError::Log {
                path: log_path.clone(),
                source,
            })?;
        let log_err = log.try_clone().map_err(|source| ProcessError::Log {
            path: log_path.clone(),
            source,
        })?;

        cmd.current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true);

        let binary = PathBuf::from(cmd.as_std().get_program());
        let child = cmd
            .spawn()
            .map_err(|source| ProcessError::Spawn { binary, source })?;
        let pid = Pid::new(child.id().ok_or(ProcessError::NoPid)?);

        info!(%vm_id, %pid, "worker spawned");
        Ok(Self { vm_id, pid, child })
    }

    /// OS process id.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Which worker this process serves as.
    pub fn vm_id(&self) -> VmId {
        self.vm_id
    }

    /// Non-blocking check for exit.
    pub fn has_exited(&mut self) -> Result<bool, ProcessError> {
        Ok(self.child.try_wait()?.is_some())
    }

    /// Wait for the process to exit.
    pub async fn wait(&mut self) -> Result<ExitStatus, ProcessError> {
        Ok(self.child.wait().await?)
    }

    /// Send SIGTERM and wait up to `grace` for the process to exit.
    ///
    /// A process that already exited (a crash, say) returns at once.
    pub async fn terminate(&mut self, grace: Duration) -> Result<Termination, ProcessError> {
        if self.has_exited()? {
            debug!(vm_id = %self.vm_id, pid = %self.pid, "already exited");
            return Ok(Termination::Exited);
        }

        self.signal(Signal::SIGTERM)?;
        self.reap(grace).await
    }

    /// Wait up to `grace` for the process to exit, then kill it.
    pub async fn reap(&mut self, grace: Duration) -> Result<Termination, ProcessError> {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(vm_id = %self.vm_id, pid = %self.pid, %status, "worker exited");
                Ok(Termination::Exited)
            }
            Err(_) => {
                warn!(vm_id = %self.vm_id, pid = %self.pid, "worker did not exit in {:?}, killing", grace);
                self.child.kill().await?;
                Ok(Termination::Killed)
            }
        }
    }

    fn signal(&self, signal: Signal) -> Result<(), ProcessError> {
        let raw = i32::try_from(self.pid.get()).map_err(|_| ProcessError::Signal {
            pid: self.pid,
            source: Errno::EINVAL,
        })?;

        match kill(nix::unistd::Pid::from_raw(raw), signal) {
            Ok(()) => Ok(()),
            // Exited between the check and the signal
            Err(Errno::ESRCH) => Ok(()),
            Err(source) => Err(ProcessError::Signal {
                pid: self.pid,
                source,
            }),
        }
    }
}
