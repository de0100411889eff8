//! Tasks the integration worker adds on top of the built-ins.

use dunit_core::bootstrap;
use nix::sys::signal::{signal, SigHandler, Signal};
use std::time::Duration;
use dunit_types::{PropertyMap, RemoteError};
use dunit_worker::{TaskContext, TaskRegistry};

/// Always fails with the message `boom`.
pub const BOOM: &str = "boom";
/// VmId as reported by the process-wide environment.
pub const INSTALLED_VM_ID: &str = "installed-vm-id";
/// Merges the caller's properties onto the worker's snapshot.
pub const MERGED_PROPERTIES: &str = "merged-properties";
/// Increments a counter kept in the working directory.
pub const BUMP: &str = "bump";
/// Ignores SIGTERM, then keeps the worker busy for the given milliseconds.
pub const STUBBORN: &str = "stubborn";

const COUNTER_FILE: &str = "counter";

/// Built-ins plus the integration tasks.
pub fn registry() -> TaskRegistry {
    let mut registry = TaskRegistry::with_builtins();
    registry
        .register(BOOM, |_ctx, _: ()| -> Result<(), RemoteError> {
            Err(RemoteError::task_failed("boom"))
        })
        .register(INSTALLED_VM_ID, |_ctx, _: ()| {
            let env = bootstrap::current().map_err(|e| RemoteError::task_failed(e.to_string()))?;
            Ok(env.vm_id().get())
        })
        .register(MERGED_PROPERTIES, |ctx, caller: PropertyMap| {
            Ok(ctx.env().merge_properties(caller))
        })
        .register(BUMP, bump)
        .register(STUBBORN, stubborn);
    registry
}

fn stubborn(_ctx: &TaskContext, millis: u64) -> Result<(), RemoteError> {
    // SAFETY: SigIgn installs no handler code
    unsafe { signal(Signal::SIGTERM, SigHandler::SigIgn) }
        .map_err(|e| RemoteError::task_failed(format!("ignoring SIGTERM: {}", e)))?;
    std::thread::sleep(Duration::from_millis(millis));
    Ok(())
}

fn bump(ctx: &TaskContext, _: ()) -> Result<u64, RemoteError> {
    let path = ctx.working_dir().join(COUNTER_FILE);
    let current = match std::fs::read_to_string(&path) {
        Ok(text) => text
            .trim()
            .parse::<u64>()
            .map_err(|e| RemoteError::task_failed(format!("corrupt counter: {}", e)))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
        Err(e) => return Err(RemoteError::task_failed(e.to_string())),
    };

    let next = current + 1;
    std::fs::write(&path, next.to_string())
        .map_err(|e| RemoteError::task_failed(e.to_string()))?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dunit_core::DUnitEnv;
    use dunit_types::{decode, DistributedSystemProperties, LocatorInfo, Task, VmId};
    use dunit_worker::WorkerBackend;

    fn context(dir: &std::path::Path) -> TaskContext {
        let backend = WorkerBackend::new(
            VmId::new(2),
            dir.to_path_buf(),
            Some(LocatorInfo::new("127.0.0.1", 10334)),
            DistributedSystemProperties::default(),
        );
        TaskContext::new(DUnitEnv::from_backend(backend), dir.to_path_buf())
    }

    #[test]
    fn registry_keeps_the_builtins() {
        let registry = registry();
        assert!(registry.contains(dunit_worker::builtins::NOOP));
        assert!(registry.contains(BOOM));
        assert!(registry.contains(BUMP));
    }

    #[test]
    fn boom_reports_its_message() {
        let dir = tempfile::tempdir().unwrap();
        let err = registry()
            .dispatch(&context(dir.path()), &Task::new(BOOM))
            .unwrap_err();
        assert_eq!(err.kind, RemoteError::TASK_FAILED);
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn bump_counts_in_the_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let registry = registry();

        for expected in 1..=3u64 {
            let bytes = registry.dispatch(&ctx, &Task::new(BUMP)).unwrap();
            assert_eq!(decode::<u64>(&bytes).unwrap(), expected);
        }
        let stored = std::fs::read_to_string(dir.path().join(COUNTER_FILE)).unwrap();
        assert_eq!(stored, "3");
    }
}
