//! Tasks every worker understands.
//!
//! | name          | arguments              | result                      |
//! |---------------|------------------------|-----------------------------|
//! | `noop`        | none                   | `()`                        |
//! | `echo`        | anything               | the same bytes              |
//! | `fail`        | message                | `task-failed` error         |
//! | `panic`       | message                | `panic` error               |
//! | `sleep`       | milliseconds           | `()`                        |
//! | `pid`         | none                   | `u32`                       |
//! | `vm-id`       | none                   | `i32`                       |
//! | `working-dir` | none                   | path as string              |
//! | `write-file`  | (relative path, text)  | `()`                        |
//! | `read-file`   | relative path          | text                        |
//! | `property`    | key                    | `Option<String>`            |
//! | `properties`  | none                   | map of key to string        |
//! | `locator`     | none                   | `address[port]`             |
//! | `members`     | none                   | `Vec<(vm_id, pid)>`         |
//! | `exit`        | exit code              | never returns               |

use dunit_types::RemoteError;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::locator_client;
use crate::registry::{TaskContext, TaskRegistry};

/// Does nothing.
pub const NOOP: &str = "noop";
/// Returns its argument bytes unchanged.
pub const ECHO: &str = "echo";
/// Fails with the given message.
pub const FAIL: &str = "fail";
/// Panics with the given message.
pub const PANIC: &str = "panic";
/// Sleeps for the given number of milliseconds.
pub const SLEEP: &str = "sleep";
/// Reports the worker's pid.
pub const PID: &str = "pid";
/// Reports the worker's VmId.
pub const VM_ID: &str = "vm-id";
/// Reports the worker's working directory.
pub const WORKING_DIR: &str = "working-dir";
/// Writes a file under the working directory.
pub const WRITE_FILE: &str = "write-file";
/// Reads a file under the working directory.
pub const READ_FILE: &str = "read-file";
/// Looks up one distributed system property.
pub const PROPERTY: &str = "property";
/// Returns the whole property snapshot.
pub const PROPERTIES: &str = "properties";
/// Returns the locator string.
pub const LOCATOR: &str = "locator";
/// Lists the members registered with the locator.
pub const MEMBERS: &str = "members";
/// Exits the process immediately.
pub const EXIT: &str = "exit";

/// Add the built-in tasks to `registry`.
pub fn register(registry: &mut TaskRegistry) {
    registry
        .register(NOOP, |_ctx, _: ()| Ok(()))
        .register_raw(ECHO, |_ctx, raw| Ok(raw.to_vec()))
        .register(FAIL, |_ctx, message: String| -> Result<(), RemoteError> {
            Err(RemoteError::task_failed(message))
        })
        .register(PANIC, |_ctx, message: String| -> Result<(), RemoteError> {
            panic!("{}", message)
        })
        .register(SLEEP, |_ctx, millis: u64| {
            std::thread::sleep(Duration::from_millis(millis));
            Ok(())
        })
        .register(PID, |ctx, _: ()| Ok(ctx.pid().get()))
        .register(VM_ID, |ctx, _: ()| Ok(ctx.vm_id().get()))
        .register(WORKING_DIR, |ctx, _: ()| {
            Ok(ctx.working_dir().display().to_string())
        })
        .register(WRITE_FILE, write_file)
        .register(READ_FILE, read_file)
        .register(PROPERTY, |ctx, key: String| {
            Ok(ctx
                .env()
                .distributed_system_properties()
                .get(&key)
                .map(ToString::to_string))
        })
        .register(PROPERTIES, |ctx, _: ()| {
            let snapshot = ctx.env().distributed_system_properties();
            Ok(snapshot
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect::<BTreeMap<String, String>>())
        })
        .register(LOCATOR, |ctx, _: ()| {
            ctx.env()
                .locator_string()
                .map_err(|e| RemoteError::task_failed(e.to_string()))
        })
        .register(MEMBERS, members)
        .register(EXIT, |_ctx, code: i32| -> Result<(), RemoteError> {
            tracing::warn!(code, "exit requested by task");
            std::process::exit(code)
        });
}

fn write_file(ctx: &TaskContext, (path, contents): (String, String)) -> Result<(), RemoteError> {
    let path = resolve(ctx.working_dir(), &path)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_failure(&path, e))?;
    }
    std::fs::write(&path, contents).map_err(|e| io_failure(&path, e))
}

fn read_file(ctx: &TaskContext, path: String) -> Result<String, RemoteError> {
    let path = resolve(ctx.working_dir(), &path)?;
    std::fs::read_to_string(&path).map_err(|e| io_failure(&path, e))
}

fn members(ctx: &TaskContext, _: ()) -> Result<Vec<(i32, u32)>, RemoteError> {
    let locator = ctx
        .env()
        .locator()
        .map_err(|e| RemoteError::task_failed(e.to_string()))?;
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|e| RemoteError::task_failed(format!("no runtime: {}", e)))?;

    let members = handle
        .block_on(locator_client::members(&locator))
        .map_err(|e| RemoteError::task_failed(e.to_string()))?;
    Ok(members
        .into_iter()
        .map(|m| (m.vm_id.get(), m.pid.get()))
        .collect())
}

/// Join a relative path onto the working directory, refusing escapes.
fn resolve(base: &Path, relative: &str) -> Result<PathBuf, RemoteError> {
    let rel = Path::new(relative);
    let escapes = rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.is_empty() || escapes {
        return Err(RemoteError::new(
            RemoteError::BAD_ARGUMENTS,
            format!("path must stay inside the working directory: {:?}", relative),
        ));
    }
    Ok(base.join(rel))
}

fn io_failure(path: &Path, err: std::io::Error) -> RemoteError {
    RemoteError::task_failed(format!("{}: {}", path.display(), err))
}
