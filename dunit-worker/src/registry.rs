//! Task registry - maps task names to handlers.

use dunit_core::DUnitEnv;
use dunit_types::{decode, encode, Pid, RemoteError, Task, VmId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::builtins;

type Handler = Arc<dyn Fn(&TaskContext, &[u8]) -> Result<Vec<u8>, RemoteError> + Send + Sync>;

/// What a task handler can see of the worker it runs in.
#[derive(Debug, Clone)]
pub struct TaskContext {
    env: DUnitEnv,
    working_dir: PathBuf,
}

impl TaskContext {
    /// Create a context.
    pub fn new(env: DUnitEnv, working_dir: PathBuf) -> Self {
        Self { env, working_dir }
    }

    /// The worker's environment handle.
    pub fn env(&self) -> &DUnitEnv {
        &self.env
    }

    /// The VM's stable working directory.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Which worker this is.
    pub fn vm_id(&self) -> VmId {
        self.env.vm_id()
    }

    /// The worker's current pid.
    pub fn pid(&self) -> Pid {
        self.env.pid()
    }
}

/// Named task handlers available in a worker.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: HashMap<String, Handler>,
}

impl TaskRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in tasks (see [`builtins`]).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtins::register(&mut registry);
        registry
    }

    /// Register a typed handler.
    ///
    /// Arguments are decoded into `A` before the call and the returned `R`
    /// is encoded for the trip back. Registering a name twice replaces the
    /// earlier handler.
    pub fn register<A, R, F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(&TaskContext, A) -> Result<R, RemoteError> + Send + Sync + 'static,
    {
        let task_name = name.to_string();
        self.register_raw(name, move |ctx, raw| {
            let args: A = decode(raw).map_err(|e| {
                RemoteError::new(
                    RemoteError::BAD_ARGUMENTS,
                    format!("{}: {}", task_name, e),
                )
            })?;
            let value = handler(ctx, args)?;
            encode(&value).map_err(|e| {
                RemoteError::task_failed(format!("{}: result encoding failed: {}", task_name, e))
            })
        })
    }

    /// Register a handler that works on the raw MessagePack bytes.
    pub fn register_raw<F>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: Fn(&TaskContext, &[u8]) -> Result<Vec<u8>, RemoteError> + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_string(), Arc::new(handler));
        self
    }

    /// Returns true if a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered task names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run a task. Panics inside the handler are caught and reported.
    pub fn dispatch(&self, ctx: &TaskContext, task: &Task) -> Result<Vec<u8>, RemoteError> {
        let handler = self.handlers.get(&task.name).ok_or_else(|| {
            RemoteError::new(
                RemoteError::UNKNOWN_TASK,
                format!("no task named {:?}", task.name),
            )
        })?;

        match catch_unwind(AssertUnwindSafe(|| handler(ctx, &task.args))) {
            Ok(outcome) => outcome,
            Err(payload) => Err(RemoteError::new(
                RemoteError::PANIC,
                panic_message(payload.as_ref()),
            )),
        }
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
