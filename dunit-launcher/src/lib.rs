//! # dunit-launcher
//!
//! Controller side of the dunit distributed test harness.
//!
//! The launcher starts a locator, spawns one worker process per configured
//! VM and hands back a [`Harness`]: a [`HostRegistry`] of [`Vm`] handles
//! plus the controller's [`DUnitEnv`](dunit_core::DUnitEnv).
//!
//! ## Example
//!
//! ```ignore
//! use dunit_launcher::{Launcher, LauncherConfig};
//! use dunit_types::Task;
//!
//! let harness = Launcher::new(LauncherConfig::default().with_topology(1, 3))
//!     .launch()
//!     .await?;
//!
//! let vm = harness.host(0).and_then(|h| h.vm(1)).unwrap();
//! vm.invoke::<()>(Task::new("noop")).await?;
//!
//! let before = vm.pid();
//! let bounced = vm.bounce().await?;
//! assert_ne!(bounced.new_pid, before);
//! assert_eq!(
//!     harness.env().working_directory(before)?,
//!     harness.env().working_directory(bounced.new_pid)?,
//! );
//!
//! harness.shutdown().await;
//! ```
//!
//! ## Architecture
//!
//! ```text
//!  Launcher::launch
//!      │
//!      ├── LocatorService      (workers register; address goes into `locators`)
//!      ├── HandshakeHub        (workers dial back with Hello{vm_id, pid})
//!      ├── Spawner             (spawn + wait for Hello → WorkerChannel)
//!      ├── Topology            (one VmSlot per VmId, pid history)
//!      ├── BounceController    (RUNNING → BOUNCING → RUNNING | DEAD)
//!      └── LauncherBackend     (Backend for the controller's DUnitEnv)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod bounce;
pub mod channel;
pub mod config;
pub mod error;
pub mod host;
pub mod hub;
pub mod launcher;
pub mod locator;
pub mod process;
pub mod spawner;
mod vm;

pub use backend::LauncherBackend;
pub use bounce::BounceController;
pub use config::{BouncePolicy, ConfigError, LauncherConfig};
pub use error::{InvokeError, LaunchError, ProcessError};
pub use host::{Host, HostRegistry};
pub use launcher::{Harness, Launcher};
pub use vm::Vm;
