//! # dunit-core
//!
//! Environment facade and pure harness logic for dunit.
//!
//! Everything here is free of process and network I/O:
//! - [`DUnitEnv`] - the facade test code and tasks talk to
//! - [`Backend`] - the narrow capability interface a concrete environment
//!   (controller or worker) implements
//! - [`bootstrap`] - the once-per-process environment slot
//! - [`merge`] - property merging with harness-level defaults
//! - [`lifecycle`] - the VM lifecycle state machine driven by the bounce
//!   controller
//! - [`logging`] - tracing setup derived from the `log-level` property
//!
//! The I/O lives in `dunit-launcher` (controller) and `dunit-worker`
//! (worker processes), which provide the [`Backend`] implementations.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod bootstrap;
pub mod env;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod merge;

pub use backend::Backend;
pub use env::DUnitEnv;
pub use error::{BouncePhase, EnvError};
pub use lifecycle::{InvalidTransition, LifecycleEvent, VmState};
pub use merge::{log_level, merge_properties, DEFAULT_LOG_LEVEL};
