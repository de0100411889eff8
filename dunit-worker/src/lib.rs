//! # dunit-worker
//!
//! Runtime for dunit worker processes.
//!
//! A worker is started by the launcher with its logical identity, its
//! working directory, the locator address and the property snapshot. It
//! registers with the locator, dials the controller, announces itself with
//! a `Hello` carrying its own pid and then serves invocations one at a time
//! until told to shut down.
//!
//! ## Architecture
//!
//! ```text
//!  controller                         worker process
//!  ──────────                         ──────────────
//!  handshake hub  ◄──── Hello ─────── run()
//!  WorkerChannel  ───── Invoke ─────► serve() ──► TaskRegistry::dispatch
//!                 ◄──── InvokeResult ─┘               │
//!                                                     ▼
//!                                              handler(&TaskContext, args)
//! ```
//!
//! The stock `dunit-worker` binary runs [`TaskRegistry::with_builtins`].
//! Test suites that need their own tasks build a small binary that adds
//! handlers to the registry and calls [`run`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod args;
pub mod backend;
pub mod builtins;
pub mod error;
pub mod locator_client;
pub mod registry;
pub mod runtime;

pub use args::WorkerArgs;
pub use backend::WorkerBackend;
pub use error::WorkerError;
pub use registry::{TaskContext, TaskRegistry};
pub use runtime::{run, serve, ServeExit};
