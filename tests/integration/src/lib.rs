//! # dunit-integration-tests
//!
//! End-to-end tests that start real worker processes.
//!
//! The `integration-worker` binary is a custom worker: the stock built-in
//! tasks plus the ones in [`tasks`]. Scenarios under `tests/` launch it
//! through [`cluster::TestCluster`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cluster;
pub mod tasks;
