//! Identity types for dunit workers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical identity of a worker VM.
///
/// Stable for the whole run: a bounce replaces the process behind a VM but
/// never its `VmId`. The controller process itself is [`VmId::CONTROLLER`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VmId(i32);

impl VmId {
    /// The controller (test) process. It is not a worker.
    pub const CONTROLLER: VmId = VmId(-1);

    /// Create a VmId from its integer form.
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Get the integer form of this VmId.
    pub const fn get(&self) -> i32 {
        self.0
    }

    /// Returns true if this is the controller pseudo-VM.
    pub const fn is_controller(&self) -> bool {
        self.0 == Self::CONTROLLER.0
    }
}

impl From<i32> for VmId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_controller() {
            write!(f, "controller")
        } else {
            write!(f, "vm{}", self.0)
        }
    }
}

impl fmt::Debug for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VmId({})", self.0)
    }
}

/// An operating system process id.
///
/// Changes every time the VM behind it is bounced.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pid(u32);

impl Pid {
    /// Create a Pid from a raw process id.
    pub const fn new(pid: u32) -> Self {
        Self(pid)
    }

    /// The pid of the calling process.
    pub fn current() -> Self {
        Self(std::process::id())
    }

    /// Get the raw process id.
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl From<u32> for Pid {
    fn from(pid: u32) -> Self {
        Self(pid)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self.0)
    }
}
