//! Locator discovery types.
//!
//! The locator is the rendezvous service every worker in a run registers
//! with. Its address is handed to workers as the `locators` property in
//! `address[port]` form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Pid, VmId, WireError};

/// Address and port of the rendezvous service. Identical for every VM in a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocatorInfo {
    /// Host address the locator listens on.
    pub address: String,
    /// TCP port the locator listens on.
    pub port: u16,
}

impl LocatorInfo {
    /// Create locator info from an address and port.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// `host:port` form, suitable for connecting a socket.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Formats as `address[port]`, the locator string workers receive.
impl fmt::Display for LocatorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.address, self.port)
    }
}

impl FromStr for LocatorInfo {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WireError::InvalidData(format!("invalid locator string: {:?}", s));

        let open = s.find('[').ok_or_else(invalid)?;
        let port_str = s[open + 1..].strip_suffix(']').ok_or_else(invalid)?;
        let address = &s[..open];
        if address.is_empty() {
            return Err(invalid());
        }
        let port = port_str.parse::<u16>().map_err(|_| invalid())?;

        Ok(Self::new(address, port))
    }
}

/// A worker registration held by the locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    /// Logical worker identity.
    pub vm_id: VmId,
    /// Current process id of the worker.
    pub pid: Pid,
}

/// Requests a worker sends to the locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocatorRequest {
    /// Register (or re-register after a bounce) a member.
    Register(Member),
    /// List all registered members.
    Members,
}

/// Locator responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocatorResponse {
    /// Registration accepted.
    Registered,
    /// Current membership, ordered by VmId.
    Members(Vec<Member>),
}
