//! # dunit-types
//!
//! Wire format and data model types for the dunit distributed test harness.
//!
//! This crate provides the foundational types shared by the controller
//! (`dunit-launcher`) and the worker processes (`dunit-worker`):
//! - [`VmId`], [`Pid`] - Logical worker identity and OS process identity
//! - [`DistributedSystemProperties`], [`PropertyMap`] - Configuration snapshot
//! - [`LocatorInfo`], [`Member`] - Rendezvous service discovery
//! - [`Task`], [`RemoteError`] - Serializable units of remote work
//! - [`Frame`], [`LocatorRequest`], [`LocatorResponse`] - Protocol frames
//! - [`read_frame`] / [`write_frame`] - Length-prefixed MessagePack codec
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod codec;
mod error;
mod frame;
mod ids;
mod locator;
mod properties;
mod task;

pub use codec::{decode, encode, read_frame, write_frame, MAX_FRAME_SIZE};
pub use error::WireError;
pub use frame::{BounceResult, Frame, Hello, Invoke, InvokeResult, PROTOCOL_VERSION};
pub use ids::{Pid, VmId};
pub use locator::{LocatorInfo, LocatorRequest, LocatorResponse, Member};
pub use properties::{keys, DistributedSystemProperties, PropertyMap, PropertyValue};
pub use task::{RemoteError, Task};
