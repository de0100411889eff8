//! Client side of the locator protocol.
//!
//! One short-lived connection per request: connect, send a
//! [`LocatorRequest`], read the [`LocatorResponse`], close.

use dunit_types::{read_frame, write_frame, LocatorInfo, LocatorRequest, LocatorResponse, Member};
use tokio::net::TcpStream;

use crate::WorkerError;

async fn request(
    locator: &LocatorInfo,
    req: &LocatorRequest,
) -> Result<LocatorResponse, WorkerError> {
    let address = locator.socket_addr();
    let mut stream = TcpStream::connect(&address)
        .await
        .map_err(|source| WorkerError::LocatorConnect { address, source })?;

    write_frame(&mut stream, req).await?;
    read_frame(&mut stream)
        .await?
        .ok_or_else(|| WorkerError::Locator("locator closed the connection".into()))
}

/// Register `member` with the locator. Re-registering a VmId replaces its pid.
pub async fn register(locator: &LocatorInfo, member: Member) -> Result<(), WorkerError> {
    match request(locator, &LocatorRequest::Register(member)).await? {
        LocatorResponse::Registered => Ok(()),
        other => Err(WorkerError::Locator(format!(
            "unexpected response to register: {:?}",
            other
        ))),
    }
}

/// List the members currently registered with the locator.
pub async fn members(locator: &LocatorInfo) -> Result<Vec<Member>, WorkerError> {
    match request(locator, &LocatorRequest::Members).await? {
        LocatorResponse::Members(members) => Ok(members),
        other => Err(WorkerError::Locator(format!(
            "unexpected response to members: {:?}",
            other
        ))),
    }
}
