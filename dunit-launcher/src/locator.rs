//! Locator service - the rendezvous point workers register with.
//!
//! Runs inside the controller for the whole run. Discovery is complete as
//! soon as [`LocatorService::start`] returns: the bound address is known
//! and is the same for every VM.

use dashmap::DashMap;
use dunit_types::{
    read_frame, write_frame, LocatorInfo, LocatorRequest, LocatorResponse, Member, Pid, VmId,
};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::LocatorConfig;

/// A running locator.
#[derive(Debug)]
pub struct LocatorService {
    info: LocatorInfo,
    members: Arc<DashMap<VmId, Pid>>,
    accept_task: JoinHandle<()>,
}

impl LocatorService {
    /// Bind and start accepting registrations.
    pub async fn start(config: &LocatorConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind((config.bind_address.as_str(), config.port)).await?;
        let port = listener.local_addr()?.port();
        let info = LocatorInfo::new(config.bind_address.clone(), port);
        info!(locator = %info, "locator started");

        let members = Arc::new(DashMap::new());
        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&members)));

        Ok(Self {
            info,
            members,
            accept_task,
        })
    }

    /// Where workers find the locator.
    pub fn info(&self) -> &LocatorInfo {
        &self.info
    }

    /// Current registrations, ordered by VmId.
    pub fn members(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self
            .members
            .iter()
            .map(|entry| Member {
                vm_id: *entry.key(),
                pid: *entry.value(),
            })
            .collect();
        members.sort_by_key(|m| m.vm_id);
        members
    }
}

impl Drop for LocatorService {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(listener: TcpListener, members: Arc<DashMap<VmId, Pid>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "locator connection");
                tokio::spawn(handle_connection(stream, Arc::clone(&members)));
            }
            Err(e) => {
                warn!(error = %e, "locator accept failed");
            }
        }
    }
}

async fn handle_connection(mut stream: TcpStream, members: Arc<DashMap<VmId, Pid>>) {
    loop {
        let request: LocatorRequest = match read_frame(&mut stream).await {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "bad locator request");
                return;
            }
        };

        let response = match request {
            LocatorRequest::Register(member) => {
                let previous = members.insert(member.vm_id, member.pid);
                info!(vm_id = %member.vm_id, pid = %member.pid, ?previous, "member registered");
                LocatorResponse::Registered
            }
            LocatorRequest::Members => {
                let mut list: Vec<Member> = members
                    .iter()
                    .map(|e| Member {
                        vm_id: *e.key(),
                        pid: *e.value(),
                    })
                    .collect();
                list.sort_by_key(|m| m.vm_id);
                LocatorResponse::Members(list)
            }
        };

        if let Err(e) = write_frame(&mut stream, &response).await {
            warn!(error = %e, "locator reply failed");
            return;
        }
    }
}
