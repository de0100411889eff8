//! Handshake hub - where workers dial in.
//!
//! Every worker connects back to the controller and opens with a `Hello`
//! naming its VmId and its own pid. The hub hands the connection to
//! whoever registered interest in that VmId via [`HandshakeHub::expect`].
//! Hellos nobody is waiting for, and Hellos with the wrong protocol
//! version, are logged and dropped.

use dashmap::DashMap;
use dunit_types::{read_frame, Frame, Hello, VmId, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long a fresh connection gets to send its Hello.
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// A completed handshake: the worker's Hello and its connection.
#[derive(Debug)]
pub struct Handshake {
    /// What the worker announced.
    pub hello: Hello,
    /// Connection to serve invocations on.
    pub stream: TcpStream,
}

type Waiters = Arc<DashMap<VmId, oneshot::Sender<Handshake>>>;

/// Accepts worker connections and routes them by VmId.
#[derive(Debug)]
pub struct HandshakeHub {
    address: SocketAddr,
    waiters: Waiters,
    accept_task: JoinHandle<()>,
}

impl HandshakeHub {
    /// Bind on `bind_address` with an ephemeral port.
    pub async fn bind(bind_address: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind((bind_address, 0)).await?;
        let address = listener.local_addr()?;
        debug!(%address, "handshake hub listening");

        let waiters: Waiters = Arc::new(DashMap::new());
        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&waiters)));

        Ok(Self {
            address,
            waiters,
            accept_task,
        })
    }

    /// Address workers dial.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Wait for the next Hello from `vm_id`.
    ///
    /// Register before spawning the process so the Hello cannot arrive
    /// first. A second call for the same VmId replaces the first, whose
    /// receiver then sees the sender dropped.
    pub fn expect(&self, vm_id: VmId) -> oneshot::Receiver<Handshake> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(vm_id, tx);
        rx
    }

    /// Stop waiting for `vm_id`.
    pub fn cancel(&self, vm_id: VmId) {
        self.waiters.remove(&vm_id);
    }
}

impl Drop for HandshakeHub {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(listener: TcpListener, waiters: Waiters) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(route(stream, peer, Arc::clone(&waiters)));
            }
            Err(e) => warn!(error = %e, "handshake accept failed"),
        }
    }
}

async fn route(mut stream: TcpStream, peer: SocketAddr, waiters: Waiters) {
    let frame = match tokio::time::timeout(HELLO_TIMEOUT, read_frame::<_, Frame>(&mut stream)).await
    {
        Ok(Ok(Some(frame))) => frame,
        Ok(Ok(None)) => {
            debug!(%peer, "connection closed before hello");
            return;
        }
        Ok(Err(e)) => {
            warn!(%peer, error = %e, "unreadable hello");
            return;
        }
        Err(_) => {
            warn!(%peer, "no hello within {:?}", HELLO_TIMEOUT);
            return;
        }
    };

    let hello = match frame {
        Frame::Hello(hello) => hello,
        other => {
            warn!(%peer, ?other, "expected hello");
            return;
        }
    };

    if hello.protocol_version != PROTOCOL_VERSION {
        warn!(
            %peer,
            vm_id = %hello.vm_id,
            version = hello.protocol_version,
            "dropping hello with unsupported protocol version"
        );
        return;
    }

    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "set_nodelay failed");
    }

    match waiters.remove(&hello.vm_id) {
        Some((_, tx)) => {
            debug!(vm_id = %hello.vm_id, pid = %hello.pid, "handshake");
            if tx.send(Handshake { hello, stream }).is_err() {
                debug!("handshake waiter gave up");
            }
        }
        None => {
            warn!(vm_id = %hello.vm_id, pid = %hello.pid, "unexpected hello dropped");
        }
    }
}
