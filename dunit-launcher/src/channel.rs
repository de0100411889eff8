//! Controller half of the invocation channel.
//!
//! One `WorkerChannel` per live worker process. A writer task owns the
//! write half and a reader task owns the read half, so a caller that gives
//! up (timeout, cancellation) can never leave half a frame on the wire.
//!
//! ```text
//!  invoke() ──Frame──► mpsc ──► writer task ──► socket
//!     ▲                                           │
//!     └── oneshot ◄── pending[correlation_id] ◄── reader task
//! ```

use dashmap::DashMap;
use dunit_types::{read_frame, write_frame, Frame, Invoke, RemoteError, Task, VmId};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::InvokeError;

type Outcome = Result<Vec<u8>, RemoteError>;

#[derive(Debug, Default)]
struct Shared {
    pending: DashMap<u64, oneshot::Sender<Outcome>>,
    closed: AtomicBool,
}

impl Shared {
    /// Mark closed and fail every waiter. Dropping the senders is what
    /// wakes them with `Disconnected`.
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pending.clear();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Removes a pending entry when its caller stops waiting.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.remove(&self.id);
    }
}

/// Request/response channel to one worker process.
#[derive(Debug)]
pub struct WorkerChannel {
    vm_id: VmId,
    outbound: mpsc::UnboundedSender<Frame>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WorkerChannel {
    /// Start the reader and writer tasks on a connected stream.
    pub fn new<S>(vm_id: VmId, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let writer = tokio::spawn(write_loop(vm_id, write_half, rx, Arc::clone(&shared)));
        let reader = tokio::spawn(read_loop(vm_id, read_half, Arc::clone(&shared)));

        Self {
            vm_id,
            outbound,
            shared,
            next_id: AtomicU64::new(1),
            reader,
            writer,
        }
    }

    /// Run `task` in the worker and wait up to `timeout` for its result.
    pub async fn invoke(&self, task: Task, timeout: Duration) -> Result<Vec<u8>, InvokeError> {
        let vm_id = self.vm_id;
        if self.shared.is_closed() {
            return Err(InvokeError::Disconnected { vm_id });
        }

        let correlation_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(correlation_id, tx);
        let _guard = PendingGuard {
            shared: &self.shared,
            id: correlation_id,
        };

        // The reader may have closed between the check and the insert
        if self.shared.is_closed() {
            return Err(InvokeError::Disconnected { vm_id });
        }

        debug!(%vm_id, correlation_id, task = %task.name, "invoke");
        let frame = Frame::Invoke(Invoke {
            correlation_id,
            task,
        });
        if self.outbound.send(frame).is_err() {
            return Err(InvokeError::Disconnected { vm_id });
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(bytes))) => Ok(bytes),
            Ok(Ok(Err(error))) => Err(InvokeError::Remote { vm_id, error }),
            Ok(Err(_)) => Err(InvokeError::Disconnected { vm_id }),
            Err(_) => {
                debug!(%vm_id, correlation_id, "invoke timed out");
                Err(InvokeError::Timeout { vm_id, timeout })
            }
        }
    }

    /// Ask the worker to exit cleanly. Best effort.
    pub fn shutdown(&self) {
        if self.outbound.send(Frame::Shutdown).is_err() {
            debug!(vm_id = %self.vm_id, "shutdown on closed channel");
        }
    }

    /// True once the worker's side of the connection is gone.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Number of invocations waiting for a result.
    pub fn pending(&self) -> usize {
        self.shared.pending.len()
    }
}

impl Drop for WorkerChannel {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
        self.shared.close();
    }
}

async fn write_loop<W>(
    vm_id: VmId,
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    shared: Arc<Shared>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            warn!(%vm_id, error = %e, "write to worker failed");
            shared.close();
            return;
        }
    }
}

async fn read_loop<R>(vm_id: VmId, mut reader: R, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_frame::<_, Frame>(&mut reader).await {
            Ok(Some(Frame::InvokeResult(result))) => {
                match shared.pending.remove(&result.correlation_id) {
                    Some((_, tx)) => {
                        // A waiter that timed out after the remove is fine to miss
                        let _ = tx.send(result.outcome);
                    }
                    None => {
                        warn!(
                            %vm_id,
                            correlation_id = result.correlation_id,
                            "discarding result with no waiter"
                        );
                    }
                }
            }
            Ok(Some(other)) => {
                warn!(%vm_id, ?other, "unexpected frame from worker");
            }
            Ok(None) => {
                debug!(%vm_id, "worker closed connection");
                break;
            }
            Err(e) => {
                warn!(%vm_id, error = %e, "read from worker failed");
                break;
            }
        }
    }
    shared.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use dunit_types::{decode, encode, InvokeResult};
    use tokio::io::{duplex, DuplexStream};

    /// Reads one Invoke off the worker end.
    async fn next_invoke(worker: &mut DuplexStream) -> Invoke {
        match read_frame(worker).await.unwrap() {
            Some(Frame::Invoke(invoke)) => invoke,
            other => panic!("expected Invoke, got {:?}", other),
        }
    }

    async fn reply(worker: &mut DuplexStream, correlation_id: u64, outcome: Outcome) {
        let frame = Frame::InvokeResult(InvokeResult {
            correlation_id,
            outcome,
        });
        write_frame(worker, &frame).await.unwrap();
    }

    #[tokio::test]
    async fn result_is_routed_to_its_caller() {
        let (controller, mut worker) = duplex(64 * 1024);
        let channel = WorkerChannel::new(VmId::new(1), controller);

        let fake_worker = tokio::spawn(async move {
            let invoke = next_invoke(&mut worker).await;
            assert_eq!(invoke.task.name, "answer");
            reply(&mut worker, invoke.correlation_id, Ok(encode(&42u32).unwrap())).await;
            worker
        });

        let bytes = channel
            .invoke(Task::new("answer"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(decode::<u32>(&bytes).unwrap(), 42);
        assert_eq!(channel.pending(), 0);
        fake_worker.await.unwrap();
    }

    #[tokio::test]
    async fn remote_errors_keep_kind_and_message() {
        let (controller, mut worker) = duplex(64 * 1024);
        let channel = WorkerChannel::new(VmId::new(2), controller);

        tokio::spawn(async move {
            let invoke = next_invoke(&mut worker).await;
            reply(
                &mut worker,
                invoke.correlation_id,
                Err(RemoteError::task_failed("boom")),
            )
            .await;
            // keep the connection open until the test ends
            let _ = read_frame::<_, Frame>(&mut worker).await;
        });

        let err = channel
            .invoke(Task::new("fail"), Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            InvokeError::Remote { vm_id, error } => {
                assert_eq!(vm_id, VmId::new(2));
                assert_eq!(error.message, "boom");
                assert_eq!(error.kind, RemoteError::TASK_FAILED);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!channel.is_closed());
    }

    #[tokio::test]
    async fn late_result_after_timeout_is_discarded() {
        let (controller, mut worker) = duplex(64 * 1024);
        let channel = WorkerChannel::new(VmId::new(0), controller);

        let (slow_tx, slow_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let first = next_invoke(&mut worker).await;
            // Hold the first answer until the caller has given up
            let _ = slow_rx.await;
            reply(&mut worker, first.correlation_id, Ok(encode(&1u8).unwrap())).await;

            let second = next_invoke(&mut worker).await;
            reply(&mut worker, second.correlation_id, Ok(encode(&2u8).unwrap())).await;
            let _ = read_frame::<_, Frame>(&mut worker).await;
        });

        let err = channel
            .invoke(Task::new("slow"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Timeout { .. }));
        assert_eq!(channel.pending(), 0);
        slow_tx.send(()).unwrap();

        let bytes = channel
            .invoke(Task::new("fast"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(decode::<u8>(&bytes).unwrap(), 2);
    }

    #[tokio::test]
    async fn eof_fails_pending_and_later_calls() {
        let (controller, mut worker) = duplex(64 * 1024);
        let channel = WorkerChannel::new(VmId::new(3), controller);

        tokio::spawn(async move {
            let _ = next_invoke(&mut worker).await;
            drop(worker);
        });

        let err = channel
            .invoke(Task::new("never"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Disconnected { .. }));
        assert!(channel.is_closed());

        let err = channel
            .invoke(Task::new("again"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Disconnected { .. }));
    }

    #[tokio::test]
    async fn shutdown_frame_reaches_the_worker() {
        let (controller, mut worker) = duplex(64 * 1024);
        let channel = WorkerChannel::new(VmId::new(0), controller);

        channel.shutdown();
        let frame: Option<Frame> = read_frame(&mut worker).await.unwrap();
        assert_eq!(frame, Some(Frame::Shutdown));
    }
}
