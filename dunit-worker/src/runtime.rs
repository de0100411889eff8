//! Worker main loop.

use dunit_core::{bootstrap, DUnitEnv};
use dunit_types::{
    read_frame, write_frame, Frame, Hello, Invoke, InvokeResult, Member, PropertyMap,
};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::{locator_client, TaskContext, TaskRegistry, WorkerArgs, WorkerBackend, WorkerError};

/// Why [`serve`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeExit {
    /// The controller sent `Shutdown`.
    ShutdownRequested,
    /// The controller closed the connection.
    ControllerClosed,
}

/// Serve invocations on an established controller connection.
///
/// Invocations run one at a time on the blocking pool, in arrival order.
/// Each result goes back under the invocation's correlation id.
pub async fn serve<S>(
    mut stream: S,
    registry: Arc<TaskRegistry>,
    ctx: TaskContext,
) -> Result<ServeExit, WorkerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame: Frame = match read_frame(&mut stream).await? {
            Some(frame) => frame,
            None => {
                debug!("controller closed connection");
                return Ok(ServeExit::ControllerClosed);
            }
        };

        match frame {
            Frame::Invoke(Invoke {
                correlation_id,
                task,
            }) => {
                debug!(correlation_id, task = %task.name, "invoke");
                let registry = Arc::clone(&registry);
                let task_ctx = ctx.clone();
                let outcome =
                    tokio::task::spawn_blocking(move || registry.dispatch(&task_ctx, &task))
                        .await
                        .map_err(|e| WorkerError::Runner(e.to_string()))?;

                if let Err(err) = &outcome {
                    debug!(correlation_id, error = %err, "task failed");
                }

                let reply = Frame::InvokeResult(InvokeResult {
                    correlation_id,
                    outcome,
                });
                write_frame(&mut stream, &reply).await?;
            }
            Frame::Shutdown => {
                info!("shutdown requested");
                return Ok(ServeExit::ShutdownRequested);
            }
            other => {
                warn!(?other, "ignoring unexpected frame");
            }
        }
    }
}

/// Run a worker to completion.
///
/// Installs the process environment and logging, registers with the
/// locator, dials the controller, sends `Hello` and serves until shutdown.
/// A locator that cannot be reached is logged and otherwise ignored.
pub async fn run(args: WorkerArgs, registry: TaskRegistry) -> Result<ServeExit, WorkerError> {
    let vm_id = args.vm_id();
    let backend = WorkerBackend::new(
        vm_id,
        args.working_dir.clone(),
        args.locator.clone(),
        args.properties.clone().unwrap_or_default(),
    );
    let env = DUnitEnv::from_backend(backend);
    env.init_logging(PropertyMap::new());
    bootstrap::install(env.clone())?;

    info!(
        %vm_id,
        pid = env.pid().get(),
        working_dir = %args.working_dir.display(),
        "worker starting"
    );

    if let Some(locator) = &args.locator {
        let member = Member {
            vm_id,
            pid: env.pid(),
        };
        if let Err(e) = locator_client::register(locator, member).await {
            warn!(%locator, error = %e, "locator registration failed");
        }
    }

    let mut stream = TcpStream::connect(&args.controller)
        .await
        .map_err(|source| WorkerError::Connect {
            address: args.controller.clone(),
            source,
        })?;
    stream.set_nodelay(true)?;

    write_frame(&mut stream, &Frame::Hello(Hello::new(vm_id))).await?;
    debug!(controller = %args.controller, "hello sent");

    let ctx = TaskContext::new(env, args.working_dir);
    let exit = serve(stream, Arc::new(registry), ctx).await?;
    info!(?exit, "worker stopping");
    Ok(exit)
}
