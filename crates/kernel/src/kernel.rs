use std::sync::Arc;

use lantern_protocol::{
    content::{ExecutionState, Status},
    WireCodec,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zeromq::{PubSocket, RepSocket, RouterSocket};

use crate::{
    channel::{BroadcastChannel, ChannelRole},
    config::{ConnectionInfo, KernelConfig},
    counter::ExecutionCounter,
    engine::ExecutionEngine,
    heartbeat::run_heartbeat,
    inflight::{run_eviction, InFlightTable},
    scheduler::CommandScheduler,
    socket::{FrameRecv, FrameSend, ZmqSocket},
    status::StatusTracker,
    transport::{run_publisher, run_stdin, LoopShared, RequestLoop},
    KernelError,
};

/// The transports a kernel serves.
pub struct KernelSockets<S, C, P, H> {
    pub shell: S,
    pub control: C,
    pub iopub: P,
    pub heartbeat: H,
}

pub struct KernelHandle {
    shutdown: CancellationToken,
    status: Arc<StatusTracker>,
    counter: Arc<ExecutionCounter>,
    tasks: Vec<JoinHandle<()>>,
}

impl KernelHandle {
    /// Stops every loop. Pending output is flushed first.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once shutdown has been requested, by a client or locally.
    pub async fn wait_for_shutdown(&self) {
        self.shutdown.cancelled().await
    }

    pub fn status(&self) -> ExecutionState {
        self.status.current()
    }

    pub async fn await_idle(&self) {
        self.status.await_idle().await
    }

    pub fn execution_count(&self) -> u32 {
        self.counter.current()
    }

    /// Waits until every loop has stopped.
    pub async fn wait(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "kernel task panicked");
            }
        }
    }
}

/// Starts a kernel over the given transports.
pub fn launch<S, C, P, H>(
    sockets: KernelSockets<S, C, P, H>,
    codec: WireCodec,
    config: KernelConfig,
    engine: Arc<dyn ExecutionEngine>,
) -> KernelHandle
where
    S: FrameRecv + FrameSend,
    C: FrameRecv + FrameSend,
    P: FrameSend,
    H: FrameRecv + FrameSend,
{
    let shutdown = CancellationToken::new();
    let codec = Arc::new(codec);
    let status = Arc::new(StatusTracker::new());
    let in_flight = Arc::new(InFlightTable::new());
    let counter = Arc::new(ExecutionCounter::new());

    let (iopub_sender, iopub_receiver) = mpsc::unbounded_channel();
    let iopub = BroadcastChannel::new(
        &config.identity,
        &config.session,
        &config.username,
        iopub_sender,
    );
    if let Err(e) = iopub.send_unparented(Status {
        execution_state: ExecutionState::Starting,
    }) {
        warn!(error = %e, "could not announce startup");
    }

    let scheduler = CommandScheduler::start(
        engine,
        status.clone(),
        in_flight.clone(),
        counter.clone(),
        shutdown.clone(),
    );

    let inflight_ttl = config.inflight_ttl;
    let shared = Arc::new(LoopShared {
        codec: codec.clone(),
        config,
        status: status.clone(),
        scheduler,
        iopub,
        shutdown: shutdown.clone(),
    });

    let tasks = vec![
        tokio::spawn(RequestLoop::new(ChannelRole::Shell, sockets.shell, shared.clone()).run()),
        tokio::spawn(RequestLoop::new(ChannelRole::Control, sockets.control, shared).run()),
        tokio::spawn(run_publisher(
            sockets.iopub,
            codec,
            iopub_receiver,
            shutdown.clone(),
        )),
        tokio::spawn(run_heartbeat(sockets.heartbeat, shutdown.clone())),
        tokio::spawn(run_eviction(in_flight, inflight_ttl, shutdown.clone())),
    ];

    KernelHandle {
        shutdown,
        status,
        counter,
        tasks,
    }
}

/// Binds the sockets named in `connection` and starts a kernel on them.
pub async fn serve(
    connection: &ConnectionInfo,
    config: KernelConfig,
    engine: Arc<dyn ExecutionEngine>,
) -> Result<KernelHandle, KernelError> {
    let codec = WireCodec::new(
        connection.signer()?,
        config.decode_mode,
        config.verify_signatures,
    );

    let sockets = KernelSockets {
        shell: ZmqSocket::<RouterSocket>::bind(&connection.endpoint(connection.shell_port)).await?,
        control: ZmqSocket::<RouterSocket>::bind(&connection.endpoint(connection.control_port))
            .await?,
        iopub: ZmqSocket::<PubSocket>::bind(&connection.endpoint(connection.iopub_port)).await?,
        heartbeat: ZmqSocket::<RepSocket>::bind(&connection.endpoint(connection.hb_port)).await?,
    };
    let stdin = ZmqSocket::<RouterSocket>::bind(&connection.endpoint(connection.stdin_port)).await?;

    info!(
        shell = connection.shell_port,
        control = connection.control_port,
        iopub = connection.iopub_port,
        stdin = connection.stdin_port,
        heartbeat = connection.hb_port,
        "kernel sockets bound"
    );

    let mut handle = launch(sockets, codec, config, engine);
    handle
        .tasks
        .push(tokio::spawn(run_stdin(stdin, handle.shutdown.clone())));

    Ok(handle)
}
