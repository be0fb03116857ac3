use std::sync::Arc;

use lantern_protocol::{
    content::{CommInfoReply, HistoryReply, InspectReply, JsonObject, ReplyStatus, ShutdownReply},
    Content, Message, WireCodec,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    channel::{BroadcastChannel, ChannelError, ChannelRole, ReplyChannel},
    config::KernelConfig,
    context::RequestContext,
    scheduler::CommandScheduler,
    socket::{back_off, FrameRecv, FrameSend, TransportError},
    status::StatusTracker,
};

/// State shared by the shell and control loops.
pub(crate) struct LoopShared {
    pub codec: Arc<WireCodec>,
    pub config: KernelConfig,
    pub status: Arc<StatusTracker>,
    pub scheduler: CommandScheduler,
    pub iopub: BroadcastChannel,
    pub shutdown: CancellationToken,
}

pub(crate) struct RequestLoop<T> {
    role: ChannelRole,
    transport: T,
    shared: Arc<LoopShared>,
    replies: ReplyChannel,
    outgoing: mpsc::UnboundedReceiver<Message>,
}

impl<T: FrameRecv + FrameSend> RequestLoop<T> {
    pub fn new(role: ChannelRole, transport: T, shared: Arc<LoopShared>) -> Self {
        let (sender, outgoing) = mpsc::unbounded_channel();
        let replies = ReplyChannel::new(role, &shared.config.session, sender);
        Self {
            role,
            transport,
            shared,
            replies,
            outgoing,
        }
    }

    pub async fn run(mut self) {
        info!(channel = %self.role, "listening");

        loop {
            let received = tokio::select! {
                _ = self.shared.shutdown.cancelled() => break,
                received = self.transport.recv() => received,
            };

            let frames = match received {
                Ok(frames) => frames,
                Err(TransportError::Closed) => break,
                Err(e) => {
                    warn!(channel = %self.role, error = %e, "receive failed");
                    back_off(&self.shared.shutdown).await;
                    continue;
                }
            };

            match self.shared.codec.decode(frames) {
                Ok(request) => self.serve(request).await,
                Err(e) => warn!(channel = %self.role, error = %e, "rejected inbound message"),
            }
        }

        info!(channel = %self.role, "stopped");
    }

    async fn serve(&mut self, request: Message) {
        debug!(
            channel = %self.role,
            msg_type = request.msg_type(),
            msg_id = request.msg_id(),
            "request received"
        );
        let shutting_down = matches!(request.content, Content::ShutdownRequest(_));
        let context =
            RequestContext::new(request, self.replies.clone(), self.shared.iopub.clone());

        // Only requests take part in the busy/idle bracket.
        let tracked = context.content().is_request();
        if tracked {
            self.shared.status.set_busy(&context);
        }
        if let Err(e) = self.route(&context) {
            warn!(channel = %self.role, error = %e, "could not answer request");
            context.complete();
        }
        self.flush_until_done(&context).await;
        if tracked {
            self.shared.status.set_idle(&context);
        }

        if shutting_down {
            info!("shutdown requested");
            self.shared.shutdown.cancel();
        }
    }

    /// Answers requests that need no engine; everything else goes to a handler.
    fn route(&self, context: &RequestContext) -> Result<(), ChannelError> {
        match context.content() {
            Content::KernelInfoRequest(_) => {
                context.reply(self.shared.config.kernel_info.reply())?;
            }
            Content::ShutdownRequest(request) => {
                context.reply(ShutdownReply {
                    status: ReplyStatus::Ok,
                    restart: request.restart,
                })?;
            }
            Content::HistoryRequest(_) => {
                context.reply(HistoryReply {
                    status: ReplyStatus::Ok,
                    history: Vec::new(),
                })?;
            }
            Content::InspectRequest(_) => {
                context.reply(InspectReply {
                    status: ReplyStatus::Ok,
                    found: false,
                    data: JsonObject::new(),
                    metadata: JsonObject::new(),
                })?;
            }
            Content::CommInfoRequest(_) => {
                context.reply(CommInfoReply {
                    status: ReplyStatus::Ok,
                    comms: JsonObject::new(),
                })?;
            }
            Content::CommOpen(_) | Content::CommMsg(_) | Content::CommClose(_) => {
                debug!(msg_type = context.request().msg_type(), "comms are not supported");
            }
            _ => {
                return match self.shared.scheduler.dispatch(context.clone()) {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        warn!(channel = %self.role, error = %e, "request dropped");
                        context.complete();
                        Ok(())
                    }
                };
            }
        }

        context.complete();
        Ok(())
    }

    /// Writes queued replies until `context` completes, then drains what is left.
    async fn flush_until_done(&mut self, context: &RequestContext) {
        loop {
            tokio::select! {
                biased;
                Some(message) = self.outgoing.recv() => self.write(message).await,
                _ = context.done() => break,
                _ = self.shared.shutdown.cancelled() => break,
            }
        }

        while let Ok(message) = self.outgoing.try_recv() {
            self.write(message).await;
        }
    }

    async fn write(&mut self, message: Message) {
        let frames = match self.shared.codec.encode(&message) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(channel = %self.role, msg_type = message.msg_type(), error = %e, "could not encode reply");
                return;
            }
        };

        if let Err(e) = self.transport.send(frames).await {
            warn!(channel = %self.role, msg_type = message.msg_type(), error = %e, "could not send reply");
        }
    }
}

/// Publishes everything queued on the iopub channel, in queue order.
pub(crate) async fn run_publisher<T: FrameSend>(
    mut transport: T,
    codec: Arc<WireCodec>,
    mut messages: mpsc::UnboundedReceiver<Message>,
    shutdown: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            Some(message) = messages.recv() => message,
            _ = shutdown.cancelled() => break,
        };
        publish(&mut transport, &codec, message).await;
    }

    while let Ok(message) = messages.try_recv() {
        publish(&mut transport, &codec, message).await;
    }
}

async fn publish<T: FrameSend>(transport: &mut T, codec: &WireCodec, message: Message) {
    match codec.encode(&message) {
        Ok(frames) => {
            if let Err(e) = transport.send(frames).await {
                warn!(msg_type = message.msg_type(), error = %e, "could not publish");
            }
        }
        Err(e) => warn!(msg_type = message.msg_type(), error = %e, "could not encode broadcast"),
    }
}

/// Keeps the stdin socket serviced. Input is never requested, so anything
/// arriving here is unsolicited and dropped.
pub(crate) async fn run_stdin<T: FrameRecv>(mut transport: T, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = transport.recv() => match received {
                Ok(frames) => debug!(frames = frames.len(), "dropping unsolicited stdin message"),
                Err(TransportError::Closed) => break,
                Err(e) => {
                    warn!(error = %e, "stdin receive failed");
                    back_off(&shutdown).await;
                }
            },
        }
    }
}
