//! Request handlers, one per kind of wire request.

pub mod complete;
pub mod execute;
pub mod interrupt;
pub mod is_complete;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    channel::ChannelError,
    context::RequestContext,
    engine::{EngineError, KernelEvent},
};

pub use complete::CompleteHandler;
pub use execute::ExecuteHandler;
pub use interrupt::InterruptHandler;
pub use is_complete::IsCompleteHandler;

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{handler} handler received `{msg_type}`")]
    UnexpectedContent {
        handler: &'static str,
        msg_type: String,
    },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl HandlerError {
    pub(crate) fn unexpected(handler: &'static str, context: &RequestContext) -> Self {
        HandlerError::UnexpectedContent {
            handler,
            msg_type: context.request().msg_type().to_string(),
        }
    }
}

#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Starts answering `context`. The handler completes the context once
    /// its last message has been queued, which may be after this returns.
    async fn handle(&self, context: RequestContext) -> Result<(), HandlerError>;
}

/// Answers parked requests from the shared engine event stream.
pub trait EventObserver: Send + Sync + 'static {
    fn observe(&self, event: &KernelEvent);
}

/// Spawns the worker owning `handler` and returns its queue.
///
/// A failing request is logged and completed; it never stops the worker.
pub fn spawn_worker<H: RequestHandler>(handler: Arc<H>) -> mpsc::UnboundedSender<RequestContext> {
    let (sender, mut receiver) = mpsc::unbounded_channel::<RequestContext>();

    tokio::spawn(async move {
        while let Some(context) = receiver.recv().await {
            if let Err(e) = handler.handle(context.clone()).await {
                error!(
                    handler = handler.name(),
                    msg_id = context.request().msg_id(),
                    error = %e,
                    "request failed"
                );
                context.complete();
            }
        }
        debug!(handler = handler.name(), "worker stopped");
    });

    sender
}

/// Feeds every engine event to `observer` until shutdown or until the engine
/// closes its stream.
pub fn spawn_observer<O: EventObserver>(
    observer: Arc<O>,
    mut events: broadcast::Receiver<KernelEvent>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Ok(event) => observer.observe(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event observer fell behind the engine");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Receives the next event caused by `command`. `None` once the engine has
/// gone away.
pub(crate) async fn next_event_for(
    events: &mut broadcast::Receiver<KernelEvent>,
    command: &crate::engine::KernelCommand,
) -> Option<KernelEvent> {
    loop {
        match events.recv().await {
            Ok(event) if event.belongs_to(command) => return Some(event),
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, command = %command.id, "dropped engine events");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
