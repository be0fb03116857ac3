use std::sync::Arc;

use lantern_protocol::Content;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    context::RequestContext,
    counter::ExecutionCounter,
    engine::ExecutionEngine,
    handlers::{
        spawn_observer, spawn_worker, CompleteHandler, ExecuteHandler, InterruptHandler,
        IsCompleteHandler,
    },
    inflight::InFlightTable,
    status::StatusTracker,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no handler for `{0}`")]
    NoHandler(String),
    #[error("{0} worker has stopped")]
    Stopped(&'static str),
}

/// Routes request contexts to the worker of their handler.
#[derive(Debug, Clone)]
pub struct CommandScheduler {
    execute: mpsc::UnboundedSender<RequestContext>,
    complete: mpsc::UnboundedSender<RequestContext>,
    is_complete: mpsc::UnboundedSender<RequestContext>,
    interrupt: mpsc::UnboundedSender<RequestContext>,
}

impl CommandScheduler {
    /// Spawns one worker per handler, plus the observers answering parked
    /// requests. Observers subscribe here, before any command can be issued.
    pub fn start(
        engine: Arc<dyn ExecutionEngine>,
        status: Arc<StatusTracker>,
        in_flight: Arc<InFlightTable>,
        counter: Arc<ExecutionCounter>,
        shutdown: CancellationToken,
    ) -> Self {
        let is_complete = Arc::new(IsCompleteHandler::new(
            engine.clone(),
            in_flight.clone(),
            status.clone(),
        ));
        let interrupt = Arc::new(InterruptHandler::new(engine.clone(), in_flight, status));
        spawn_observer(is_complete.clone(), engine.subscribe(), shutdown.clone());
        spawn_observer(interrupt.clone(), engine.subscribe(), shutdown);

        Self {
            execute: spawn_worker(Arc::new(ExecuteHandler::new(engine.clone(), counter))),
            complete: spawn_worker(Arc::new(CompleteHandler::new(engine))),
            is_complete: spawn_worker(is_complete),
            interrupt: spawn_worker(interrupt),
        }
    }

    pub fn dispatch(&self, context: RequestContext) -> Result<(), DispatchError> {
        let (queue, name) = match context.content() {
            Content::ExecuteRequest(_) => (&self.execute, "execute"),
            Content::CompleteRequest(_) => (&self.complete, "complete"),
            Content::IsCompleteRequest(_) => (&self.is_complete, "is_complete"),
            Content::InterruptRequest(_) => (&self.interrupt, "interrupt"),
            _ => {
                return Err(DispatchError::NoHandler(
                    context.request().msg_type().to_string(),
                ))
            }
        };

        queue.send(context).map_err(|_| DispatchError::Stopped(name))
    }
}
