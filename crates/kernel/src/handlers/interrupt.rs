use std::sync::Arc;

use async_trait::async_trait;
use lantern_protocol::{
    content::{InterruptReply, ReplyStatus},
    Content,
};
use tracing::{debug, info, warn};

use super::{EventObserver, HandlerError, RequestHandler};
use crate::{
    context::RequestContext,
    engine::{CommandKind, EventKind, ExecutionEngine, KernelCommand, KernelEvent},
    inflight::InFlightTable,
    status::StatusTracker,
};

/// Cooperative cancellation: asks the engine to cancel whatever it is running
/// and acknowledges once the engine confirms. Nothing is forcibly stopped here.
pub struct InterruptHandler {
    engine: Arc<dyn ExecutionEngine>,
    in_flight: Arc<InFlightTable>,
    status: Arc<StatusTracker>,
}

impl InterruptHandler {
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        in_flight: Arc<InFlightTable>,
        status: Arc<StatusTracker>,
    ) -> Self {
        Self {
            engine,
            in_flight,
            status,
        }
    }

    fn answer(&self, command: &KernelCommand, status: ReplyStatus) {
        let Some(context) = self.in_flight.try_remove(command) else {
            debug!(command = %command.id, "interrupt already answered");
            return;
        };

        if let Err(e) = context.reply(InterruptReply { status }) {
            warn!(error = %e, "could not send interrupt_reply");
        }
        self.status.set_idle(&context);
        context.complete();
    }
}

#[async_trait]
impl RequestHandler for InterruptHandler {
    fn name(&self) -> &'static str {
        "interrupt"
    }

    async fn handle(&self, context: RequestContext) -> Result<(), HandlerError> {
        if !matches!(context.content(), Content::InterruptRequest(_)) {
            return Err(HandlerError::unexpected(self.name(), &context));
        }

        self.status.set_busy(&context);
        let command = KernelCommand::new(CommandKind::CancelCurrentCommand);
        self.in_flight.put(command.clone(), context.clone());
        info!(command = %command.id, "interrupt requested");

        if let Err(e) = self.engine.send(command.clone()).await {
            warn!(error = %e, "cancellation was not accepted");
            self.answer(&command, ReplyStatus::Error);
        }

        Ok(())
    }
}

impl EventObserver for InterruptHandler {
    fn observe(&self, event: &KernelEvent) {
        let Some(command) = &event.command else {
            return;
        };
        if command.kind != CommandKind::CancelCurrentCommand {
            return;
        }

        match event.kind {
            EventKind::CurrentCommandCancelled => self.answer(command, ReplyStatus::Ok),
            EventKind::CommandFailed { .. } => self.answer(command, ReplyStatus::Error),
            _ => {}
        }
    }
}
