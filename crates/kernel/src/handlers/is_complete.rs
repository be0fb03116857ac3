use std::sync::Arc;

use async_trait::async_trait;
use lantern_protocol::{content::IsCompleteReply, Content};
use tracing::{debug, warn};

use super::{EventObserver, HandlerError, RequestHandler};
use crate::{
    context::RequestContext,
    engine::{CommandKind, EventKind, ExecutionEngine, KernelCommand, KernelEvent},
    inflight::InFlightTable,
    status::StatusTracker,
};

/// Asks the engine to diagnose code without running it. The verdict arrives
/// as a complete/incomplete submission event and is answered by
/// [`EventObserver::observe`].
pub struct IsCompleteHandler {
    engine: Arc<dyn ExecutionEngine>,
    in_flight: Arc<InFlightTable>,
    status: Arc<StatusTracker>,
}

impl IsCompleteHandler {
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

    fn answer(&self, command: &KernelCommand, reply: IsCompleteReply) {
        let Some(context) = self.in_flight.try_remove(command) else {
            debug!(command = %command.id, "diagnosis already answered");
            return;
        };

        if let Err(e) = context.reply(reply) {
            warn!(error = %e, "could not send is_complete_reply");
        }
        self.status.set_idle(&context);
        context.complete();
    }
}

#[async_trait]
impl RequestHandler for IsCompleteHandler {
    fn name(&self) -> &'static str {
        "is_complete"
    }

    async fn handle(&self, context: RequestContext) -> Result<(), HandlerError> {
        let Content::IsCompleteRequest(request) = context.content() else {
            return Err(HandlerError::unexpected(self.name(), &context));
        };

        let command = KernelCommand::new(CommandKind::DiagnoseCode {
            code: request.code.clone(),
        });
        self.in_flight.put(command.clone(), context.clone());

        if let Err(e) = self.engine.send(command.clone()).await {
            warn!(error = %e, "diagnosis was not accepted");
            self.answer(&command, IsCompleteReply::unknown());
        }

        Ok(())
    }
}

impl EventObserver for IsCompleteHandler {
    fn observe(&self, event: &KernelEvent) {
        let Some(command) = &event.command else {
            return;
        };
        if !matches!(command.kind, CommandKind::DiagnoseCode { .. }) {
            return;
        }

        match &event.kind {
            EventKind::CompleteCodeSubmissionReceived { .. } => {
                self.answer(command, IsCompleteReply::complete())
            }
            EventKind::IncompleteCodeSubmissionReceived => {
                self.answer(command, IsCompleteReply::incomplete())
            }
            EventKind::CommandFailed { .. } => self.answer(command, IsCompleteReply::unknown()),
            _ => {}
        }
    }
}
