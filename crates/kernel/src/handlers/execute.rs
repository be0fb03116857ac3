use std::sync::Arc;

use async_trait::async_trait;
use lantern_protocol::{
    content::{
        DisplayData, ErrorContent, ExecuteInput, ExecuteReply, ExecuteResult, JsonObject, Stream,
        StreamName, Transient, UpdateDisplayData,
    },
    Content,
};
use tracing::debug;

use super::{next_event_for, HandlerError, RequestHandler};
use crate::{
    context::RequestContext,
    counter::ExecutionCounter,
    engine::{CommandKind, DisplayedValue, EventKind, ExecutionEngine, KernelCommand},
};

const ENGINE_UNAVAILABLE: &str = "EngineUnavailable";

pub struct ExecuteHandler {
    engine: Arc<dyn ExecutionEngine>,
    counter: Arc<ExecutionCounter>,
}

enum Outcome {
    Handled,
    Failed { name: String, message: String },
}

impl ExecuteHandler {
    pub fn new(engine: Arc<dyn ExecutionEngine>, counter: Arc<ExecutionCounter>) -> Self {
        Self { engine, counter }
    }

    /// Translates one engine event into broadcasts. Returns the outcome once
    /// the engine is done with the command.
    fn on_event(
        &self,
        kind: EventKind,
        context: &RequestContext,
        execution_count: u32,
        silent: bool,
    ) -> Result<Option<Outcome>, HandlerError> {
        let publish = |content: Content| -> Result<(), HandlerError> {
            if !silent {
                context.broadcast(content)?;
            }
            Ok(())
        };

        match kind {
            EventKind::DisplayedValueProduced(value) => publish(display_data(&value).into())?,
            EventKind::DisplayedValueUpdated(value) => {
                publish(
                    UpdateDisplayData {
                        data: value.to_mime_bundle(),
                        metadata: JsonObject::new(),
                        transient: transient(&value),
                    }
                    .into(),
                )?;
            }
            EventKind::ReturnValueProduced(value) => {
                publish(
                    ExecuteResult {
                        execution_count,
                        data: value.to_mime_bundle(),
                        metadata: JsonObject::new(),
                        transient: transient(&value),
                    }
                    .into(),
                )?;
            }
            EventKind::StandardOutputValueProduced(value) => {
                publish(display_data(&value).into())?;
                publish(
                    Stream {
                        name: StreamName::Stdout,
                        text: value.text(),
                    }
                    .into(),
                )?;
            }
            EventKind::StandardErrorValueProduced(value) => {
                publish(
                    Stream {
                        name: StreamName::Stderr,
                        text: value.text(),
                    }
                    .into(),
                )?;
            }
            EventKind::CommandHandled => return Ok(Some(Outcome::Handled)),
            EventKind::CommandFailed { name, message } => {
                return Ok(Some(Outcome::Failed {
                    name: name.unwrap_or_else(|| "Error".to_string()),
                    message,
                }));
            }
            other => debug!(event = ?other, "ignored by execute handler"),
        }

        Ok(None)
    }
}

#[async_trait]
impl RequestHandler for ExecuteHandler {
    fn name(&self) -> &'static str {
        "execute"
    }

    async fn handle(&self, context: RequestContext) -> Result<(), HandlerError> {
        let Content::ExecuteRequest(request) = context.content() else {
            return Err(HandlerError::unexpected(self.name(), &context));
        };
        let silent = request.silent;
        let code = request.code.clone();

        let execution_count = if silent {
            self.counter.current()
        } else {
            self.counter.increment()
        };

        if !silent {
            context.broadcast(ExecuteInput {
                code: code.clone(),
                execution_count,
            })?;
        }

        let command = KernelCommand::new(CommandKind::SubmitCode { code });
        // Subscribed before sending so no event of this command is missed;
        // dropped when this function returns, on every path.
        let mut events = self.engine.subscribe();

        let outcome = match self.engine.send(command.clone()).await {
            Err(e) => Outcome::Failed {
                name: ENGINE_UNAVAILABLE.to_string(),
                message: e.to_string(),
            },
            Ok(()) => loop {
                let Some(event) = next_event_for(&mut events, &command).await else {
                    break Outcome::Failed {
                        name: ENGINE_UNAVAILABLE.to_string(),
                        message: "execution engine stopped".to_string(),
                    };
                };

                if let Some(outcome) = self.on_event(event.kind, &context, execution_count, silent)? {
                    break outcome;
                }
            },
        };
        drop(events);

        match outcome {
            Outcome::Handled => context.reply(ExecuteReply::ok(execution_count))?,
            Outcome::Failed { name, message } => {
                let traceback: Vec<String> = message.lines().map(str::to_string).collect();
                if !silent {
                    context.broadcast(Stream {
                        name: StreamName::Stderr,
                        text: message.clone(),
                    })?;
                    context.broadcast(ErrorContent {
                        ename: name.clone(),
                        evalue: message.clone(),
                        traceback: traceback.clone(),
                    })?;
                }
                context.reply(ExecuteReply::Error {
                    execution_count,
                    ename: name,
                    evalue: message,
                    traceback,
                })?;
            }
        }

        context.complete();
        Ok(())
    }
}

fn transient(value: &DisplayedValue) -> Option<Transient> {
    value.display_id.as_ref().map(|display_id| Transient {
        display_id: display_id.clone(),
    })
}

fn display_data(value: &DisplayedValue) -> DisplayData {
    DisplayData {
        data: value.to_mime_bundle(),
        metadata: JsonObject::new(),
        transient: transient(value),
    }
}
