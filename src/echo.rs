use async_trait::async_trait;
use lantern_kernel::{
    CommandKind, DisplayedValue, EngineError, EventKind, ExecutionEngine, KernelCommand,
    KernelEvent,
};
use tokio::sync::broadcast;

/// Engine that hands submitted code straight back.
///
/// Each line starting with `print ` goes to stdout, and the last other line
/// becomes the return value. Code is complete once it ends in `;` or `}`.
pub struct EchoEngine {
    events: broadcast::Sender<KernelEvent>,
}

impl EchoEngine {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self { events }
    }

    fn emit(&self, command: &KernelCommand, kind: EventKind) {
        // Nobody listening is fine; the kernel subscribes before it sends.
        let _ = self.events.send(KernelEvent::new(command, kind));
    }

    fn run(&self, command: &KernelCommand, code: &str) {
        self.emit(
            command,
            EventKind::CodeSubmissionReceived {
                code: code.to_string(),
            },
        );

        let mut result = None;
        for line in code.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match line.strip_prefix("print ") {
                Some(text) => self.emit(
                    command,
                    EventKind::StandardOutputValueProduced(DisplayedValue::plain(format!(
                        "{text}\n"
                    ))),
                ),
                None => result = Some(line),
            }
        }

        if let Some(value) = result {
            self.emit(
                command,
                EventKind::ReturnValueProduced(DisplayedValue::plain(value)),
            );
        }
        self.emit(command, EventKind::CommandHandled);
    }
}

impl Default for EchoEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionEngine for EchoEngine {
    fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.events.subscribe()
    }

    async fn send(&self, command: KernelCommand) -> Result<(), EngineError> {
        match &command.kind {
            CommandKind::SubmitCode { code } => self.run(&command, code),
            CommandKind::RequestCompletions { .. } => self.emit(
                &command,
                EventKind::CompletionsProduced {
                    matches: Vec::new(),
                },
            ),
            CommandKind::DiagnoseCode { code } => {
                let trimmed = code.trim_end();
                let kind = if trimmed.is_empty() || trimmed.ends_with([';', '}']) {
                    EventKind::CompleteCodeSubmissionReceived { code: code.clone() }
                } else {
                    EventKind::IncompleteCodeSubmissionReceived
                };
                self.emit(&command, kind);
            }
            CommandKind::CancelCurrentCommand => {
                self.emit(&command, EventKind::CurrentCommandCancelled)
            }
        }
        Ok(())
    }
}
