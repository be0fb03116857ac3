#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use lantern_kernel::{
    CommandKind, DisplayedValue, EngineError, EventKind, ExecutionEngine, KernelCommand,
    KernelEvent,
};
use tokio::{sync::broadcast, time::sleep};
use tokio_util::sync::CancellationToken;

/// Engine double. Behaviour is picked from the submitted code:
/// - `buggy` fails with a compilation error
/// - `expensive_op` prints partial output, then runs until cancelled
/// - `print` writes `hello` to stdout
/// - `display` shows a value and then updates it in place
/// - `crash` takes the engine down, closing its event stream
/// - anything else returns `4`
///
/// Code ending in `;` or `}` is complete; completions are always `Write`/`WriteLine`.
/// Completing or diagnosing code that contains `buggy` fails.
pub struct MockEngine {
    events: Mutex<Option<broadcast::Sender<KernelEvent>>>,
    running: Mutex<Option<CancellationToken>>,
    received: Mutex<Vec<KernelCommand>>,
    offline: bool,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Self::build(false)
    }

    /// An engine that refuses every command.
    pub fn offline() -> Arc<Self> {
        Self::build(true)
    }

    fn build(offline: bool) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            events: Mutex::new(Some(events)),
            running: Mutex::new(None),
            received: Mutex::new(Vec::new()),
            offline,
        })
    }

    pub fn received(&self) -> Vec<KernelCommand> {
        self.received.lock().unwrap().clone()
    }

    /// Emits an event as if the engine produced it.
    pub fn emit(&self, event: KernelEvent) {
        if let Some(events) = self.sender() {
            let _ = events.send(event);
        }
    }

    fn sender(&self) -> Option<broadcast::Sender<KernelEvent>> {
        self.events.lock().unwrap().clone()
    }

    async fn execute(
        events: broadcast::Sender<KernelEvent>,
        command: KernelCommand,
        code: String,
        sigint: CancellationToken,
    ) {
        let emit = |kind| {
            let _ = events.send(KernelEvent::new(&command, kind));
        };

        emit(EventKind::CodeSubmissionReceived { code: code.clone() });

        if code.contains("buggy") {
            emit(EventKind::CommandFailed {
                name: Some("CompilationError".into()),
                message: "Syntax error".into(),
            });
        } else if code.contains("expensive_op") {
            emit(EventKind::StandardOutputValueProduced(DisplayedValue::plain(
                "Partial output...",
            )));

            // Only finishes if nobody interrupts within the test's lifetime
            tokio::select! {
                _ = sleep(Duration::from_secs(10)) => emit(EventKind::CommandHandled),
                _ = sigint.cancelled() => emit(EventKind::CommandFailed {
                    name: Some("OperationCanceled".into()),
                    message: "Command cancelled".into(),
                }),
            }
        } else if code.contains("print") {
            emit(EventKind::StandardOutputValueProduced(DisplayedValue::plain(
                "hello",
            )));
            emit(EventKind::CommandHandled);
        } else if code.contains("display") {
            let mut value = DisplayedValue::plain("0%");
            value.display_id = Some("progress".into());
            emit(EventKind::DisplayedValueProduced(value.clone()));

            value.formatted = DisplayedValue::plain("100%").formatted;
            emit(EventKind::DisplayedValueUpdated(value));
            emit(EventKind::CommandHandled);
        } else {
            emit(EventKind::ReturnValueProduced(DisplayedValue::plain("4")));
            emit(EventKind::CommandHandled);
        }
    }
}

#[async_trait]
impl ExecutionEngine for MockEngine {
    fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        match self.sender() {
            Some(events) => events.subscribe(),
            // Already closed: the sender is dropped right away.
            None => broadcast::channel(1).1,
        }
    }

    async fn send(&self, command: KernelCommand) -> Result<(), EngineError> {
        if self.offline {
            return Err(EngineError::Unavailable);
        }
        self.received.lock().unwrap().push(command.clone());

        let Some(events) = self.sender() else {
            return Err(EngineError::Unavailable);
        };
        match command.kind.clone() {
            CommandKind::SubmitCode { code } if code.contains("crash") => {
                drop(events);
                self.events.lock().unwrap().take();
            }
            CommandKind::SubmitCode { code } => {
                let sigint = CancellationToken::new();
                *self.running.lock().unwrap() = Some(sigint.clone());
                tokio::spawn(Self::execute(events, command, code, sigint));
            }
            CommandKind::RequestCompletions { code, .. } => {
                tokio::spawn(async move {
                    let kind = if code.contains("buggy") {
                        failure()
                    } else {
                        let matches = vec!["Write".to_string(), "WriteLine".to_string()];
                        EventKind::CompletionsProduced { matches }
                    };
                    let _ = events.send(KernelEvent::new(&command, kind));
                });
            }
            CommandKind::DiagnoseCode { code } => {
                tokio::spawn(async move {
                    let trimmed = code.trim_end();
                    let kind = if code.contains("buggy") {
                        failure()
                    } else if trimmed.ends_with(';') || trimmed.ends_with('}') {
                        EventKind::CompleteCodeSubmissionReceived { code }
                    } else {
                        EventKind::IncompleteCodeSubmissionReceived
                    };
                    let _ = events.send(KernelEvent::new(&command, kind));
                });
            }
            CommandKind::CancelCurrentCommand => {
                if let Some(sigint) = self.running.lock().unwrap().take() {
                    sigint.cancel();
                }
                tokio::spawn(async move {
                    let _ = events.send(KernelEvent::new(
                        &command,
                        EventKind::CurrentCommandCancelled,
                    ));
                });
            }
        }

        Ok(())
    }
}

fn failure() -> EventKind {
    EventKind::CommandFailed {
        name: Some("CompilationError".into()),
        message: "Syntax error".into(),
    }
}
