//! The seam between the protocol engine and whatever actually runs code.

use async_trait::async_trait;
use lantern_protocol::content::JsonObject;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

#[async_trait]
pub trait ExecutionEngine: Send + Sync + 'static {
    /// Subscribes to every event the engine emits from now on. Dropping the
    /// receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<KernelEvent>;

    /// Hands a command to the engine. Returns once the command is accepted;
    /// its outcome is reported through events.
    async fn send(&self, command: KernelCommand) -> Result<(), EngineError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("execution engine is not running")]
    Unavailable,
    #[error("execution engine rejected the command: {0}")]
    Rejected(String),
}

/// A command instance. Two commands are equal only if they are the same
/// instance, which is what correlation relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelCommand {
    pub id: Uuid,
    pub kind: CommandKind,
}

impl KernelCommand {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandKind {
    SubmitCode { code: String },
    RequestCompletions { code: String, cursor: usize },
    CancelCurrentCommand,
    /// Compile-check `code` without running it
    DiagnoseCode { code: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct KernelEvent {
    /// The command this event belongs to, if the engine could tell
    pub command: Option<KernelCommand>,
    pub kind: EventKind,
}

impl KernelEvent {
    pub fn new(command: &KernelCommand, kind: EventKind) -> Self {
        Self {
            command: Some(command.clone()),
            kind,
        }
    }

    pub fn belongs_to(&self, command: &KernelCommand) -> bool {
        self.command.as_ref() == Some(command)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    CodeSubmissionReceived { code: String },
    DisplayedValueProduced(DisplayedValue),
    DisplayedValueUpdated(DisplayedValue),
    ReturnValueProduced(DisplayedValue),
    StandardOutputValueProduced(DisplayedValue),
    StandardErrorValueProduced(DisplayedValue),
    CommandHandled,
    CommandFailed {
        /// Exception or diagnostic class, e.g. `CompilationError`
        name: Option<String>,
        message: String,
    },
    CompletionsProduced { matches: Vec<String> },
    CompleteCodeSubmissionReceived { code: String },
    IncompleteCodeSubmissionReceived,
    CurrentCommandCancelled,
}

/// One value rendered in one or more mime types.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedValue {
    pub formatted: Vec<FormattedValue>,
    /// Set when the value can later be replaced in place
    pub display_id: Option<String>,
}

impl DisplayedValue {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            formatted: vec![FormattedValue::plain(text)],
            display_id: None,
        }
    }

    /// Mime bundle for `display_data`/`execute_result`.
    pub fn to_mime_bundle(&self) -> JsonObject {
        self.formatted
            .iter()
            .map(|value| {
                (
                    value.mime_type.clone(),
                    serde_json::Value::String(value.value.clone()),
                )
            })
            .collect()
    }

    /// Text for stream output; prefers `text/plain`.
    pub fn text(&self) -> String {
        self.formatted
            .iter()
            .find(|value| value.mime_type == FormattedValue::PLAIN)
            .or_else(|| self.formatted.first())
            .map(|value| value.value.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormattedValue {
    pub mime_type: String,
    pub value: String,
}

impl FormattedValue {
    pub const PLAIN: &'static str = "text/plain";

    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            mime_type: Self::PLAIN.to_string(),
            value: value.into(),
        }
    }

    pub fn new(mime_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;

    #[googletest::test]
    fn commands_with_same_payload_are_distinct() {
        let first = KernelCommand::new(CommandKind::CancelCurrentCommand);
        let second = KernelCommand::new(CommandKind::CancelCurrentCommand);

        expect_that!(first == second, eq(false));
        expect_that!(first == first.clone(), eq(true));
    }

    #[googletest::test]
    fn stream_text_prefers_plain_text() {
        let value = DisplayedValue {
            formatted: vec![
                FormattedValue::new("text/html", "<b>4</b>"),
                FormattedValue::plain("4"),
            ],
            display_id: None,
        };

        expect_that!(value.text(), eq("4"));
        expect_that!(value.to_mime_bundle().len(), eq(2));
    }
}
