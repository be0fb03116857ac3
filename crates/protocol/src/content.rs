//! Message payloads and the registry that maps a wire `msg_type` onto them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type JsonObject = serde_json::Map<String, Value>;

/// Parses a content frame into a concrete payload.
pub type ContentParser = fn(&[u8]) -> serde_json::Result<Content>;

/// Which side of the conversation a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    Request,
    Reply,
    Broadcast,
}

macro_rules! content_kinds {
    ($($variant:ident($payload:ty) => $msg_type:literal, $class:ident;)*) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum Content {
            $($variant($payload),)*
            /// Placeholder for unregistered types and blank content frames
            Empty,
        }

        /// Every registered wire type string.
        pub const MESSAGE_TYPES: &[&str] = &[$($msg_type),*];

        impl Content {
            /// The canonical wire type string. `Empty` has none.
            pub fn msg_type(&self) -> &'static str {
                match self {
                    $(Content::$variant(_) => $msg_type,)*
                    Content::Empty => "",
                }
            }

            pub fn class(&self) -> Option<ContentClass> {
                match self {
                    $(Content::$variant(_) => Some(ContentClass::$class),)*
                    Content::Empty => None,
                }
            }

            pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
                match self {
                    $(Content::$variant(payload) => serde_json::to_vec(payload),)*
                    Content::Empty => Ok(b"{}".to_vec()),
                }
            }
        }

        /// Looks up the parser registered for `msg_type`.
        pub fn parser_for(msg_type: &str) -> Option<ContentParser> {
            match msg_type {
                $($msg_type => Some(
                    (|json: &[u8]| serde_json::from_slice(json).map(Content::$variant)) as ContentParser
                ),)*
                _ => None,
            }
        }

        $(
            impl From<$payload> for Content {
                fn from(payload: $payload) -> Self {
                    Content::$variant(payload)
                }
            }
        )*
    };
}

content_kinds! {
    ExecuteRequest(ExecuteRequest) => "execute_request", Request;
    CompleteRequest(CompleteRequest) => "complete_request", Request;
    IsCompleteRequest(IsCompleteRequest) => "is_complete_request", Request;
    InterruptRequest(InterruptRequest) => "interrupt_request", Request;
    KernelInfoRequest(KernelInfoRequest) => "kernel_info_request", Request;
    ShutdownRequest(ShutdownRequest) => "shutdown_request", Request;
    HistoryRequest(HistoryRequest) => "history_request", Request;
    InspectRequest(InspectRequest) => "inspect_request", Request;
    CommInfoRequest(CommInfoRequest) => "comm_info_request", Request;
    CommOpen(CommOpen) => "comm_open", Request;
    CommMsg(CommMsg) => "comm_msg", Request;
    CommClose(CommClose) => "comm_close", Request;

    ExecuteReply(ExecuteReply) => "execute_reply", Reply;
    CompleteReply(CompleteReply) => "complete_reply", Reply;
    IsCompleteReply(IsCompleteReply) => "is_complete_reply", Reply;
    InterruptReply(InterruptReply) => "interrupt_reply", Reply;
    KernelInfoReply(KernelInfoReply) => "kernel_info_reply", Reply;
    ShutdownReply(ShutdownReply) => "shutdown_reply", Reply;
    HistoryReply(HistoryReply) => "history_reply", Reply;
    InspectReply(InspectReply) => "inspect_reply", Reply;
    CommInfoReply(CommInfoReply) => "comm_info_reply", Reply;

    Status(Status) => "status", Broadcast;
    Stream(Stream) => "stream", Broadcast;
    DisplayData(DisplayData) => "display_data", Broadcast;
    UpdateDisplayData(UpdateDisplayData) => "update_display_data", Broadcast;
    ExecuteInput(ExecuteInput) => "execute_input", Broadcast;
    ExecuteResult(ExecuteResult) => "execute_result", Broadcast;
    Error(ErrorContent) => "error", Broadcast;
}

impl Content {
    pub fn is_request(&self) -> bool {
        self.class() == Some(ContentClass::Request)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
    Aborted,
}

// Requests

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    #[serde(default)]
    pub silent: bool,
    #[serde(default = "default_true")]
    pub store_history: bool,
    #[serde(default)]
    pub user_expressions: JsonObject,
    #[serde(default)]
    pub allow_stdin: bool,
    #[serde(default = "default_true")]
    pub stop_on_error: bool,
}

impl ExecuteRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            silent: false,
            store_history: true,
            user_expressions: JsonObject::new(),
            allow_stdin: false,
            stop_on_error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteRequest {
    pub code: String,
    /// Cursor offset in unicode code points
    pub cursor_pos: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsCompleteRequest {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InterruptRequest {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KernelInfoRequest {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShutdownRequest {
    #[serde(default)]
    pub restart: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoryRequest {
    #[serde(default)]
    pub output: bool,
    #[serde(default)]
    pub raw: bool,
    #[serde(default)]
    pub hist_access_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectRequest {
    pub code: String,
    pub cursor_pos: usize,
    #[serde(default)]
    pub detail_level: u8,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommInfoRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommOpen {
    pub comm_id: String,
    pub target_name: String,
    #[serde(default)]
    pub data: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommMsg {
    pub comm_id: String,
    #[serde(default)]
    pub data: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommClose {
    pub comm_id: String,
    #[serde(default)]
    pub data: JsonObject,
}

// Replies

/// `execute_reply`, discriminated on the wire by its `status` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecuteReply {
    Ok {
        execution_count: u32,
        #[serde(default)]
        payload: Vec<Value>,
        #[serde(default)]
        user_expressions: JsonObject,
    },
    Error {
        execution_count: u32,
        ename: String,
        evalue: String,
        #[serde(default)]
        traceback: Vec<String>,
    },
}

impl ExecuteReply {
    pub fn ok(execution_count: u32) -> Self {
        ExecuteReply::Ok {
            execution_count,
            payload: Vec::new(),
            user_expressions: JsonObject::new(),
        }
    }

    pub fn error(execution_count: u32, ename: &str, evalue: &str) -> Self {
        ExecuteReply::Error {
            execution_count,
            ename: ename.to_string(),
            evalue: evalue.to_string(),
            traceback: Vec::new(),
        }
    }

    pub fn execution_count(&self) -> u32 {
        match self {
            ExecuteReply::Ok {
                execution_count, ..
            }
            | ExecuteReply::Error {
                execution_count, ..
            } => *execution_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteReply {
    pub matches: Vec<String>,
    pub cursor_start: usize,
    pub cursor_end: usize,
    pub status: ReplyStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsCompleteStatus {
    Complete,
    Incomplete,
    Invalid,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsCompleteReply {
    pub status: IsCompleteStatus,
    pub indent: String,
}

impl IsCompleteReply {
    pub fn complete() -> Self {
        Self {
            status: IsCompleteStatus::Complete,
            indent: String::new(),
        }
    }

    pub fn incomplete() -> Self {
        Self {
            status: IsCompleteStatus::Incomplete,
            indent: "*".to_string(),
        }
    }

    pub fn unknown() -> Self {
        Self {
            status: IsCompleteStatus::Unknown,
            indent: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptReply {
    pub status: ReplyStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub name: String,
    pub version: String,
    pub mimetype: String,
    pub file_extension: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelpLink {
    pub text: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelInfoReply {
    pub status: ReplyStatus,
    pub protocol_version: String,
    pub implementation: String,
    pub implementation_version: String,
    pub language_info: LanguageInfo,
    pub banner: String,
    #[serde(default)]
    pub help_links: Vec<HelpLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutdownReply {
    pub status: ReplyStatus,
    pub restart: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryReply {
    pub status: ReplyStatus,
    pub history: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectReply {
    pub status: ReplyStatus,
    pub found: bool,
    #[serde(default)]
    pub data: JsonObject,
    #[serde(default)]
    pub metadata: JsonObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommInfoReply {
    pub status: ReplyStatus,
    pub comms: JsonObject,
}

// Broadcasts

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Busy,
    Idle,
    Starting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub execution_state: ExecutionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub name: StreamName,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transient {
    pub display_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayData {
    /// Mime bundle, keyed by mime type
    pub data: JsonObject,
    #[serde(default)]
    pub metadata: JsonObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transient: Option<Transient>,
}

/// Same shape as `display_data`; `transient.display_id` names the output to replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateDisplayData {
    pub data: JsonObject,
    #[serde(default)]
    pub metadata: JsonObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transient: Option<Transient>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteInput {
    pub code: String,
    pub execution_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub execution_count: u32,
    pub data: JsonObject,
    #[serde(default)]
    pub metadata: JsonObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transient: Option<Transient>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContent {
    pub ename: String,
    pub evalue: String,
    pub traceback: Vec<String>,
}
