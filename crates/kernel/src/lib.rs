pub mod channel;
pub mod config;
pub mod context;
pub mod counter;
pub mod engine;
pub mod handlers;
pub mod heartbeat;
pub mod inflight;
pub mod kernel;
pub mod scheduler;
pub mod socket;
pub mod status;
mod transport;

use lantern_protocol::SignatureError;
use thiserror::Error;

pub use config::{ConnectionInfo, KernelConfig, KernelInfo};
pub use engine::{
    CommandKind, DisplayedValue, EngineError, EventKind, ExecutionEngine, FormattedValue,
    KernelCommand, KernelEvent,
};
pub use kernel::{launch, serve, KernelHandle, KernelSockets};
pub use socket::{FrameRecv, FrameSend, TransportError};

#[derive(Error, Debug)]
pub enum KernelError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("could not read connection file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid connection file: {0}")]
    Config(#[from] serde_json::Error),
}
