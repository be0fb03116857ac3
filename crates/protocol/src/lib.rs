pub mod content;
pub mod header;
pub mod message;
pub mod signature;
pub mod wire;

pub use content::Content;
pub use header::Header;
pub use message::Message;
pub use signature::{SignatureError, SignatureScheme, Signer};
pub use wire::{DecodeMode, ProtocolError, WireCodec, DELIMITER};

/// Messaging protocol version announced in every header we emit.
pub const PROTOCOL_VERSION: &str = "5.3";
