//! Multipart framing.
//!
//! ```text
//! [identity, ...] <IDS|MSG> signature header parent_header metadata content
//! ```

use bytes::Bytes;
use thiserror::Error;

use crate::{
    content::{self, JsonObject},
    Content, Header, Message, SignatureError, Signer,
};

/// Separates routing identities from the signed frames.
pub const DELIMITER: &[u8] = b"<IDS|MSG>";

const SIGNED_FRAMES: usize = 4;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("multipart message has no `<IDS|MSG>` delimiter")]
    MissingDelimiter,
    #[error("expected {expected} frames after the delimiter, found {found}")]
    MissingFrames { expected: usize, found: usize },
    #[error("signature frame is not valid utf-8")]
    InvalidUtf8,
    #[error("malformed {frame} frame: {source}")]
    Json {
        frame: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("message type `{0}` is not supported")]
    NotSupported(String),
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// How the codec treats a `msg_type` missing from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeMode {
    /// Fail with [`ProtocolError::NotSupported`]
    Strict,
    /// Decode the content as [`Content::Empty`]
    #[default]
    Permissive,
}

#[derive(Debug, Clone, Default)]
pub struct WireCodec {
    signer: Option<Signer>,
    mode: DecodeMode,
    verify: bool,
}

impl WireCodec {
    /// A codec that signs outgoing messages and, when `verify` is set, rejects
    /// inbound ones whose signature does not match.
    pub fn new(signer: Option<Signer>, mode: DecodeMode, verify: bool) -> Self {
        Self {
            signer,
            mode,
            verify,
        }
    }

    pub fn mode(&self) -> DecodeMode {
        self.mode
    }

    pub fn encode(&self, message: &Message) -> Result<Vec<Bytes>, ProtocolError> {
        let header = to_json("header", &message.header)?;
        let parent_header = match &message.parent_header {
            Some(parent) => to_json("parent_header", parent)?,
            None => b"{}".to_vec(),
        };
        let metadata = to_json("metadata", &message.metadata)?;
        let content = message
            .content
            .to_json()
            .map_err(|source| ProtocolError::Json {
                frame: "content",
                source,
            })?;

        let signature = match &self.signer {
            Some(signer) => signer.sign(&header, &parent_header, &metadata, &content)?,
            None => message.signature.clone(),
        };

        let mut frames = Vec::with_capacity(message.identities.len() + 2 + SIGNED_FRAMES);
        frames.extend(message.identities.iter().cloned());
        frames.push(Bytes::from_static(DELIMITER));
        frames.push(Bytes::from(signature));
        frames.push(Bytes::from(header));
        frames.push(Bytes::from(parent_header));
        frames.push(Bytes::from(metadata));
        frames.push(Bytes::from(content));

        Ok(frames)
    }

    pub fn decode(&self, mut frames: Vec<Bytes>) -> Result<Message, ProtocolError> {
        let delimiter = frames
            .iter()
            .position(|frame| frame.as_ref() == DELIMITER)
            .ok_or(ProtocolError::MissingDelimiter)?;

        let signed = frames.split_off(delimiter + 1);
        frames.truncate(delimiter);
        let identities = frames;

        // signature + header + parent + metadata + content; trailing buffers are ignored
        if signed.len() < SIGNED_FRAMES + 1 {
            return Err(ProtocolError::MissingFrames {
                expected: SIGNED_FRAMES + 1,
                found: signed.len(),
            });
        }

        let signature = std::str::from_utf8(&signed[0])
            .map_err(|_| ProtocolError::InvalidUtf8)?
            .to_string();
        let (header, parent_header, metadata, content) =
            (&signed[1], &signed[2], &signed[3], &signed[4]);

        if self.verify {
            if let Some(signer) = &self.signer {
                signer.verify(header, parent_header, metadata, content, &signature)?;
            }
        }

        let header: Header = from_json("header", header)?;
        let parent_header = decode_parent(parent_header)?;
        let metadata = if is_blank(metadata) {
            JsonObject::new()
        } else {
            from_json("metadata", metadata)?
        };
        let content = self.decode_content(&header.msg_type, content)?;

        Ok(Message {
            identities,
            signature,
            header,
            parent_header,
            metadata,
            content,
        })
    }

    fn decode_content(&self, msg_type: &str, json: &[u8]) -> Result<Content, ProtocolError> {
        let Some(parse) = content::parser_for(msg_type) else {
            return match self.mode {
                DecodeMode::Strict => Err(ProtocolError::NotSupported(msg_type.to_string())),
                DecodeMode::Permissive => Ok(Content::Empty),
            };
        };

        if is_blank(json) {
            return Ok(Content::Empty);
        }

        parse(json).map_err(|source| ProtocolError::Json {
            frame: "content",
            source,
        })
    }
}

fn decode_parent(json: &[u8]) -> Result<Option<Header>, ProtocolError> {
    if is_blank(json) {
        return Ok(None);
    }

    let value: serde_json::Value = from_json("parent_header", json)?;
    match value {
        serde_json::Value::Object(ref fields) if fields.is_empty() => Ok(None),
        value => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| ProtocolError::Json {
                frame: "parent_header",
                source,
            }),
    }
}

fn is_blank(json: &[u8]) -> bool {
    json.iter().all(u8::is_ascii_whitespace)
}

fn to_json<T: serde::Serialize>(frame: &'static str, value: &T) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(value).map_err(|source| ProtocolError::Json { frame, source })
}

fn from_json<'a, T: serde::Deserialize<'a>>(
    frame: &'static str,
    json: &'a [u8],
) -> Result<T, ProtocolError> {
    serde_json::from_slice(json).map_err(|source| ProtocolError::Json { frame, source })
}
