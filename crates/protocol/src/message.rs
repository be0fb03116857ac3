use bytes::Bytes;

use crate::{content::JsonObject, Content, Header};

/// One decoded wire message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Routing frames preceding the delimiter. Replies echo the request's
    /// identities; broadcasts carry a single topic frame.
    pub identities: Vec<Bytes>,
    /// Hex digest as received, or as computed by the last encode
    pub signature: String,
    pub header: Header,
    pub parent_header: Option<Header>,
    pub metadata: JsonObject,
    pub content: Content,
}

impl Message {
    /// A fresh message with no parent and no routing frames.
    pub fn new(content: impl Into<Content>, session: &str, username: &str) -> Self {
        let content = content.into();
        Self {
            identities: Vec::new(),
            signature: String::new(),
            header: Header::new(content.msg_type(), session, username),
            parent_header: None,
            metadata: JsonObject::new(),
            content,
        }
    }

    /// A message answering or continuing `parent`.
    pub fn child_of(parent: &Message, content: impl Into<Content>, session: &str) -> Self {
        let mut message = Self::new(content, session, &parent.header.username);
        message.parent_header = Some(parent.header.clone());
        message
    }

    pub fn with_identities(mut self, identities: Vec<Bytes>) -> Self {
        self.identities = identities;
        self
    }

    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }

    pub fn msg_id(&self) -> &str {
        &self.header.msg_id
    }

    /// Whether this message was produced in response to `request`.
    pub fn is_child_of(&self, request: &Message) -> bool {
        self.parent_header
            .as_ref()
            .is_some_and(|parent| parent.msg_id == request.header.msg_id)
    }
}
