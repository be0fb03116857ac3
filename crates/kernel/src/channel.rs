use bytes::Bytes;
use lantern_protocol::{Content, Message};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::context::RequestContext;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("`{0}` is not a request; cannot answer it")]
    NotARequest(String),
    #[error("no broadcast topic for `{0}`")]
    UnsupportedTopic(String),
    #[error("channel is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Shell,
    Control,
}

impl std::fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelRole::Shell => write!(f, "shell"),
            ChannelRole::Control => write!(f, "control"),
        }
    }
}

/// Point-to-point answers to a request. The control role has the same shape
/// as the shell one but is drained by its own loop, so interrupts are never
/// queued behind execution traffic.
#[derive(Debug, Clone)]
pub struct ReplyChannel {
    role: ChannelRole,
    session: String,
    sender: mpsc::UnboundedSender<Message>,
}

impl ReplyChannel {
    pub fn new(role: ChannelRole, session: &str, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            role,
            session: session.to_string(),
            sender,
        }
    }

    pub fn role(&self) -> ChannelRole {
        self.role
    }

    pub fn send(
        &self,
        content: impl Into<Content>,
        context: &RequestContext,
    ) -> Result<(), ChannelError> {
        let message = self.build(content.into(), context.request())?;
        self.sender.send(message).map_err(|_| ChannelError::Closed)
    }

    fn build(&self, content: Content, request: &Message) -> Result<Message, ChannelError> {
        if !request.content.is_request() {
            return Err(ChannelError::NotARequest(request.msg_type().to_string()));
        }

        let mut reply = Message::child_of(request, content, &self.session);
        reply.identities = request.identities.clone();
        Ok(reply)
    }
}

/// One-to-many output, published on the iopub socket under a topic.
#[derive(Debug, Clone)]
pub struct BroadcastChannel {
    identity: String,
    session: String,
    username: String,
    sender: mpsc::UnboundedSender<Message>,
}

impl BroadcastChannel {
    pub fn new(
        identity: &str,
        session: &str,
        username: &str,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            identity: identity.to_string(),
            session: session.to_string(),
            username: username.to_string(),
            sender,
        }
    }

    pub fn send(
        &self,
        content: impl Into<Content>,
        context: &RequestContext,
    ) -> Result<(), ChannelError> {
        let request = context.request();
        if !request.content.is_request() {
            return Err(ChannelError::NotARequest(request.msg_type().to_string()));
        }

        let content = content.into();
        let topic = topic_for(&content, &self.identity)?;
        let message = Message::child_of(request, content, &self.session)
            .with_identities(vec![Bytes::from(topic)]);

        self.sender.send(message).map_err(|_| ChannelError::Closed)
    }

    /// Publishes with no parent, e.g. the `starting` status at launch.
    pub fn send_unparented(&self, content: impl Into<Content>) -> Result<(), ChannelError> {
        let content = content.into();
        let topic = topic_for(&content, &self.identity)?;
        let message = Message::new(content, &self.session, &self.username)
            .with_identities(vec![Bytes::from(topic)]);

        self.sender.send(message).map_err(|_| ChannelError::Closed)
    }
}

/// Routing topic for a broadcast. Result-bearing content uses a fixed topic;
/// everything else is scoped to the kernel identity.
pub fn topic_for(content: &Content, identity: &str) -> Result<String, ChannelError> {
    match content {
        Content::DisplayData(_) | Content::UpdateDisplayData(_) | Content::ExecuteResult(_) => {
            Ok(content.msg_type().to_string())
        }
        Content::Status(_) | Content::ExecuteInput(_) | Content::Stream(_) | Content::Error(_) => {
            Ok(format!("kernel.{identity}.{}", content.msg_type()))
        }
        other => Err(ChannelError::UnsupportedTopic(other.msg_type().to_string())),
    }
}
