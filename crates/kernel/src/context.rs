use std::sync::Arc;

use lantern_protocol::{Content, Message};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::channel::{BroadcastChannel, ChannelError, ChannelRole, ReplyChannel};

/// Everything a handler needs to answer one inbound request.
///
/// Created by the loop that dequeued the request and alive until
/// [`RequestContext::complete`] is called. Clones share the same request and
/// completion signal.
#[derive(Debug, Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    token: Uuid,
    request: Message,
    reply: ReplyChannel,
    broadcast: BroadcastChannel,
    done: CancellationToken,
}

impl RequestContext {
    pub fn new(request: Message, reply: ReplyChannel, broadcast: BroadcastChannel) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: Uuid::new_v4(),
                request,
                reply,
                broadcast,
                done: CancellationToken::new(),
            }),
        }
    }

    /// Correlation token unique to this request.
    pub fn token(&self) -> Uuid {
        self.inner.token
    }

    pub fn request(&self) -> &Message {
        &self.inner.request
    }

    pub fn content(&self) -> &Content {
        &self.inner.request.content
    }

    pub fn role(&self) -> ChannelRole {
        self.inner.reply.role()
    }

    pub fn reply(&self, content: impl Into<Content>) -> Result<(), ChannelError> {
        self.inner.reply.send(content, self)
    }

    pub fn broadcast(&self, content: impl Into<Content>) -> Result<(), ChannelError> {
        self.inner.broadcast.send(content, self)
    }

    /// Marks the request handled. Idempotent.
    pub fn complete(&self) {
        self.inner.done.cancel();
    }

    pub fn is_complete(&self) -> bool {
        self.inner.done.is_cancelled()
    }

    /// Resolves once the request has been handled.
    pub async fn done(&self) {
        self.inner.done.cancelled().await
    }
}
