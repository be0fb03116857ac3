use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use zeromq::{Socket, SocketRecv, SocketSend, ZmqError, ZmqMessage};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Zmq(#[from] ZmqError),
    #[error("refusing to send a message without frames")]
    EmptyMessage,
    #[error("transport is closed")]
    Closed,
}

/// Pause after a failed receive before polling the socket again.
pub const RECV_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Waits out [`RECV_RETRY_DELAY`], or less if shutdown is requested.
pub(crate) async fn back_off(shutdown: &CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = sleep(RECV_RETRY_DELAY) => {}
    }
}

#[async_trait]
pub trait FrameRecv: Send + 'static {
    async fn recv(&mut self) -> Result<Vec<Bytes>, TransportError>;
}

#[async_trait]
pub trait FrameSend: Send + 'static {
    async fn send(&mut self, frames: Vec<Bytes>) -> Result<(), TransportError>;
}

/// A bound ZeroMQ socket.
pub struct ZmqSocket<S> {
    socket: S,
}

impl<S: Socket> ZmqSocket<S> {
    pub async fn bind(endpoint: &str) -> Result<Self, TransportError> {
        let mut socket = S::new();
        socket.bind(endpoint).await?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl<S: SocketRecv + Send + 'static> FrameRecv for ZmqSocket<S> {
    async fn recv(&mut self) -> Result<Vec<Bytes>, TransportError> {
        let message = self.socket.recv().await?;
        Ok(message.into_vec())
    }
}

#[async_trait]
impl<S: SocketSend + Send + 'static> FrameSend for ZmqSocket<S> {
    async fn send(&mut self, frames: Vec<Bytes>) -> Result<(), TransportError> {
        let message = ZmqMessage::try_from(frames).map_err(|_| TransportError::EmptyMessage)?;
        self.socket.send(message).await?;
        Ok(())
    }
}
