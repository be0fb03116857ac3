#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use lantern_kernel::{
    launch, ExecutionEngine, FrameRecv, FrameSend, KernelConfig, KernelHandle, KernelSockets,
    TransportError,
};
use lantern_protocol::{
    content::{ExecutionState, Status},
    Content, DecodeMode, Message, SignatureScheme, Signer, WireCodec,
};
use tokio::{sync::mpsc, time::timeout};

pub const KEY: &str = "a0436f6c-1916-498b-8eb9-e81ab9368e84";
pub const IDENTITY: &str = "test-kernel";
const WAIT: Duration = Duration::from_secs(5);

/// Kernel side of an in-memory socket.
pub struct MemorySocket {
    inbound: mpsc::UnboundedReceiver<Vec<Bytes>>,
    outbound: mpsc::UnboundedSender<Vec<Bytes>>,
}

#[async_trait]
impl FrameRecv for MemorySocket {
    async fn recv(&mut self) -> Result<Vec<Bytes>, TransportError> {
        self.inbound.recv().await.ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl FrameSend for MemorySocket {
    async fn send(&mut self, frames: Vec<Bytes>) -> Result<(), TransportError> {
        self.outbound.send(frames).map_err(|_| TransportError::Closed)
    }
}

/// Front-end side of an in-memory socket.
pub struct Peer {
    pub to_kernel: mpsc::UnboundedSender<Vec<Bytes>>,
    pub from_kernel: mpsc::UnboundedReceiver<Vec<Bytes>>,
}

impl Peer {
    pub async fn recv_frames(&mut self) -> Vec<Bytes> {
        timeout(WAIT, self.from_kernel.recv())
            .await
            .expect("timed out waiting for the kernel")
            .expect("kernel closed the socket")
    }
}

pub fn socket_pair() -> (MemorySocket, Peer) {
    let (to_kernel, inbound) = mpsc::unbounded_channel();
    let (outbound, from_kernel) = mpsc::unbounded_channel();
    (
        MemorySocket { inbound, outbound },
        Peer {
            to_kernel,
            from_kernel,
        },
    )
}

pub fn codec() -> WireCodec {
    codec_with(DecodeMode::Strict)
}

pub fn codec_with(mode: DecodeMode) -> WireCodec {
    WireCodec::new(
        Some(Signer::new(SignatureScheme::HmacSha256, KEY)),
        mode,
        true,
    )
}

pub fn config() -> KernelConfig {
    KernelConfig {
        identity: IDENTITY.to_string(),
        ..KernelConfig::default()
    }
}

/// A running kernel wired to in-memory sockets, seen from the front-end.
pub struct TestKernel {
    pub handle: KernelHandle,
    pub shell: Peer,
    pub control: Peer,
    pub iopub: Peer,
    pub heartbeat: Peer,
    pub codec: WireCodec,
}

impl TestKernel {
    pub fn start(engine: Arc<dyn ExecutionEngine>) -> Self {
        Self::start_with(engine, config())
    }

    /// A kernel that accepts message types it has no content for.
    pub fn start_permissive(engine: Arc<dyn ExecutionEngine>) -> Self {
        Self::start_on(engine, config(), codec_with(DecodeMode::Permissive))
    }

    pub fn start_with(engine: Arc<dyn ExecutionEngine>, config: KernelConfig) -> Self {
        Self::start_on(engine, config, codec())
    }

    fn start_on(
        engine: Arc<dyn ExecutionEngine>,
        config: KernelConfig,
        kernel_codec: WireCodec,
    ) -> Self {
        let (shell, shell_peer) = socket_pair();
        let (control, control_peer) = socket_pair();
        let (iopub, iopub_peer) = socket_pair();
        let (heartbeat, heartbeat_peer) = socket_pair();

        let handle = launch(
            KernelSockets {
                shell,
                control,
                iopub,
                heartbeat,
            },
            kernel_codec,
            config,
            engine,
        );

        Self {
            handle,
            shell: shell_peer,
            control: control_peer,
            iopub: iopub_peer,
            heartbeat: heartbeat_peer,
            codec: codec(),
        }
    }

    pub fn request(&self, content: impl Into<Content>) -> Message {
        Message::new(content, "client-session", "tester")
            .with_identities(vec![Bytes::from_static(b"client-1")])
    }

    pub fn send_shell(&self, content: impl Into<Content>) -> Message {
        let request = self.request(content);
        self.shell
            .to_kernel
            .send(self.codec.encode(&request).unwrap())
            .unwrap();
        request
    }

    pub fn send_control(&self, content: impl Into<Content>) -> Message {
        let request = self.request(content);
        self.control
            .to_kernel
            .send(self.codec.encode(&request).unwrap())
            .unwrap();
        request
    }

    pub async fn recv_shell(&mut self) -> Message {
        let frames = self.shell.recv_frames().await;
        self.codec.decode(frames).unwrap()
    }

    pub async fn recv_control(&mut self) -> Message {
        let frames = self.control.recv_frames().await;
        self.codec.decode(frames).unwrap()
    }

    pub async fn recv_iopub(&mut self) -> Message {
        let frames = self.iopub.recv_frames().await;
        self.codec.decode(frames).unwrap()
    }

    /// Broadcasts caused by `request`, up to and including its idle status.
    pub async fn iopub_until_idle(&mut self, request: &Message) -> Vec<Message> {
        let mut messages = Vec::new();
        loop {
            let message = self.recv_iopub().await;
            if !message.is_child_of(request) {
                continue;
            }

            let idle = matches!(
                message.content,
                Content::Status(Status {
                    execution_state: ExecutionState::Idle
                })
            );
            messages.push(message);
            if idle {
                return messages;
            }
        }
    }
}

pub fn msg_types(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|message| message.msg_type()).collect()
}

pub fn of_type<'a>(messages: &'a [Message], msg_type: &str) -> Vec<&'a Message> {
    messages
        .iter()
        .filter(|message| message.msg_type() == msg_type)
        .collect()
}
