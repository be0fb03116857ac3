use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::socket::{back_off, FrameRecv, FrameSend, TransportError};

/// Echoes every heartbeat ping back unchanged, independently of the kernel's
/// other work.
pub async fn run_heartbeat<T: FrameRecv + FrameSend>(mut transport: T, shutdown: CancellationToken) {
    loop {
        let ping = tokio::select! {
            _ = shutdown.cancelled() => break,
            ping = transport.recv() => ping,
        };

        match ping {
            Ok(frames) => {
                if let Err(e) = transport.send(frames).await {
                    warn!(error = %e, "heartbeat reply failed");
                }
            }
            Err(TransportError::Closed) => break,
            Err(e) => {
                warn!(error = %e, "heartbeat receive failed");
                back_off(&shutdown).await;
            }
        }
    }

    debug!("heartbeat stopped");
}
