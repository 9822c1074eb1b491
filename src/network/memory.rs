/// In-process transport pair
///
/// Connects a bridge to a backend living in the same process (embedded
/// backends, tests). Frames are moved through bounded channels without
/// serialization.

use crate::error::{BridgeError, Result};
use crate::network::codec::Frame;
use crate::network::transport::Transport;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Create a connected (bridge side, backend side) pair
pub fn pair(capacity: usize) -> (MemoryTransport, BackendEndpoint) {
    let (to_backend, from_bridge) = mpsc::channel(capacity);
    let (to_bridge, from_backend) = mpsc::channel(capacity);

    (
        MemoryTransport {
            outbound: Mutex::new(Some(to_backend)),
            inbound: Mutex::new(from_backend),
        },
        BackendEndpoint {
            requests: from_bridge,
            replies: to_bridge,
        },
    )
}

/// Bridge side of an in-memory pair
pub struct MemoryTransport {
    outbound: Mutex<Option<mpsc::Sender<Frame>>>,
    inbound: Mutex<mpsc::Receiver<Frame>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, frame: Frame) -> Result<()> {
        let sender = self
            .outbound
            .lock()
            .await
            .clone()
            .ok_or_else(|| BridgeError::TransportUnavailable("memory transport closed".to_string()))?;

        sender
            .send(frame)
            .await
            .map_err(|_| BridgeError::TransportUnavailable("backend endpoint dropped".to_string()))
    }

    async fn recv(&self) -> Result<Option<Frame>> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self) -> Result<()> {
        if self.outbound.lock().await.take().is_some() {
            debug!("Memory transport closed");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// A command as seen by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingCommand {
    pub id: Uuid,
    pub command: String,
    pub args: Option<Value>,
}

/// Backend side of an in-memory pair
pub struct BackendEndpoint {
    requests: mpsc::Receiver<Frame>,
    replies: mpsc::Sender<Frame>,
}

impl BackendEndpoint {
    /// Next command sent by the bridge, `None` once the bridge side is closed
    ///
    /// Non-request frames are skipped.
    pub async fn next_command(&mut self) -> Option<IncomingCommand> {
        while let Some(frame) = self.requests.recv().await {
            match frame {
                Frame::Request { id, command, args } => {
                    return Some(IncomingCommand { id, command, args })
                }
                other => debug!("Backend endpoint ignoring {} frame", other.kind()),
            }
        }
        None
    }

    /// Reply with a success value
    pub async fn respond_ok(&self, id: Uuid, value: Value) -> Result<()> {
        self.send(Frame::ok(id, value)).await
    }

    /// Reply with a failure
    pub async fn respond_err(&self, id: Uuid, message: impl Into<String>) -> Result<()> {
        self.send(Frame::error(id, message, None)).await
    }

    /// Push an unsolicited event
    pub async fn push_event(&self, event: impl Into<String>, payload: Value) -> Result<()> {
        self.send(Frame::event(event, payload)).await
    }

    /// Send an arbitrary frame to the bridge
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.replies
            .send(frame)
            .await
            .map_err(|_| BridgeError::TransportUnavailable("bridge side dropped".to_string()))
    }
}
