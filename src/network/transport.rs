/// Transport abstraction between the bridge and the backend process
///
/// A transport moves whole [`Frame`]s. Sending and receiving are independent:
/// the bridge's dispatcher sits in `recv` while any number of callers `send`.

use crate::error::Result;
use crate::network::codec::Frame;
use async_trait::async_trait;

/// Bidirectional frame channel to the backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one frame to the backend
    async fn send(&self, frame: Frame) -> Result<()>;

    /// Next frame from the backend, `None` once the channel is closed
    async fn recv(&self) -> Result<Option<Frame>>;

    /// Close the outbound half; pending `recv` calls drain and end
    async fn close(&self) -> Result<()>;

    /// Human-readable peer description for logs
    fn describe(&self) -> String;
}
