/// TCP transport to a backend listening on a socket
///
/// Provides:
/// - Configurable connect timeout
/// - Newline-delimited JSON frames
/// - Independent read and write halves, so a blocked `recv` never stalls `send`

use crate::error::{BridgeError, Result};
use crate::network::codec::{Frame, FrameCodec, DEFAULT_MAX_FRAME_LEN};
use crate::network::transport::Transport;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// TCP transport configuration builder
#[derive(Debug, Clone)]
pub struct TcpTransportBuilder {
    host: String,
    port: u16,
    timeout: Duration,
    max_frame_len: usize,
}

impl TcpTransportBuilder {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Duration::from_secs(30),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = duration;
        self
    }

    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Connect to the backend
    ///
    /// # Errors
    /// - `BridgeError::ConnectionFailed`: DNS resolution failed or connection refused
    /// - `BridgeError::TransportUnavailable`: connection attempt exceeded the timeout
    /// - `BridgeError::ValidationError`: the timeout is zero
    pub async fn connect(self) -> Result<TcpTransport> {
        if self.timeout.is_zero() {
            return Err(BridgeError::ValidationError {
                field: "timeout".to_string(),
                reason: "Connect timeout must be non-zero".to_string(),
            });
        }

        let addr = format!("{}:{}", self.host, self.port);

        info!("Connecting to backend at {} (timeout: {:?})", addr, self.timeout);

        match timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Failed to set TCP_NODELAY on {}: {}", addr, e);
                }

                info!("Connected to backend at {}", addr);
                let (read_half, write_half) = stream.into_split();

                Ok(TcpTransport {
                    peer: addr,
                    codec: FrameCodec::new(self.max_frame_len),
                    reader: Mutex::new(BufReader::new(read_half)),
                    writer: Mutex::new(Some(write_half)),
                })
            }
            Ok(Err(e)) => {
                error!("Connection failed to {}: {}", addr, e);
                Err(BridgeError::ConnectionFailed {
                    host: self.host,
                    port: self.port,
                    source: e,
                })
            }
            Err(_) => {
                error!("Connection timeout after {:?} to {}", self.timeout, addr);
                Err(BridgeError::TransportUnavailable(format!(
                    "connection to {} timed out after {:?}",
                    addr, self.timeout
                )))
            }
        }
    }
}

/// Frame transport over a TCP stream
pub struct TcpTransport {
    peer: String,
    codec: FrameCodec,
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl TcpTransport {
    /// Connect with default settings
    pub async fn connect(host: impl Into<String>, port: u16) -> Result<Self> {
        TcpTransportBuilder::new(host, port).connect().await
    }

    /// Create a builder for custom configuration
    pub fn builder(host: impl Into<String>, port: u16) -> TcpTransportBuilder {
        TcpTransportBuilder::new(host, port)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, frame: Frame) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| {
            warn!("Attempted to send to {} after close", self.peer);
            BridgeError::TransportUnavailable(format!("connection to {} is closed", self.peer))
        })?;

        self.codec.write_frame(writer, &frame).await.map_err(|e| match e {
            BridgeError::IoError(io) => {
                error!("Failed to send frame to {}: {}", self.peer, io);
                BridgeError::TransportUnavailable(format!("write to {} failed: {}", self.peer, io))
            }
            other => other,
        })
    }

    async fn recv(&self) -> Result<Option<Frame>> {
        let mut reader = self.reader.lock().await;
        let frame = self.codec.read_frame(&mut *reader).await?;

        if frame.is_none() {
            info!("Backend at {} closed the connection", self.peer);
        }
        Ok(frame)
    }

    async fn close(&self) -> Result<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            info!("Closing connection to {}", self.peer);
            if let Err(e) = writer.shutdown().await {
                warn!("Error during graceful shutdown: {}", e);
            }
            debug!("Connection to {} closed", self.peer);
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use uuid::Uuid;

    /// Helper: Start a mock backend for testing
    async fn start_mock_backend() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn test_builder_pattern() {
        let builder = TcpTransport::builder("example.com", 9944)
            .timeout(Duration::from_secs(10))
            .max_frame_len(4096);

        assert_eq!(builder.host, "example.com");
        assert_eq!(builder.port, 9944);
        assert_eq!(builder.timeout, Duration::from_secs(10));
        assert_eq!(builder.max_frame_len, 4096);
    }

    #[tokio::test]
    async fn test_sub_second_connect_timeout() {
        let (listener, port) = start_mock_backend().await;

        tokio::spawn(async move {
            let _accept = listener.accept().await;
        });

        let builder = TcpTransport::builder("127.0.0.1", port).timeout(Duration::from_millis(500));
        assert_eq!(builder.timeout, Duration::from_millis(500));

        assert!(builder.connect().await.is_ok(), "500 ms is enough for localhost");
    }

    #[tokio::test]
    async fn test_zero_connect_timeout_rejected() {
        let result = TcpTransport::builder("127.0.0.1", 1)
            .timeout(Duration::ZERO)
            .connect()
            .await;

        assert!(matches!(result, Err(BridgeError::ValidationError { .. })));
    }

    #[tokio::test]
    async fn test_connect_to_localhost() {
        let (listener, port) = start_mock_backend().await;

        tokio::spawn(async move {
            let _accept = listener.accept().await;
        });

        let transport = TcpTransport::connect("127.0.0.1", port).await;

        assert!(transport.is_ok(), "Should connect to localhost");
        assert_eq!(transport.unwrap().describe(), format!("tcp://127.0.0.1:{}", port));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port nobody listens on
        let (listener, port) = start_mock_backend().await;
        drop(listener);

        let result = TcpTransport::connect("127.0.0.1", port).await;

        assert!(
            matches!(result, Err(BridgeError::ConnectionFailed { .. })),
            "Should return ConnectionFailed error"
        );
    }

    #[tokio::test]
    async fn test_send_frame() {
        let (listener, port) = start_mock_backend().await;

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut lines = tokio::io::BufReader::new(socket).lines();
            lines.next_line().await.unwrap()
        });

        let transport = TcpTransport::connect("127.0.0.1", port).await.unwrap();
        let id = Uuid::new_v4();
        transport
            .send(Frame::Request {
                id,
                command: "get_balance".to_string(),
                args: None,
            })
            .await
            .expect("Should send frame");

        let line = server.await.unwrap().expect("Server should receive a line");
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["kind"], "request");
        assert_eq!(value["command"], "get_balance");
    }

    #[tokio::test]
    async fn test_receive_frame_then_eof() {
        let (listener, port) = start_mock_backend().await;

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket
                    .write_all(b"{\"kind\":\"event\",\"event\":\"balance-change\",\"payload\":{\"balance\":1}}\n")
                    .await;
            }
        });

        let transport = TcpTransport::connect("127.0.0.1", port).await.unwrap();

        let frame = transport.recv().await.expect("Should receive frame");
        assert_eq!(frame, Some(Frame::event("balance-change", json!({ "balance": 1 }))));

        let end = transport.recv().await.expect("EOF is not an error");
        assert_eq!(end, None);
    }

    #[tokio::test]
    async fn test_non_utf8_line_is_codec_error() {
        let (listener, port) = start_mock_backend().await;

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(b"\xff\xfe garbage\n").await;
                let _ = socket
                    .write_all(b"{\"kind\":\"event\",\"event\":\"ready\"}\n")
                    .await;
            }
        });

        let transport = TcpTransport::connect("127.0.0.1", port).await.unwrap();

        let bad = transport.recv().await;
        assert!(
            matches!(bad, Err(BridgeError::Codec(_))),
            "Invalid UTF-8 should be a skippable codec error, got {:?}",
            bad
        );

        let next = transport.recv().await.expect("Stream stays usable");
        assert_eq!(next, Some(Frame::event("ready", serde_json::Value::Null)));
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let (listener, port) = start_mock_backend().await;

        tokio::spawn(async move {
            let _accept = listener.accept().await;
        });

        let transport = TcpTransport::connect("127.0.0.1", port).await.unwrap();
        transport.close().await.expect("Should close");

        let result = transport.send(Frame::event("x", json!(null))).await;
        assert!(
            matches!(result, Err(BridgeError::TransportUnavailable(_))),
            "Should return TransportUnavailable error"
        );

        // Closing twice is harmless
        assert!(transport.close().await.is_ok());
    }
}
