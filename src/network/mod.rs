/// Network layer: wire codec and backend transports
///
/// This module handles all communication with the backend process:
/// - Line-delimited JSON frame codec
/// - Transport trait shared by every channel
/// - TCP, child-process stdio and in-memory transports

pub mod codec;
pub mod memory;
pub mod process;
pub mod tcp;
pub mod transport;

// Re-export commonly used types
pub use codec::{Frame, FrameCodec, RemoteError};
pub use memory::{BackendEndpoint, IncomingCommand, MemoryTransport};
pub use process::ProcessTransport;
pub use tcp::{TcpTransport, TcpTransportBuilder};
pub use transport::Transport;
