/// swap-bridge - command bridge and shared state for a swap GUI
///
/// Sends commands to a backend process, correlates their responses, fans
/// pushed backend events out to listeners, and keeps a shared-state store
/// the frontend renders from.

// Module declarations
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod ui;

// Re-export commonly used types
pub use config::BridgeConfig;
pub use crate::core::{
    listener, Action, Bridge, EmitReport, Emitter, EventHub, Listener, PushEvent, Request,
    StateChange, Store,
};
pub use error::{BridgeError, Result};
pub use network::{MemoryTransport, ProcessTransport, TcpTransport, Transport};
pub use ui::state::AppState;

/// Initialize logging infrastructure
///
/// Filter comes from `RUST_LOG`, defaulting to `info`. Calling this more than
/// once leaves the first subscriber in place.
pub fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("swap-bridge logging initialized");
    }
}
