/// UI layer: commands and event forwarding
///
/// Frontend-facing functions that call the backend through the bridge and
/// keep the shared store in sync with pushed events.

pub mod commands;
pub mod events;
pub mod state;

// Re-export commonly used types
pub use commands::*;
pub use events::{apply_backend_event, start_event_forwarder, ForwarderHandle};
pub use state::AppState;
