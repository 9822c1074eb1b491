/// Core bridge logic
///
/// Listener registries, the shared-state store, backend commands, and the
/// bridge that correlates command responses and fans out pushed events.

pub mod bridge;
pub mod command;
pub mod emitter;
pub mod events;
pub mod requests;
pub mod store;

// Re-export commonly used types
pub use bridge::Bridge;
pub use command::Command;
pub use emitter::{listener, EmitReport, Emitter, Listener};
pub use events::{BackendEvent, ContextStatus, EventHub, PushEvent, SwapProgressEvent};
pub use requests::Request;
pub use store::{Action, StateChange, Store};
