/// Event forwarding into shared state
///
/// Reconciles known backend push events into store slices so the frontend
/// only ever reads the store:
/// - `swap-progress-update` merges the latest event under its swap id
/// - `context-init-progress-update` replaces the context status
/// - `balance-change` replaces the balance

use crate::core::events::{BackendEvent, EventHub, PushEvent};
use crate::core::store::{slices, Action, Store};
use crate::core::{listener, Listener};
use crate::error::Result;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registration of a running event forwarder
pub struct ForwarderHandle {
    hub: Arc<EventHub>,
    listener: Listener<PushEvent>,
    stopped: AtomicBool,
}

impl ForwarderHandle {
    /// Unregister the forwarder; returns false if it was already stopped
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("Stopping event forwarder");
        self.hub.off_any(&self.listener)
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }
}

/// Forward hub events into `store`
pub fn start_event_forwarder(hub: Arc<EventHub>, store: Store) -> ForwarderHandle {
    info!("Starting event forwarder");

    let forward = listener(move |event: &PushEvent| {
        let decoded = match BackendEvent::decode(event) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Not forwarding event: {}", e);
                return;
            }
        };

        if let Err(e) = apply_backend_event(&store, decoded) {
            warn!("Failed to apply '{}' to the store: {}", event.name, e);
        }
    });
    hub.on_any(forward.clone());

    ForwarderHandle {
        hub,
        listener: forward,
        stopped: AtomicBool::new(false),
    }
}

/// Write a decoded event into its slice
///
/// Returns the new store version, or `None` for events with no slice.
pub fn apply_backend_event(store: &Store, event: BackendEvent) -> Result<Option<u64>> {
    let action = match event {
        BackendEvent::SwapProgress(update) => Action::merge(
            slices::SWAP_PROGRESS,
            update.swap_id.to_string(),
            serde_json::to_value(&update.event)?,
        ),
        BackendEvent::ContextStatus(status) => {
            Action::set(slices::CONTEXT_STATUS, serde_json::to_value(status)?)
        }
        BackendEvent::BalanceChange(balance) => Action::set(slices::BALANCE, json!(balance.balance)),
        BackendEvent::Other(event) => {
            debug!("No slice for event '{}'", event.name);
            return Ok(None);
        }
    };

    store.dispatch(action).map(Some)
}
