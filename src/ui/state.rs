/// Application state shared by UI commands
///
/// Holds the shared-state store and, once the backend is up, the bridge.
/// Commands issued before a bridge is attached fail with
/// `BridgeError::ContextUnavailable`.

use crate::core::events::ContextStatus;
use crate::core::store::slices;
use crate::core::{Action, Bridge, Store};
use crate::error::{BridgeError, Result};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    /// Shared state read by the frontend
    pub store: Store,

    /// Active bridge (None until the backend context is ready)
    bridge: Arc<RwLock<Option<Arc<Bridge>>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_store(Store::new())
    }

    /// Create state around an existing store
    pub fn with_store(store: Store) -> Self {
        Self {
            store,
            bridge: Arc::new(RwLock::new(None)),
        }
    }

    /// Attach a bridge, returning the previous one if any
    pub fn set_bridge(&self, bridge: Arc<Bridge>) -> Option<Arc<Bridge>> {
        info!("Backend context attached");
        self.bridge
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(bridge)
    }

    /// Detach the bridge
    pub fn take_bridge(&self) -> Option<Arc<Bridge>> {
        self.bridge
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Get the attached bridge
    ///
    /// # Errors
    /// - `BridgeError::ContextUnavailable`: no bridge attached yet
    pub fn try_get_bridge(&self) -> Result<Arc<Bridge>> {
        self.bridge
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(BridgeError::ContextUnavailable)
    }

    /// Whether a bridge is attached and still connected
    pub fn is_connected(&self) -> bool {
        self.try_get_bridge()
            .map(|bridge| bridge.is_connected())
            .unwrap_or(false)
    }

    /// Write `status` into the `context_status` slice
    pub fn set_context_status(&self, status: ContextStatus) -> Result<u64> {
        self.store
            .dispatch(Action::set(slices::CONTEXT_STATUS, serde_json::to_value(status)?))
    }

    /// Bring up the backend context
    ///
    /// `connect` receives this state's store and builds the bridge. The
    /// `context_status` slice moves to `Initializing`, then to `Available`
    /// once the bridge is attached or to `Failed` if `connect` errors.
    pub async fn initialize_context<F, Fut>(&self, connect: F) -> Result<Arc<Bridge>>
    where
        F: FnOnce(Store) -> Fut,
        Fut: Future<Output = Result<Bridge>>,
    {
        info!("Initializing backend context");
        self.set_context_status(ContextStatus::Initializing)?;

        match connect(self.store.clone()).await {
            Ok(bridge) => {
                let bridge = Arc::new(bridge);
                if let Some(previous) = self.set_bridge(bridge.clone()) {
                    warn!("Replacing an already attached backend context");
                    let _ = previous.shutdown().await;
                }
                self.set_context_status(ContextStatus::Available)?;
                Ok(bridge)
            }
            Err(e) => {
                error!("Backend context failed to initialize: {}", e);
                self.set_context_status(ContextStatus::Failed)?;
                Err(e)
            }
        }
    }

    /// Detach and shut down the bridge, clearing `context_status`
    ///
    /// Returns `Ok(false)` when no bridge was attached.
    pub async fn shutdown_context(&self) -> Result<bool> {
        let Some(bridge) = self.take_bridge() else {
            return Ok(false);
        };

        info!("Shutting down backend context");
        let result = bridge.shutdown().await;
        self.store.dispatch(Action::clear(slices::CONTEXT_STATUS))?;
        result.map(|_| true)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
