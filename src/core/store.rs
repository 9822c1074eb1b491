/// Shared state store
///
/// Named slices of JSON values, written only through [`Store::dispatch`] and
/// readable by any holder of a `Store` handle. Every effective change is
/// announced to subscribers through an [`Emitter`].
///
/// `Store` is a cheap-to-clone handle; pass it explicitly to whatever needs
/// read or dispatch access.

use crate::core::emitter::{listener, EmitReport, Emitter, Listener};
use crate::error::{BridgeError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, trace, warn};

/// Well-known slice names
pub mod slices {
    /// Current wallet balance
    pub const BALANCE: &str = "balance";

    /// Object of swap id -> latest progress event
    pub const SWAP_PROGRESS: &str = "swap_progress";

    /// Backend context status (initializing / available / failed)
    pub const CONTEXT_STATUS: &str = "context_status";

    /// Swap history entries
    pub const HISTORY: &str = "history";

    /// Full swap infos
    pub const SWAP_INFOS: &str = "swap_infos";
}

/// Update action accepted by [`Store::dispatch`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Replace the slice value
    Set { slice: String, value: Value },

    /// Insert `key` into an object slice, creating the object if needed
    Merge { slice: String, key: String, value: Value },

    /// Remove the slice
    Clear { slice: String },
}

impl Action {
    pub fn set(slice: impl Into<String>, value: Value) -> Self {
        Action::Set {
            slice: slice.into(),
            value,
        }
    }

    pub fn merge(slice: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Action::Merge {
            slice: slice.into(),
            key: key.into(),
            value,
        }
    }

    pub fn clear(slice: impl Into<String>) -> Self {
        Action::Clear {
            slice: slice.into(),
        }
    }

    /// Slice this action writes to
    pub fn slice(&self) -> &str {
        match self {
            Action::Set { slice, .. } | Action::Merge { slice, .. } | Action::Clear { slice } => {
                slice
            }
        }
    }
}

/// Notification sent to subscribers after a slice changed
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StateChange {
    pub slice: String,

    /// New value, `None` when the slice was cleared
    pub value: Option<Value>,

    /// Store version after the change
    pub version: u64,

    pub at: DateTime<Utc>,
}

#[derive(Default)]
struct Slices {
    values: HashMap<String, Value>,
    version: u64,
}

struct StoreInner {
    slices: RwLock<Slices>,
    changes: Emitter<StateChange>,
}

/// Process-wide shared state handle
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                slices: RwLock::new(Slices::default()),
                changes: Emitter::new(),
            }),
        }
    }

    /// Apply an action and notify subscribers
    ///
    /// Returns the store version after the action. Actions that do not
    /// change anything (setting an equal value, clearing an absent slice)
    /// leave the version untouched and notify no one.
    ///
    /// # Errors
    /// - `BridgeError::ValidationError`: `Merge` into a slice that holds a
    ///   non-object value
    pub fn dispatch(&self, action: Action) -> Result<u64> {
        trace!("Dispatching {:?}", action);
        let slice = action.slice().to_string();

        let change = {
            let mut state = self.inner.slices.write().unwrap_or_else(PoisonError::into_inner);

            let new_value = match action {
                Action::Set { value, .. } => {
                    if state.values.get(&slice) == Some(&value) {
                        return Ok(state.version);
                    }
                    state.values.insert(slice.clone(), value.clone());
                    Some(value)
                }
                Action::Merge { key, value, .. } => {
                    let entry = state
                        .values
                        .entry(slice.clone())
                        .or_insert_with(|| Value::Object(Map::new()));

                    let object = entry.as_object_mut().ok_or_else(|| {
                        warn!("Cannot merge key '{}' into non-object slice '{}'", key, slice);
                        BridgeError::ValidationError {
                            field: slice.clone(),
                            reason: "Merge target is not an object".to_string(),
                        }
                    })?;

                    if object.get(&key) == Some(&value) {
                        return Ok(state.version);
                    }
                    object.insert(key, value);
                    Some(entry.clone())
                }
                Action::Clear { .. } => {
                    if state.values.remove(&slice).is_none() {
                        return Ok(state.version);
                    }
                    None
                }
            };

            state.version += 1;

            StateChange {
                slice,
                value: new_value,
                version: state.version,
                at: Utc::now(),
            }
        };

        debug!("Slice '{}' updated (version {})", change.slice, change.version);
        self.notify(&change);
        Ok(change.version)
    }

    /// Current value of a slice
    pub fn get(&self, slice: &str) -> Option<Value> {
        self.read(|s| s.values.get(slice).cloned())
    }

    /// Current value of a slice decoded into `T`
    pub fn get_as<T: DeserializeOwned>(&self, slice: &str) -> Result<Option<T>> {
        self.get(slice)
            .map(serde_json::from_value)
            .transpose()
            .map_err(BridgeError::from)
    }

    /// Whether a slice currently has a value
    pub fn contains(&self, slice: &str) -> bool {
        self.read(|s| s.values.contains_key(slice))
    }

    /// Copy of every slice
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.read(|s| s.values.clone())
    }

    /// Number of effective changes applied so far
    pub fn version(&self) -> u64 {
        self.read(|s| s.version)
    }

    /// Observe every change
    pub fn subscribe(&self, listener: Listener<StateChange>) {
        self.inner.changes.on(listener);
    }

    /// Stop observing; unknown listeners are ignored
    pub fn unsubscribe(&self, listener: &Listener<StateChange>) -> bool {
        self.inner.changes.off(listener)
    }

    /// Observe changes to a single slice
    ///
    /// Returns the registered listener so it can be passed to `unsubscribe`.
    pub fn watch<F>(&self, slice: impl Into<String>, f: F) -> Listener<StateChange>
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        let slice = slice.into();
        let l = listener(move |change: &StateChange| {
            if change.slice == slice {
                f(change.value.as_ref());
            }
        });
        self.subscribe(l.clone());
        l
    }

    fn notify(&self, change: &StateChange) -> EmitReport {
        let report = self.inner.changes.emit(change);
        if !report.is_clean() {
            warn!(
                "{} of {} store subscribers panicked on '{}'",
                report.panicked, report.notified, change.slice
            );
        }
        report
    }

    fn read<R>(&self, f: impl FnOnce(&Slices) -> R) -> R {
        let state = self.inner.slices.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("version", &self.version())
            .field("subscribers", &self.inner.changes.listener_count())
            .finish()
    }
}
