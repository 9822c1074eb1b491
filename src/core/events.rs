/// Backend push events
///
/// Provides the event hub that pushed backend events flow through:
/// - Dispatcher publishes every event frame in arrival order
/// - Per-event-name emitters serve synchronous UI listeners
/// - A broadcast channel serves async subscribers
/// - The event forwarder reconciles known events into the store

use crate::core::emitter::{listener, EmitReport, Emitter, Listener};
use crate::core::requests::BalanceResponse;
use crate::error::{BridgeError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default number of events buffered per async subscriber
pub const EVENT_BUFFER_SIZE: usize = 100;

pub const SWAP_PROGRESS_EVENT: &str = "swap-progress-update";
pub const CONTEXT_STATUS_EVENT: &str = "context-init-progress-update";
pub const BALANCE_CHANGE_EVENT: &str = "balance-change";

/// A pushed event as received from the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushEvent {
    pub name: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl PushEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            received_at: Utc::now(),
        }
    }
}

/// Maker quote, amounts in satoshis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BidQuote {
    pub price: u64,
    pub min_quantity: u64,
    pub max_quantity: u64,
}

/// Progress of a single swap as reported by the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "content")]
pub enum SwapProgressEvent {
    Initiated,
    ReceivedQuote(BidQuote),
    WaitingForBtcDeposit {
        deposit_address: String,
        max_giveable: u64,
        min_deposit_until_swap_will_start: u64,
        max_deposit_until_maximum_amount_is_reached: u64,
        min_bitcoin_lock_tx_fee: u64,
        quote: BidQuote,
    },
    Started {
        btc_lock_amount: u64,
        btc_tx_lock_fee: u64,
    },
    BtcLockTxInMempool {
        btc_lock_txid: String,
        btc_lock_confirmations: u64,
    },
    XmrLockTxInMempool {
        xmr_lock_txid: String,
        xmr_lock_tx_confirmations: u64,
    },
    XmrLocked,
    BtcRedeemed,
    XmrRedeemInMempool {
        xmr_redeem_txid: String,
        xmr_redeem_address: String,
    },
    BtcCancelled {
        btc_cancel_txid: String,
    },
    BtcRefunded {
        btc_refund_txid: String,
    },
    BtcPunished,
    AttemptingCooperativeRedeem,
    CooperativeRedeemAccepted,
    CooperativeRedeemRejected {
        reason: String,
    },
    Released,
}

impl SwapProgressEvent {
    /// Whether the swap can make no further progress after this event
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SwapProgressEvent::XmrRedeemInMempool { .. }
                | SwapProgressEvent::BtcRefunded { .. }
                | SwapProgressEvent::BtcPunished
                | SwapProgressEvent::Released
        )
    }

    /// Check if this is an error event
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SwapProgressEvent::BtcPunished | SwapProgressEvent::CooperativeRedeemRejected { .. }
        )
    }
}

/// Payload of [`SWAP_PROGRESS_EVENT`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwapProgressEventWrapper {
    pub swap_id: Uuid,
    pub event: SwapProgressEvent,
}

/// Payload of [`CONTEXT_STATUS_EVENT`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContextStatus {
    Initializing,
    Available,
    Failed,
}

/// Known backend events, decoded
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    SwapProgress(SwapProgressEventWrapper),
    ContextStatus(ContextStatus),
    BalanceChange(BalanceResponse),
    /// Any event this crate has no type for
    Other(PushEvent),
}

impl BackendEvent {
    /// Decode a push event by name
    ///
    /// # Errors
    /// - `BridgeError::Codec`: a known event name carried a payload of the
    ///   wrong shape
    pub fn decode(event: &PushEvent) -> Result<Self> {
        fn typed<T: DeserializeOwned>(event: &PushEvent) -> Result<T> {
            serde_json::from_value(event.payload.clone()).map_err(|e| {
                BridgeError::Codec(format!("bad '{}' payload: {}", event.name, e))
            })
        }

        Ok(match event.name.as_str() {
            SWAP_PROGRESS_EVENT => BackendEvent::SwapProgress(typed(event)?),
            CONTEXT_STATUS_EVENT => BackendEvent::ContextStatus(typed(event)?),
            BALANCE_CHANGE_EVENT => BackendEvent::BalanceChange(typed(event)?),
            _ => BackendEvent::Other(event.clone()),
        })
    }
}

/// Fan-out point for pushed events
pub struct EventHub {
    all: Emitter<PushEvent>,
    topics: Mutex<HashMap<String, Arc<Emitter<Value>>>>,
    sender: broadcast::Sender<PushEvent>,
}

impl EventHub {
    /// Create a hub whose async subscribers buffer `buffer_size` events
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size.max(1));
        Self {
            all: Emitter::new(),
            topics: Mutex::new(HashMap::new()),
            sender,
        }
    }

    /// Deliver an event to every listener and subscriber
    ///
    /// Listeners of every event run first, then listeners of this event name,
    /// then the event is queued for async subscribers.
    pub fn publish(&self, event: PushEvent) -> EmitReport {
        debug!("Publishing push event '{}'", event.name);

        let mut report = self.all.emit(&event);

        if let Some(topic) = self.existing_topic(&event.name) {
            let topic_report = topic.emit(&event.payload);
            report.notified += topic_report.notified;
            report.panicked += topic_report.panicked;
        }

        // send only fails when nobody is subscribed
        let _ = self.sender.send(event);
        report
    }

    /// Listen to one event name
    pub fn on(&self, name: &str, listener: Listener<Value>) {
        // Registered under the map lock so a concurrent `off` cannot drop the topic first
        self.lock_topics()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Emitter::new()))
            .on(listener);
    }

    /// Stop listening to one event name; unknown listeners are ignored
    ///
    /// A topic left without listeners is removed.
    pub fn off(&self, name: &str, listener: &Listener<Value>) -> bool {
        let mut topics = self.lock_topics();
        let Some(topic) = topics.get(name) else {
            return false;
        };

        let removed = topic.off(listener);
        if topic.is_empty() {
            topics.remove(name);
            debug!("Dropped empty topic '{}'", name);
        }
        removed
    }

    /// Number of event names with at least one listener
    pub fn topic_count(&self) -> usize {
        self.lock_topics().len()
    }

    /// Listen to one event name with a decoded payload
    ///
    /// Payloads that fail to decode are logged and skipped. Returns the
    /// registered listener for use with [`EventHub::off`].
    pub fn on_typed<T, F>(&self, name: &str, f: F) -> Listener<Value>
    where
        T: DeserializeOwned + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let event_name = name.to_string();
        let l = listener(move |payload: &Value| {
            match serde_json::from_value::<T>(payload.clone()) {
                Ok(decoded) => f(&decoded),
                Err(e) => warn!("Dropping '{}' event with undecodable payload: {}", event_name, e),
            }
        });
        self.on(name, l.clone());
        l
    }

    /// Listen to every event
    pub fn on_any(&self, listener: Listener<PushEvent>) {
        self.all.on(listener);
    }

    /// Stop listening to every event
    pub fn off_any(&self, listener: &Listener<PushEvent>) -> bool {
        self.all.off(listener)
    }

    /// Async subscription to all future events
    ///
    /// The receiver buffers up to the hub's buffer size; slower receivers
    /// observe `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active async subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn existing_topic(&self, name: &str) -> Option<Arc<Emitter<Value>>> {
        self.lock_topics().get(name).cloned()
    }

    fn lock_topics(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Emitter<Value>>>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(EVENT_BUFFER_SIZE)
    }
}
