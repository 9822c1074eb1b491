/// Command bridge to the backend process
///
/// Issues commands over a [`Transport`] and correlates each response with its
/// caller by command id, so any number of invocations can be outstanding and
/// resolve in whatever order the backend answers. A single dispatcher task
/// reads the transport: responses resolve pending calls, pushed events go to
/// the [`EventHub`] in arrival order.
///
/// Shared state is only written after a command fully succeeded. A failed or
/// undecodable response leaves the store untouched. The bridge never retries.

use crate::config::BridgeConfig;
use crate::core::command::Command;
use crate::core::events::{EventHub, PushEvent};
use crate::core::requests::Request;
use crate::core::store::{Action, Store};
use crate::error::{BridgeError, Result};
use crate::network::codec::Frame;
use crate::network::transport::Transport;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct PendingCall {
    command: String,
    resolver: oneshot::Sender<Result<Value>>,
}

type PendingMap = Mutex<HashMap<Uuid, PendingCall>>;

fn lock_pending(pending: &PendingMap) -> MutexGuard<'_, HashMap<Uuid, PendingCall>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a pending entry when the invocation finishes or is dropped
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).remove(&self.id);
    }
}

/// Bridge between local callers and the backend process
pub struct Bridge {
    transport: Arc<dyn Transport>,
    store: Store,
    events: Arc<EventHub>,
    pending: Arc<PendingMap>,
    connected: Arc<AtomicBool>,
    config: BridgeConfig,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Bridge {
    /// Start a bridge over `transport`
    ///
    /// Spawns the dispatcher task, so this must be called from within a
    /// Tokio runtime.
    ///
    /// # Errors
    /// - `BridgeError::ValidationError`: `config` failed validation, nothing was spawned
    pub fn start(transport: Arc<dyn Transport>, store: Store, config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        info!("Starting bridge over {}", transport.describe());

        let events = Arc::new(EventHub::new(config.event_buffer_size));
        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let dispatcher = tokio::spawn(run_dispatcher(
            transport.clone(),
            pending.clone(),
            events.clone(),
            connected.clone(),
        ));

        Ok(Self {
            transport,
            store,
            events,
            pending,
            connected,
            config,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Send a command and wait for its response
    ///
    /// # Errors
    /// - `BridgeError::InvalidCommand`: the name was rejected locally, nothing was sent
    /// - `BridgeError::TransportUnavailable`: the backend could not be reached
    ///   or the connection closed before the response arrived
    /// - `BridgeError::CommandFailed`: the backend answered with an error
    /// - `BridgeError::Timeout`: no response within the configured timeout
    pub async fn invoke(&self, name: &str, args: Option<Value>) -> Result<Value> {
        let command = Command::new(name, args)?;
        self.invoke_command(command).await
    }

    /// Send a command with serializable arguments and decode the response
    pub async fn invoke_typed<A, R>(&self, name: &str, args: Option<&A>) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let args = args.map(serde_json::to_value).transpose()?;
        let value = self.invoke(name, args).await?;
        decode_response(name, value)
    }

    /// Send a typed request
    pub async fn request<Q: Request>(&self, args: &Q) -> Result<Q::Response> {
        self.invoke_typed(Q::COMMAND, Some(args)).await
    }

    /// Invoke, then write `select(&response)` into `slice` on success
    ///
    /// The store is only touched once the response has been received and
    /// decoded.
    pub async fn invoke_and_update<R, V, F>(
        &self,
        name: &str,
        args: Option<Value>,
        slice: &str,
        select: F,
    ) -> Result<R>
    where
        R: DeserializeOwned,
        V: Serialize,
        F: FnOnce(&R) -> V,
    {
        let value = self.invoke(name, args).await?;
        let response: R = decode_response(name, value)?;
        self.update_shared_state(slice, serde_json::to_value(select(&response))?)?;
        Ok(response)
    }

    /// Typed counterpart of [`Bridge::invoke_and_update`]
    pub async fn request_and_update<Q, V, F>(
        &self,
        args: &Q,
        slice: &str,
        select: F,
    ) -> Result<Q::Response>
    where
        Q: Request,
        V: Serialize,
        F: FnOnce(&Q::Response) -> V,
    {
        let args = serde_json::to_value(args)?;
        self.invoke_and_update(Q::COMMAND, Some(args), slice, select).await
    }

    /// Replace a shared-state slice
    pub fn update_shared_state(&self, slice: &str, value: Value) -> Result<u64> {
        self.store.dispatch(Action::set(slice, value))
    }

    /// Close the transport and fail every outstanding call
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down bridge over {}", self.transport.describe());

        let result = self.transport.close().await;

        if let Some(task) = self.take_dispatcher() {
            task.abort();
        }
        fail_pending(&self.pending, &self.connected, "bridge shut down");

        result
    }

    /// Whether the dispatcher is still reading from the backend
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of commands awaiting a response
    pub fn pending_count(&self) -> usize {
        lock_pending(&self.pending).len()
    }

    /// Push-event hub fed by this bridge
    pub fn events(&self) -> &Arc<EventHub> {
        &self.events
    }

    /// Store this bridge writes into
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    async fn invoke_command(&self, command: Command) -> Result<Value> {
        let (resolver, response) = oneshot::channel();

        {
            let mut pending = lock_pending(&self.pending);
            // Checked under the lock so a closing dispatcher cannot miss this entry
            if !self.is_connected() {
                return Err(BridgeError::TransportUnavailable(format!(
                    "not connected to {}",
                    self.transport.describe()
                )));
            }
            pending.insert(
                command.id,
                PendingCall {
                    command: command.name.clone(),
                    resolver,
                },
            );
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            id: command.id,
        };

        debug!("Invoking '{}' ({})", command.name, command.id);

        self.transport.send(command.to_frame()).await.map_err(|e| {
            error!("Failed to send '{}': {}", command.name, e);
            match e {
                BridgeError::IoError(io) => BridgeError::TransportUnavailable(io.to_string()),
                other => other,
            }
        })?;

        let limit = self.config.request_timeout_duration();
        match timeout(limit, response).await {
            Ok(Ok(result)) => {
                debug!("'{}' ({}) resolved", command.name, command.id);
                result
            }
            Ok(Err(_)) => Err(BridgeError::TransportUnavailable(format!(
                "connection closed before '{}' was answered",
                command.name
            ))),
            Err(_) => {
                warn!("'{}' ({}) timed out after {:?}", command.name, command.id, limit);
                Err(BridgeError::Timeout {
                    command: command.name,
                    timeout_ms: crate::config::duration_to_ms(limit),
                })
            }
        }
    }

    fn take_dispatcher(&self) -> Option<JoinHandle<()>> {
        self.dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if let Some(task) = self.take_dispatcher() {
            task.abort();
        }
    }
}

fn decode_response<R: DeserializeOwned>(command: &str, value: Value) -> Result<R> {
    serde_json::from_value(value).map_err(|e| BridgeError::UnexpectedResponse {
        command: command.to_string(),
        reason: e.to_string(),
    })
}

/// Mark the bridge disconnected and fail every outstanding call
fn fail_pending(pending: &PendingMap, connected: &AtomicBool, reason: &str) {
    let drained: Vec<PendingCall> = {
        let mut pending = lock_pending(pending);
        connected.store(false, Ordering::SeqCst);
        pending.drain().map(|(_, call)| call).collect()
    };

    if !drained.is_empty() {
        warn!("Failing {} outstanding command(s): {}", drained.len(), reason);
    }

    for call in drained {
        let _ = call
            .resolver
            .send(Err(BridgeError::TransportUnavailable(reason.to_string())));
    }
}

async fn run_dispatcher(
    transport: Arc<dyn Transport>,
    pending: Arc<PendingMap>,
    events: Arc<EventHub>,
    connected: Arc<AtomicBool>,
) {
    let peer = transport.describe();
    debug!("Dispatcher reading from {}", peer);

    loop {
        match transport.recv().await {
            Ok(Some(frame)) => route_frame(frame, &pending, &events),
            Ok(None) => {
                info!("Backend {} closed the channel", peer);
                break;
            }
            Err(BridgeError::Codec(reason)) => {
                // Line framing is intact; skip the bad frame
                warn!("Skipping malformed frame from {}: {}", peer, reason);
            }
            Err(e) => {
                error!("Receive from {} failed: {}", peer, e);
                break;
            }
        }
    }

    fail_pending(&pending, &connected, &format!("connection to {} closed", peer));
}

fn route_frame(frame: Frame, pending: &PendingMap, events: &EventHub) {
    match frame {
        Frame::Response { id, ok, error } => {
            let Some(call) = lock_pending(pending).remove(&id) else {
                warn!("Dropping response for unknown or expired command {}", id);
                return;
            };

            let result = match error {
                Some(remote) => {
                    debug!("'{}' ({}) failed: {}", call.command, id, remote.message);
                    Err(BridgeError::CommandFailed {
                        command: call.command,
                        message: remote.message,
                        code: remote.code,
                    })
                }
                None => Ok(ok.unwrap_or(Value::Null)),
            };

            if call.resolver.send(result).is_err() {
                debug!("Caller of {} went away before the response", id);
            }
        }
        Frame::Event { event, payload } => {
            let report = events.publish(PushEvent::new(event, payload));
            if !report.is_clean() {
                warn!("{} event listener(s) panicked", report.panicked);
            }
        }
        Frame::Request { command, .. } => {
            warn!("Ignoring backend-initiated request '{}'", command);
        }
    }
}
