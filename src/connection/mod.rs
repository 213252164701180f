//! Hub connection lifecycle.
//!
//! The `ConnectionManager` owns one persistent session to the notification
//! hub: idempotent start/stop, an outer retry loop for initial-connect
//! failures, group (re)subscription after every (re)connect, the frame gate
//! in front of the normalizer, and a typed publish/subscribe surface for
//! consumers.
//!
//! Two retry layers exist and must stay separately bounded: the outer loop
//! here covers failures before the first successful connect; the transport's
//! inner loop covers drops after one.

pub mod protocol;
pub mod retry;
pub mod transport;
pub mod ws;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::HubConfig;
use crate::errors::{AppError, AppResult};
use crate::gateway::{MessageGateway, MessageSource, NormalizedMessage};

pub use transport::{HubSession, HubTransport, RawFrame, SessionEvent};

/// Universal wallet group every client joins alongside its own wallet group.
pub const UNIVERSAL_WALLET_GROUP: &str = "606763FB-3FFA-48B8-8A60-52B3D6977916";

/// Connection lifecycle state. Transitions are driven only by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Events broadcast to subscribers.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// A successfully normalized inbound message
    Message(NormalizedMessage),
    /// The connection state changed
    StateChanged {
        state: ConnectionState,
        reason: Option<String>,
    },
}

/// What a subscriber wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Every normalized inbound message
    Message,
    /// Only messages whose type name matches (case-insensitive)
    MessageType(String),
    /// Connection state transitions
    ConnectionState,
}

pub type EventHandler = Arc<dyn Fn(&HubEvent) + Send + Sync>;

type ListenerMap = HashMap<u64, (EventFilter, EventHandler)>;

/// Handle for an event subscription; dropping it does not unsubscribe.
pub struct EventSubscription {
    id: u64,
    listeners: Weak<Mutex<ListenerMap>>,
}

impl EventSubscription {
    /// Remove the subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        match self.listeners.upgrade() {
            Some(listeners) => listeners.lock().unwrap().remove(&self.id).is_some(),
            None => false,
        }
    }
}

struct ManagerShared {
    transport: Arc<dyn HubTransport>,
    gateway: Arc<MessageGateway>,
    wallet_group: Option<String>,
    max_connect_attempts: u32,
    connect_retry_delay: Duration,
    state: Mutex<ConnectionState>,
    connect_attempts: AtomicU32,
    session: tokio::sync::Mutex<Option<Arc<dyn HubSession>>>,
    listeners: Arc<Mutex<ListenerMap>>,
    next_listener: AtomicU64,
    retry_task: Mutex<Option<JoinHandle<()>>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the lifecycle of the persistent hub connection.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<ManagerShared>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn HubTransport>,
        gateway: Arc<MessageGateway>,
        config: &HubConfig,
    ) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                transport,
                gateway,
                wallet_group: config.wallet_guid.clone(),
                max_connect_attempts: config.max_connect_attempts,
                connect_retry_delay: Duration::from_millis(config.connect_retry_delay_ms),
                state: Mutex::new(ConnectionState::Disconnected),
                connect_attempts: AtomicU32::new(0),
                session: tokio::sync::Mutex::new(None),
                listeners: Arc::new(Mutex::new(HashMap::new())),
                next_listener: AtomicU64::new(0),
                retry_task: Mutex::new(None),
                reader_task: Mutex::new(None),
            }),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock().unwrap()
    }

    /// Connect to the hub. Idempotent: a no-op while connected or while an
    /// attempt is in flight. On failure, schedules a retry after a delay that
    /// grows with the attempt count, up to the configured cap; past the cap
    /// it stays down until `start` is called again.
    ///
    /// Boxed so the retry task can call back into it; the recursion needs a
    /// concrete `Send` future type.
    pub fn start(&self) -> BoxFuture<'_, AppResult<()>> {
        Box::pin(self.start_inner())
    }

    async fn start_inner(&self) -> AppResult<()> {
        {
            let mut state = self.shared.state.lock().unwrap();
            match *state {
                ConnectionState::Connected | ConnectionState::Connecting => return Ok(()),
                _ => *state = ConnectionState::Connecting,
            }
        }

        match self.shared.transport.connect().await {
            Ok(session) => {
                let session: Arc<dyn HubSession> = Arc::from(session);
                let events = session.events();
                self.shared.connect_attempts.store(0, Ordering::Relaxed);
                *self.shared.session.lock().await = Some(Arc::clone(&session));
                set_state(&self.shared, ConnectionState::Connected, None);
                join_groups(&self.shared, session.as_ref()).await;

                let shared = Arc::clone(&self.shared);
                let reader = tokio::spawn(async move { run_event_loop(shared, events).await });
                if let Some(stale) = self.shared.reader_task.lock().unwrap().replace(reader) {
                    stale.abort();
                }
                info!("connected to hub");
                Ok(())
            }
            Err(e) => {
                set_state(
                    &self.shared,
                    ConnectionState::Disconnected,
                    Some(e.to_string()),
                );
                let attempt = self.shared.connect_attempts.fetch_add(1, Ordering::Relaxed) + 1;
                if attempt < self.shared.max_connect_attempts {
                    let delay = self.shared.connect_retry_delay * attempt;
                    warn!(attempt, ?delay, "hub connect failed, retry scheduled: {e}");
                    let manager = self.clone();
                    let retry = tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if let Err(e) = manager.start().await {
                            debug!("scheduled connect attempt failed: {e}");
                        }
                    });
                    if let Some(stale) = self.shared.retry_task.lock().unwrap().replace(retry) {
                        stale.abort();
                    }
                    Err(e)
                } else {
                    error!(attempt, "hub connect failed, giving up until restarted: {e}");
                    Err(AppError::ConnectRetryExhausted { attempts: attempt })
                }
            }
        }
    }

    /// Tear down the connection. Idempotent and safe before any `start`;
    /// cancels a pending outer-loop retry.
    pub async fn stop(&self) -> AppResult<()> {
        if let Some(retry) = self.shared.retry_task.lock().unwrap().take() {
            retry.abort();
        }
        let session = self.shared.session.lock().await.take();
        if let Some(session) = session {
            if let Err(e) = session.close().await {
                debug!("error closing hub session: {e}");
            }
        }
        if let Some(reader) = self.shared.reader_task.lock().unwrap().take() {
            reader.abort();
        }
        self.shared.connect_attempts.store(0, Ordering::Relaxed);
        set_state(&self.shared, ConnectionState::Disconnected, None);
        Ok(())
    }

    /// Invoke a hub method. Fails fast when not connected; no queueing.
    pub async fn send(&self, method: &str, arguments: Vec<Value>) -> AppResult<()> {
        if self.state() != ConnectionState::Connected {
            return Err(AppError::NotConnected);
        }
        let session = self.shared.session.lock().await.clone();
        match session {
            Some(session) => session.invoke(method, arguments).await,
            None => Err(AppError::NotConnected),
        }
    }

    /// Subscribe to hub events. Type-name filters are case-folded.
    pub fn on_event(&self, filter: EventFilter, handler: EventHandler) -> EventSubscription {
        let filter = match filter {
            EventFilter::MessageType(name) => EventFilter::MessageType(name.to_lowercase()),
            other => other,
        };
        let id = self.shared.next_listener.fetch_add(1, Ordering::Relaxed);
        self.shared
            .listeners
            .lock()
            .unwrap()
            .insert(id, (filter, handler));
        EventSubscription {
            id,
            listeners: Arc::downgrade(&self.shared.listeners),
        }
    }
}

fn set_state(shared: &ManagerShared, new: ConnectionState, reason: Option<String>) {
    let changed = {
        let mut state = shared.state.lock().unwrap();
        if *state == new {
            false
        } else {
            *state = new;
            true
        }
    };
    if changed {
        emit(shared, &HubEvent::StateChanged { state: new, reason });
    }
}

/// Join the wallet group (when configured) and the universal group. Each join
/// is independent; a failure is logged and the remaining groups still join.
async fn join_groups(shared: &ManagerShared, session: &dyn HubSession) {
    let mut groups: Vec<String> = Vec::new();
    if let Some(wallet) = &shared.wallet_group {
        groups.push(wallet.clone());
    }
    groups.push(UNIVERSAL_WALLET_GROUP.to_string());

    for group in groups {
        match session
            .invoke("JoinGroup", vec![Value::String(group.clone())])
            .await
        {
            Ok(()) => debug!(%group, "joined hub group"),
            Err(e) => warn!(%group, "failed to join hub group: {e}"),
        }
    }
}

async fn run_event_loop(
    shared: Arc<ManagerShared>,
    events: flume::Receiver<SessionEvent>,
) {
    loop {
        match events.recv_async().await {
            Ok(SessionEvent::Frame(frame)) => handle_frame(&shared, frame),
            Ok(SessionEvent::Reconnecting { attempt }) => {
                warn!(attempt, "hub connection lost, transport reconnecting");
                set_state(&shared, ConnectionState::Reconnecting, None);
            }
            Ok(SessionEvent::Reconnected) => {
                info!("hub transport reconnected");
                set_state(&shared, ConnectionState::Connected, None);
                let session = shared.session.lock().await.clone();
                if let Some(session) = session {
                    join_groups(&shared, session.as_ref()).await;
                }
            }
            Ok(SessionEvent::Closed { reason }) => {
                set_state(&shared, ConnectionState::Disconnected, reason);
                break;
            }
            Err(_) => {
                set_state(&shared, ConnectionState::Disconnected, None);
                break;
            }
        }
    }
    shared.session.lock().await.take();
}

/// Gate raw frames into the normalizer. String frames are JSON-parsed only
/// when they look like JSON; anything else is transport control chatter and
/// dropped silently.
fn handle_frame(shared: &ManagerShared, frame: RawFrame) {
    let value = match frame {
        RawFrame::Structured(value) => value,
        RawFrame::Text(text) => {
            let trimmed = text.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                match serde_json::from_str::<Value>(&text) {
                    Ok(value) => value,
                    Err(e) => {
                        debug!("dropping undecodable frame: {e}");
                        return;
                    }
                }
            } else {
                debug!("ignoring non-JSON frame");
                return;
            }
        }
    };

    let Some(normalized) = shared.gateway.process_message(&value, MessageSource::Hub) else {
        return;
    };
    emit(shared, &HubEvent::Message(normalized));
}

/// Type-name tag for targeted subscription: the action's type name, falling
/// back to a top-level `type` field on the raw payload.
fn message_type_name(message: &NormalizedMessage) -> String {
    message
        .type_name()
        .or_else(|| {
            message
                .raw
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_lowercase)
        })
        .unwrap_or_else(|| "unknown".to_string())
}

fn emit(shared: &ManagerShared, event: &HubEvent) {
    let handlers: Vec<EventHandler> = {
        let listeners = shared.listeners.lock().unwrap();
        listeners
            .values()
            .filter(|(filter, _)| filter_matches(filter, event))
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    };
    for handler in handlers {
        handler(event);
    }
}

fn filter_matches(filter: &EventFilter, event: &HubEvent) -> bool {
    match (filter, event) {
        (EventFilter::Message, HubEvent::Message(_)) => true,
        (EventFilter::MessageType(name), HubEvent::Message(message)) => {
            *name == message_type_name(message)
        }
        (EventFilter::ConnectionState, HubEvent::StateChanged { .. }) => true,
        _ => false,
    }
}
