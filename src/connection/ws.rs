//! WebSocket implementation of the hub transport.
//!
//! One session = one background task owning the socket: it pumps inbound hub
//! frames into the session event channel, writes outbound invocations, and
//! runs the inner reconnect loop (capped exponential backoff) when an
//! established connection drops. The outer connect-retry loop in the manager
//! never reaches in here; a `connect` failure is simply returned.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::config::HubConfig;
use crate::errors::{AppError, AppResult};

use super::protocol::{self, HubMessage};
use super::retry::RetryConfig;
use super::transport::{HubSession, HubTransport, RawFrame, SessionEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection factory for a hub endpoint over WebSockets.
pub struct WebSocketTransport {
    url: String,
    retry: RetryConfig,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>, retry: RetryConfig) -> AppResult<Self> {
        Ok(Self {
            url: hub_ws_url(&url.into())?,
            retry,
        })
    }

    pub fn from_config(config: &HubConfig) -> AppResult<Self> {
        Self::new(
            config.hub_url.clone(),
            RetryConfig {
                max_attempts: config.max_reconnect_attempts,
                base_delay_ms: config.reconnect_base_delay_ms,
                max_delay_ms: config.reconnect_max_delay_ms,
                ..RetryConfig::default()
            },
        )
    }
}

#[async_trait]
impl HubTransport for WebSocketTransport {
    async fn connect(&self) -> AppResult<Box<dyn HubSession>> {
        let stream = open_and_handshake(&self.url).await?;

        let (event_tx, event_rx) = flume::unbounded();
        let (out_tx, out_rx) = flume::unbounded();
        tokio::spawn(run_session(
            self.url.clone(),
            self.retry.clone(),
            stream,
            event_tx,
            out_rx,
        ));

        Ok(Box::new(WebSocketSession {
            events: event_rx,
            outbound: out_tx,
        }))
    }
}

/// Map the configured endpoint to a WebSocket URL (the hub is addressed by
/// its https URL; the socket connects directly, no negotiation).
fn hub_ws_url(raw: &str) -> AppResult<String> {
    let url = url::Url::parse(raw).map_err(|e| AppError::InvalidHubUrl {
        url: raw.to_string(),
        source: Some(Box::new(e)),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(raw.to_string()),
        "https" => Ok(format!("wss{}", &raw["https".len()..])),
        "http" => Ok(format!("ws{}", &raw["http".len()..])),
        _ => Err(AppError::InvalidHubUrl {
            url: raw.to_string(),
            source: None,
        }),
    }
}

enum Outbound {
    Invoke(String),
    Close,
}

struct WebSocketSession {
    events: flume::Receiver<SessionEvent>,
    outbound: flume::Sender<Outbound>,
}

#[async_trait]
impl HubSession for WebSocketSession {
    fn events(&self) -> flume::Receiver<SessionEvent> {
        self.events.clone()
    }

    async fn invoke(&self, method: &str, arguments: Vec<Value>) -> AppResult<()> {
        let frame = protocol::encode_invocation(method, &arguments);
        self.outbound
            .send_async(Outbound::Invoke(frame))
            .await
            .map_err(|_| AppError::NotConnected)
    }

    async fn close(&self) -> AppResult<()> {
        // An already-dead session loop is fine; close is idempotent.
        let _ = self.outbound.send_async(Outbound::Close).await;
        Ok(())
    }
}

async fn open_and_handshake(url: &str) -> AppResult<WsStream> {
    let (mut stream, _response) = connect_async(url).await.map_err(|e| {
        AppError::connection_with_source(format!("failed to open WebSocket to {url}"), e)
    })?;

    stream
        .send(Message::Text(protocol::handshake_request()))
        .await
        .map_err(|e| AppError::connection_with_source("failed to send hub handshake", e))?;

    while let Some(message) = stream.next().await {
        let message =
            message.map_err(|e| AppError::connection_with_source("hub handshake failed", e))?;
        match message {
            Message::Text(text) => {
                let frame = text.trim_end_matches(protocol::RECORD_SEPARATOR);
                if let Some(error) = protocol::handshake_error(frame) {
                    return Err(AppError::Handshake { reason: error });
                }
                return Ok(stream);
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => {
                return Err(AppError::Handshake {
                    reason: format!("unexpected frame during handshake: {other:?}"),
                })
            }
        }
    }

    Err(AppError::Handshake {
        reason: "connection closed during handshake".to_string(),
    })
}

enum PumpOutcome {
    /// Established connection lost; inner reconnect applies
    Dropped(Option<String>),
    /// Session consumer hung up; tear down quietly
    ConsumerGone,
    /// Explicit close requested
    CloseRequested,
}

async fn run_session(
    url: String,
    retry: RetryConfig,
    mut stream: WsStream,
    events: flume::Sender<SessionEvent>,
    outbound: flume::Receiver<Outbound>,
) {
    loop {
        match pump(&mut stream, &events, &outbound).await {
            PumpOutcome::CloseRequested => {
                let _ = stream.close(None).await;
                let _ = events.send(SessionEvent::Closed { reason: None });
                return;
            }
            PumpOutcome::ConsumerGone => {
                let _ = stream.close(None).await;
                return;
            }
            PumpOutcome::Dropped(reason) => {
                warn!(?reason, "hub connection dropped");
                match reconnect(&url, &retry, &events).await {
                    Some(new_stream) => {
                        stream = new_stream;
                        if events.send(SessionEvent::Reconnected).is_err() {
                            return;
                        }
                    }
                    None => {
                        let _ = events.send(SessionEvent::Closed { reason });
                        return;
                    }
                }
            }
        }
    }
}

async fn pump(
    stream: &mut WsStream,
    events: &flume::Sender<SessionEvent>,
    outbound: &flume::Receiver<Outbound>,
) -> PumpOutcome {
    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    for frame in protocol::split_frames(&text) {
                        match protocol::parse_message(frame) {
                            Some(HubMessage::Invocation { target, arguments }) => {
                                match invocation_frame(&target, arguments) {
                                    Some(raw) => {
                                        if events.send(SessionEvent::Frame(raw)).is_err() {
                                            return PumpOutcome::ConsumerGone;
                                        }
                                    }
                                    None => debug!(%target, "ignoring unhandled hub target"),
                                }
                            }
                            Some(HubMessage::Ping) => {}
                            Some(HubMessage::Close { error }) => {
                                return PumpOutcome::Dropped(error);
                            }
                            Some(HubMessage::Other) | None => {}
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return PumpOutcome::Dropped(frame.map(|f| f.reason.to_string()));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return PumpOutcome::Dropped(Some(e.to_string())),
                None => return PumpOutcome::Dropped(None),
            },
            request = outbound.recv_async() => match request {
                Ok(Outbound::Invoke(frame)) => {
                    if let Err(e) = stream.send(Message::Text(frame)).await {
                        return PumpOutcome::Dropped(Some(e.to_string()));
                    }
                }
                Ok(Outbound::Close) | Err(_) => return PumpOutcome::CloseRequested,
            },
        }
    }
}

async fn reconnect(
    url: &str,
    retry: &RetryConfig,
    events: &flume::Sender<SessionEvent>,
) -> Option<WsStream> {
    for attempt in 0..retry.max_attempts {
        if events
            .send(SessionEvent::Reconnecting { attempt })
            .is_err()
        {
            return None;
        }
        tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
        match open_and_handshake(url).await {
            Ok(stream) => return Some(stream),
            Err(e) => debug!(attempt, "transport reconnect attempt failed: {e}"),
        }
    }
    None
}

/// All named inbound hub targets funnel into the same raw-frame path.
/// Group updates arrive as (groupName, payload); the rest carry the payload
/// as the first argument.
fn invocation_frame(target: &str, mut arguments: Vec<Value>) -> Option<RawFrame> {
    let value = match target {
        "ReceiveMessage" | "broadcastMessage" | "ReceiveNotification" => {
            if arguments.is_empty() {
                return None;
            }
            arguments.swap_remove(0)
        }
        "SubscribeToUniversalUpdates" => {
            if arguments.len() < 2 {
                return None;
            }
            arguments.swap_remove(1)
        }
        _ => return None,
    };

    Some(match value {
        Value::String(text) => RawFrame::Text(text),
        other => RawFrame::Structured(other),
    })
}
