//! hublink: a real-time notification client for the membership hub.
//!
//! The crate maintains one persistent WebSocket session to the hub, passes
//! inbound payloads through a normalizer and a prioritized rules engine, and
//! feeds the results into ephemeral toasts and a bounded persisted
//! notification list.
//!
//! The `service` module wires the pieces together; everything else is usable
//! on its own with injected storage and transport.

pub mod classify;
pub mod config;
pub mod connection;
pub mod errors;
pub mod gateway;
pub mod notifications;
pub mod push;
pub mod service;
pub mod storage;
pub mod toast;

pub use config::{Config, ConfigManager};
pub use connection::{ConnectionManager, ConnectionState, EventFilter, HubEvent};
pub use errors::{AppError, AppResult};
pub use gateway::{MessageGateway, MessageSource, NormalizedMessage, Rule};
pub use notifications::{Notification, NotificationStore};
pub use service::HubService;
pub use toast::{Toast, ToastDispatcher};
