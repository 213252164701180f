//! Service composition root.
//!
//! `HubService` wires storage, the gateway, the notification store, the
//! toast dispatcher, and the connection manager into one object. Everything
//! is constructor-injected so tests can swap the transport or storage; the
//! process-wide instance is opt-in via `init_global`.

use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use tracing::info;

use crate::classify;
use crate::config::Config;
use crate::connection::ws::WebSocketTransport;
use crate::connection::{
    ConnectionManager, EventFilter, EventSubscription, HubEvent, HubTransport,
};
use crate::errors::{AppError, AppResult};
use crate::gateway::MessageGateway;
use crate::notifications::NotificationStore;
use crate::push::PushRegistrar;
use crate::storage::{FileStorage, KeyValueStorage};
use crate::toast::ToastDispatcher;

static GLOBAL: OnceCell<Arc<HubService>> = OnceCell::new();

/// The fully wired client: one of these per hub connection.
pub struct HubService {
    config: Config,
    storage: Arc<dyn KeyValueStorage>,
    gateway: Arc<MessageGateway>,
    notifications: Arc<NotificationStore>,
    toasts: Arc<ToastDispatcher>,
    connection: ConnectionManager,
    push: Option<Arc<PushRegistrar>>,
    toast_bridge: Mutex<Option<EventSubscription>>,
}

impl HubService {
    /// Wire a service from its parts. Installs the stock cache rules and
    /// loads persisted notifications before returning.
    pub fn new(
        config: Config,
        storage: Arc<dyn KeyValueStorage>,
        transport: Arc<dyn HubTransport>,
    ) -> AppResult<Arc<Self>> {
        let gateway = Arc::new(MessageGateway::new(Arc::clone(&storage)));
        gateway.register_default_rules()?;

        let notifications = Arc::new(NotificationStore::new(
            Arc::clone(&storage),
            &config.notifications,
        ));
        notifications.load();

        let toasts = Arc::new(ToastDispatcher::new(
            Arc::clone(&notifications),
            config.toasts.default_duration_ms,
        ));

        let connection = ConnectionManager::new(transport, Arc::clone(&gateway), &config.hub);

        // Push registration is opt-in via the API base URL.
        let push = match &config.push.api_base_url {
            Some(base_url) => {
                let wallet = config.hub.wallet_guid.clone().unwrap_or_default();
                Some(Arc::new(PushRegistrar::new(base_url.clone(), wallet)?))
            }
            None => None,
        };

        Ok(Arc::new(Self {
            config,
            storage,
            gateway,
            notifications,
            toasts,
            connection,
            push,
            toast_bridge: Mutex::new(None),
        }))
    }

    /// Wire a service with file-backed storage and the WebSocket transport,
    /// the production arrangement.
    pub fn with_file_storage(config: Config) -> AppResult<Arc<Self>> {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(FileStorage::default_location()?);
        let transport: Arc<dyn HubTransport> =
            Arc::new(WebSocketTransport::from_config(&config.hub)?);
        Self::new(config, storage, transport)
    }

    /// Route every inbound message through the toast classifier. Idempotent;
    /// a second call keeps the existing bridge.
    pub fn attach_toast_bridge(self: &Arc<Self>) {
        let mut bridge = self.toast_bridge.lock().unwrap();
        if bridge.is_some() {
            return;
        }

        let toasts = Arc::clone(&self.toasts);
        let subscription = self.connection.on_event(
            EventFilter::Message,
            Arc::new(move |event| {
                if let HubEvent::Message(message) = event {
                    if let Some(draft) = classify::toast_for_message(message) {
                        toasts.show(draft);
                    }
                }
            }),
        );
        *bridge = Some(subscription);
        info!("toast bridge attached");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStorage> {
        &self.storage
    }

    pub fn gateway(&self) -> &Arc<MessageGateway> {
        &self.gateway
    }

    pub fn notifications(&self) -> &Arc<NotificationStore> {
        &self.notifications
    }

    pub fn toasts(&self) -> &Arc<ToastDispatcher> {
        &self.toasts
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// The push subscription registrar, when an API base URL is configured.
    pub fn push_registrar(&self) -> Option<&Arc<PushRegistrar>> {
        self.push.as_ref()
    }
}

/// Install `service` as the process-wide instance. Fails if one is already
/// installed.
pub fn init_global(service: Arc<HubService>) -> AppResult<()> {
    GLOBAL
        .set(service)
        .map_err(|_| AppError::internal("hub service already initialized"))
}

/// The process-wide instance, if `init_global` has been called.
pub fn global() -> Option<Arc<HubService>> {
    GLOBAL.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::HubSession;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;

    struct DeadTransport;

    #[async_trait]
    impl HubTransport for DeadTransport {
        async fn connect(&self) -> AppResult<Box<dyn HubSession>> {
            Err(AppError::connection("transport unavailable"))
        }
    }

    #[tokio::test]
    async fn test_new_installs_default_rules() {
        let service = HubService::new(
            Config::default(),
            Arc::new(MemoryStorage::new()),
            Arc::new(DeadTransport),
        )
        .unwrap();

        let ids: Vec<String> = service
            .gateway()
            .rules()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert!(ids.contains(&"cache-walletsiamadminfor".to_string()));
        assert!(ids.contains(&"cache-buddieslist".to_string()));
    }

    #[tokio::test]
    async fn test_push_registrar_follows_config() {
        let service = HubService::new(
            Config::default(),
            Arc::new(MemoryStorage::new()),
            Arc::new(DeadTransport),
        )
        .unwrap();
        assert!(service.push_registrar().is_none());

        let mut config = Config::default();
        config.push.api_base_url = Some("https://api.example.com".to_string());
        config.hub.wallet_guid = Some("WALLET-1".to_string());
        let service = HubService::new(
            config,
            Arc::new(MemoryStorage::new()),
            Arc::new(DeadTransport),
        )
        .unwrap();
        assert!(service.push_registrar().is_some());
    }

    #[tokio::test]
    async fn test_toast_bridge_attaches_once() {
        let service = HubService::new(
            Config::default(),
            Arc::new(MemoryStorage::new()),
            Arc::new(DeadTransport),
        )
        .unwrap();

        service.attach_toast_bridge();
        service.attach_toast_bridge();
        assert!(service.toast_bridge.lock().unwrap().is_some());
    }
}
