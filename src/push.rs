//! Device push capability interface and subscription registration.
//!
//! The core treats the platform's push machinery as an opaque capability
//! provider: a query for whether permission can be requested, the current
//! permission state, and a request operation. All failures come back as
//! structured outcomes, never as errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::warn;

use crate::errors::{AppError, AppResult};

/// Backend endpoint handling push subscription management
const PUSH_ENDPOINT_GUID: &str = "e4e54196-ebb0-4976-8e77-14220589059c";

/// Current notification permission, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Default,
    Granted,
    Denied,
    Unsupported,
}

/// Whether a permission request is worth attempting on this device.
#[derive(Debug, Clone)]
pub struct CapabilityCheck {
    pub can_request: bool,
    pub reason: Option<String>,
}

/// Structured result of a push operation; never thrown.
#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl PushOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Capability provider for device push permissions.
#[async_trait]
pub trait PushPermission: Send + Sync {
    /// Can a permission request be made at all, and if not, why not
    fn capability(&self) -> CapabilityCheck;

    /// Current permission state
    fn permission_state(&self) -> PermissionState;

    /// Ask the platform for permission and subscribe.
    async fn request(&self) -> PushOutcome;
}

/// Stub for environments without a push API (headless, CLI).
pub struct UnsupportedPush;

#[async_trait]
impl PushPermission for UnsupportedPush {
    fn capability(&self) -> CapabilityCheck {
        CapabilityCheck {
            can_request: false,
            reason: Some("no-notification-api".to_string()),
        }
    }

    fn permission_state(&self) -> PermissionState {
        PermissionState::Unsupported
    }

    async fn request(&self) -> PushOutcome {
        PushOutcome::failed("Notifications not supported")
    }
}

/// Subscription keys produced by a successful platform subscribe.
#[derive(Debug, Clone)]
pub struct PushSubscriptionKeys {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

/// Registers push subscriptions with the membership backend.
pub struct PushRegistrar {
    client: reqwest::Client,
    base_url: String,
    wallet_guid: String,
}

impl PushRegistrar {
    pub fn new(base_url: impl Into<String>, wallet_guid: impl Into<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("hublink/0.1.0")
            .build()
            .map_err(|e| AppError::connection_with_source("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            wallet_guid: wallet_guid.into(),
        })
    }

    /// Register a subscription with the backend. Failures come back as a
    /// structured outcome and are logged, never raised.
    pub async fn register(&self, keys: &PushSubscriptionKeys) -> PushOutcome {
        let payload = json!({
            "@TargetWalletGUID": self.wallet_guid,
            "@ManageSubscription": 1,
            "@endpoint": keys.endpoint,
            "@p256dh": keys.p256dh,
            "@auth": keys.auth,
        });
        let body = json!({
            "endPointGUID": PUSH_ENDPOINT_GUID,
            "additionalPayload": payload,
        });

        let url = format!("{}/api/universalapi/process", self.base_url);
        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => PushOutcome::ok(),
            Ok(response) => {
                let status = response.status();
                warn!(%status, "push subscription registration rejected");
                PushOutcome::failed(format!("HTTP {status}"))
            }
            Err(e) => {
                let err = AppError::from(e);
                warn!(category = err.category(), "push subscription registration failed: {err}");
                PushOutcome::failed(err.to_string())
            }
        }
    }
}
