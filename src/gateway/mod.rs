//! Message gateway: normalization plus a prioritized rules engine.
//!
//! Rules are (match key, handler, priority) tuples keyed by id. Dispatch is
//! fire-and-forget: matching handlers run detached from the caller, each
//! isolated so one failing rule never affects its siblings or the next
//! message. `process_message` is the single entry point combining
//! normalize + dispatch.

pub mod normalize;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::errors::{AppError, AppResult};
use crate::storage::KeyValueStorage;

pub use normalize::{normalize, ActionMetadata, MessageSource, NormalizedMessage};

/// Everything a rule handler receives for one invocation.
#[derive(Debug, Clone)]
pub struct RuleContext {
    pub action: Option<ActionMetadata>,
    pub values: Vec<Value>,
    pub source: MessageSource,
    pub message: NormalizedMessage,
}

/// Boxed async rule handler. Failures are logged with the rule id and never
/// propagate.
pub type RuleHandler =
    Arc<dyn Fn(RuleContext) -> BoxFuture<'static, AppResult<()>> + Send + Sync>;

/// A registered rule. Match keys are case-folded at registration time; a rule
/// matches when *either* key equals the corresponding action field.
#[derive(Clone)]
pub struct Rule {
    pub id: String,
    pub value_type: Option<String>,
    pub value_type_name: Option<String>,
    pub priority: i32,
    pub handler: RuleHandler,
}

impl Rule {
    /// Start building a rule; add at least one match key before registering.
    pub fn new(id: impl Into<String>, handler: RuleHandler) -> Self {
        Self {
            id: id.into(),
            value_type: None,
            value_type_name: None,
            priority: 0,
            handler,
        }
    }

    /// Match on the numeric/odd-ball type code
    pub fn match_value_type(mut self, value_type: impl Into<String>) -> Self {
        self.value_type = Some(value_type.into());
        self
    }

    /// Match on the human-readable type name
    pub fn match_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.value_type_name = Some(type_name.into());
        self
    }

    /// Lower priorities run first; the default is 0.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("value_type", &self.value_type)
            .field("value_type_name", &self.value_type_name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Read-only snapshot of a registered rule, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleInfo {
    pub id: String,
    pub value_type: Option<String>,
    pub value_type_name: Option<String>,
    pub priority: i32,
}

/// Handle returned by registration; `unregister` removes the rule by id.
#[derive(Debug)]
pub struct RuleHandle {
    id: String,
    rules: Weak<Mutex<HashMap<String, Rule>>>,
}

impl RuleHandle {
    /// The registered rule's id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Remove the rule. Returns false if it was already gone (or replaced).
    pub fn unregister(&self) -> bool {
        match self.rules.upgrade() {
            Some(rules) => rules.lock().unwrap().remove(&self.id).is_some(),
            None => false,
        }
    }
}

/// The rules-dispatch service.
pub struct MessageGateway {
    rules: Arc<Mutex<HashMap<String, Rule>>>,
    storage: Arc<dyn KeyValueStorage>,
}

impl MessageGateway {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            rules: Arc::new(Mutex::new(HashMap::new())),
            storage,
        }
    }

    /// Register a rule. Registering a duplicate id replaces the prior rule.
    ///
    /// # Errors
    ///
    /// Fails when the id is empty or neither match key is set; these are
    /// setup-time programming mistakes and are surfaced synchronously.
    pub fn register(&self, mut rule: Rule) -> AppResult<RuleHandle> {
        if rule.id.is_empty() {
            return Err(AppError::rule_registration("rule must have an id"));
        }
        if rule.value_type.is_none() && rule.value_type_name.is_none() {
            return Err(AppError::rule_registration(
                "rule must have either a value type or a type name",
            ));
        }

        rule.value_type = rule.value_type.map(|v| v.to_lowercase());
        rule.value_type_name = rule.value_type_name.map(|v| v.to_lowercase());

        let id = rule.id.clone();
        debug!(rule = %id, "registered rule");
        self.rules.lock().unwrap().insert(id.clone(), rule);

        Ok(RuleHandle {
            id,
            rules: Arc::downgrade(&self.rules),
        })
    }

    /// Remove a rule by id. Returns false if no such rule existed.
    pub fn unregister(&self, id: &str) -> bool {
        self.rules.lock().unwrap().remove(id).is_some()
    }

    /// Register a rule that caches matching values (plus a capture timestamp)
    /// under a persisted key. Last write wins, no merge.
    pub fn register_cache_rule(
        &self,
        type_name: &str,
        cache_key: &str,
    ) -> AppResult<RuleHandle> {
        let storage = Arc::clone(&self.storage);
        let key = cache_key.to_string();

        let handler: RuleHandler = Arc::new(move |ctx: RuleContext| {
            let storage = Arc::clone(&storage);
            let key = key.clone();
            Box::pin(async move {
                if ctx.values.is_empty() {
                    return Ok(());
                }
                let entry = json!({
                    "data": ctx.values,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                });
                storage.set(&key, &entry.to_string())
            })
        });

        self.register(
            Rule::new(format!("cache-{}", type_name.to_lowercase()), handler)
                .match_type_name(type_name)
                .with_priority(10),
        )
    }

    /// Register a diagnostic-only rule that logs matching messages.
    pub fn register_log_rule(&self, type_name: &str, label: Option<&str>) -> AppResult<RuleHandle> {
        let label = label.unwrap_or(type_name).to_string();

        let handler: RuleHandler = Arc::new(move |ctx: RuleContext| {
            let label = label.clone();
            Box::pin(async move {
                info!(
                    label = %label,
                    source = %ctx.source,
                    action = ?ctx.action,
                    value_count = ctx.values.len(),
                    "message"
                );
                Ok(())
            })
        });

        self.register(
            Rule::new(format!("log-{}", type_name.to_lowercase()), handler)
                .match_type_name(type_name),
        )
    }

    /// Install the stock cache rules for common message types.
    pub fn register_default_rules(&self) -> AppResult<()> {
        self.register_cache_rule("WalletsIAmAdminFor", "linkedAccounts")?;
        self.register_cache_rule("BuddiesList", "buddies")?;
        Ok(())
    }

    /// Normalize a raw payload and dispatch it through the rules, returning
    /// the normalized record. Rule handlers run detached; this never blocks
    /// on them and never fails because of them.
    pub fn process_message(
        &self,
        raw: &Value,
        source: MessageSource,
    ) -> Option<NormalizedMessage> {
        let normalized = normalize(raw, source)?;
        self.dispatch(&normalized);
        Some(normalized)
    }

    /// Fan a normalized message out to matching rules, ascending priority.
    pub fn dispatch(&self, message: &NormalizedMessage) {
        // No type information means no rule routing.
        let Some(action) = message.action.as_ref() else {
            return;
        };

        let value_type = action.value_type.as_deref().map(str::to_lowercase);
        let type_name = action.value_type_name.as_deref().map(str::to_lowercase);

        // Point-in-time snapshot: a concurrent unregister must not disturb
        // this dispatch, and a concurrent register must not receive it.
        let mut matched: Vec<Rule> = {
            let rules = self.rules.lock().unwrap();
            rules
                .values()
                .filter(|rule| {
                    let by_type = rule.value_type.is_some() && rule.value_type == value_type;
                    let by_name =
                        rule.value_type_name.is_some() && rule.value_type_name == type_name;
                    by_type || by_name
                })
                .cloned()
                .collect()
        };

        if matched.is_empty() {
            return;
        }
        matched.sort_by_key(|rule| rule.priority);

        let message = message.clone();
        tokio::spawn(async move {
            for rule in matched {
                let ctx = RuleContext {
                    action: message.action.clone(),
                    values: message.values.clone(),
                    source: message.source,
                    message: message.clone(),
                };
                // Each handler runs in its own task so a panic cannot take
                // down the remaining rules.
                let handler = Arc::clone(&rule.handler);
                let outcome = tokio::spawn(async move { handler(ctx).await }).await;
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(rule = %rule.id, "rule handler failed: {e}"),
                    Err(e) => error!(rule = %rule.id, "rule handler panicked: {e}"),
                }
            }
        });
    }

    /// Read-only snapshot of all registered rules.
    pub fn rules(&self) -> Vec<RuleInfo> {
        let rules = self.rules.lock().unwrap();
        let mut list: Vec<RuleInfo> = rules
            .values()
            .map(|rule| RuleInfo {
                id: rule.id.clone(),
                value_type: rule.value_type.clone(),
                value_type_name: rule.value_type_name.clone(),
                priority: rule.priority,
            })
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Remove all rules.
    pub fn clear(&self) {
        self.rules.lock().unwrap().clear();
        debug!("all rules cleared");
    }
}
