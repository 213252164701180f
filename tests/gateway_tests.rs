//! Integration tests for the rules-dispatch pipeline.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use hublink::gateway::{MessageGateway, MessageSource, Rule, RuleContext, RuleHandler};
use hublink::storage::{KeyValueStorage, MemoryStorage};

fn recording_handler(tx: flume::Sender<&'static str>, tag: &'static str) -> RuleHandler {
    Arc::new(move |_ctx| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send_async(tag).await;
            Ok(())
        })
    })
}

async fn recv(rx: &flume::Receiver<&'static str>) -> &'static str {
    tokio::time::timeout(Duration::from_secs(2), rx.recv_async())
        .await
        .expect("handler did not run")
        .expect("channel closed")
}

#[tokio::test]
async fn test_handlers_run_in_ascending_priority_order() {
    let gateway = MessageGateway::new(Arc::new(MemoryStorage::new()));
    let (tx, rx) = flume::unbounded();

    // Registered out of order on purpose.
    gateway
        .register(
            Rule::new("late", recording_handler(tx.clone(), "late"))
                .match_type_name("OrderCheck")
                .with_priority(5),
        )
        .unwrap();
    gateway
        .register(
            Rule::new("early", recording_handler(tx.clone(), "early"))
                .match_type_name("OrderCheck")
                .with_priority(-1),
        )
        .unwrap();
    gateway
        .register(
            Rule::new("middle", recording_handler(tx, "middle"))
                .match_type_name("OrderCheck"),
        )
        .unwrap();

    gateway.process_message(
        &json!({ "action": [{ "valueTypeName": "OrderCheck" }], "value": [1] }),
        MessageSource::Hub,
    );

    assert_eq!(recv(&rx).await, "early");
    assert_eq!(recv(&rx).await, "middle");
    assert_eq!(recv(&rx).await, "late");
}

#[tokio::test]
async fn test_failing_handler_does_not_stop_siblings() {
    let gateway = MessageGateway::new(Arc::new(MemoryStorage::new()));
    let (tx, rx) = flume::unbounded();

    let failing: RuleHandler = Arc::new(|_ctx| {
        Box::pin(async { Err(hublink::AppError::internal("boom")) })
    });
    gateway
        .register(
            Rule::new("failing", failing)
                .match_type_name("Fanout")
                .with_priority(0),
        )
        .unwrap();
    gateway
        .register(
            Rule::new("healthy", recording_handler(tx, "healthy"))
                .match_type_name("Fanout")
                .with_priority(1),
        )
        .unwrap();

    gateway.process_message(
        &json!({ "action": [{ "valueTypeName": "Fanout" }], "value": [] }),
        MessageSource::Hub,
    );

    assert_eq!(recv(&rx).await, "healthy");
}

#[tokio::test]
async fn test_panicking_handler_does_not_stop_siblings() {
    let gateway = MessageGateway::new(Arc::new(MemoryStorage::new()));
    let (tx, rx) = flume::unbounded();

    let panicking: RuleHandler = Arc::new(|_ctx| {
        Box::pin(async { panic!("handler bug") })
    });
    gateway
        .register(
            Rule::new("panicking", panicking)
                .match_type_name("Fanout")
                .with_priority(0),
        )
        .unwrap();
    gateway
        .register(
            Rule::new("survivor", recording_handler(tx, "survivor"))
                .match_type_name("Fanout")
                .with_priority(1),
        )
        .unwrap();

    gateway.process_message(
        &json!({ "action": [{ "valueTypeName": "Fanout" }], "value": [] }),
        MessageSource::Hub,
    );

    assert_eq!(recv(&rx).await, "survivor");
}

#[tokio::test]
async fn test_match_keys_are_case_insensitive() {
    let gateway = MessageGateway::new(Arc::new(MemoryStorage::new()));
    let (tx, rx) = flume::unbounded();

    gateway
        .register(
            Rule::new("r1", recording_handler(tx, "hit")).match_type_name("BUDDIESLIST"),
        )
        .unwrap();

    gateway.process_message(
        &json!({ "action": [{ "valueTypeName": "buddiesList" }], "value": [1] }),
        MessageSource::Hub,
    );

    assert_eq!(recv(&rx).await, "hit");
}

#[tokio::test]
async fn test_end_to_end_buddy_request_dispatch() {
    let gateway = MessageGateway::new(Arc::new(MemoryStorage::new()));
    let (tx, rx) = flume::unbounded::<RuleContext>();

    let capturing: RuleHandler = Arc::new(move |ctx| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send_async(ctx).await;
            Ok(())
        })
    });
    gateway
        .register(Rule::new("buddy", capturing).match_type_name("buddyrequest"))
        .unwrap();

    let normalized = gateway
        .process_message(
            &json!({
                "action": [{ "valueTypeName": "BuddyRequest" }],
                "value": [{ "name": "Sam" }],
            }),
            MessageSource::Hub,
        )
        .unwrap();
    assert_eq!(
        normalized
            .action
            .as_ref()
            .unwrap()
            .value_type_name
            .as_deref(),
        Some("BuddyRequest")
    );

    let ctx = tokio::time::timeout(Duration::from_secs(2), rx.recv_async())
        .await
        .expect("rule never fired")
        .unwrap();
    assert_eq!(
        ctx.action.unwrap().value_type_name.as_deref(),
        Some("BuddyRequest")
    );
    assert_eq!(ctx.values, vec![json!({ "name": "Sam" })]);
    assert_eq!(ctx.source, MessageSource::Hub);
}

#[tokio::test]
async fn test_cache_rule_persists_values_with_timestamp() {
    let storage = Arc::new(MemoryStorage::new());
    let gateway = MessageGateway::new(storage.clone() as Arc<dyn KeyValueStorage>);
    gateway.register_cache_rule("BuddiesList", "buddies").unwrap();

    gateway.process_message(
        &json!({
            "action": [{ "valueTypeName": "BuddiesList" }],
            "value": [{ "name": "Sam" }, { "name": "Ada" }],
        }),
        MessageSource::Hub,
    );

    // Dispatch is detached; poll for the write.
    let mut cached = None;
    for _ in 0..100 {
        if let Some(raw) = storage.get("buddies").unwrap() {
            cached = Some(raw);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let cached: serde_json::Value =
        serde_json::from_str(&cached.expect("cache rule never wrote")).unwrap();
    assert_eq!(cached["data"].as_array().unwrap().len(), 2);
    assert!(cached["timestamp"].is_string());
}

#[tokio::test]
async fn test_cache_rule_skips_empty_payloads() {
    let storage = Arc::new(MemoryStorage::new());
    let gateway = MessageGateway::new(storage.clone() as Arc<dyn KeyValueStorage>);
    gateway.register_cache_rule("BuddiesList", "buddies").unwrap();

    gateway.process_message(
        &json!({ "action": [{ "valueTypeName": "BuddiesList" }], "value": [] }),
        MessageSource::Hub,
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(storage.get("buddies").unwrap().is_none());
}

#[tokio::test]
async fn test_unmatched_message_runs_nothing() {
    let gateway = MessageGateway::new(Arc::new(MemoryStorage::new()));
    let (tx, rx) = flume::unbounded();
    gateway
        .register(Rule::new("r1", recording_handler(tx, "hit")).match_type_name("Wanted"))
        .unwrap();

    gateway.process_message(
        &json!({ "action": [{ "valueTypeName": "Unwanted" }], "value": [1] }),
        MessageSource::Hub,
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
}
