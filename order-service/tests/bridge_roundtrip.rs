use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use order_service::message::{
    BridgeConfig, BridgeError, Consumer, Envelope, MemoryBroker, MessageBus, OperationError,
    Producer, Reply, RequestBridge, StartPosition, Subscription, SubscribeTiming, TopicPair,
    TransportError, operation_fn,
};
use serde_json::{Value, json};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn doubling_topics() -> TopicPair {
    TopicPair::new("double", "double_response")
}

/// Parses a numeric string and answers with twice the value, as a string
fn doubling() -> Arc<dyn order_service::message::Operation> {
    operation_fn(|payload: Value| async move {
        let n: i64 = payload
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| OperationError::validation(format!("not a number: {payload}")))?;
        Ok::<_, OperationError>(json!((n * 2).to_string()))
    })
}

/// Wait until `count` subscriptions are live on `topic`
async fn wait_for_subscribers(broker: &MemoryBroker, topic: &str, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while broker.subscriber_count(topic) != count {
        assert!(Instant::now() < deadline, "subscriber count on {topic} never reached {count}");
        sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_call_returns_responder_reply() {
    let broker = MemoryBroker::new();
    let bus = MessageBus::in_memory(broker.clone());
    let topics = doubling_topics();
    let handle = bus
        .responder()
        .spawn(topics.clone(), doubling(), CancellationToken::new())
        .await
        .unwrap();

    let bridge = bus.bridge(BridgeConfig::default());
    let reply = bridge
        .call_raw("5", &topics, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply, Reply::success(json!("10")));

    let typed: String = bridge.call("21", &topics, Duration::from_secs(1)).await.unwrap();
    assert_eq!(typed, "42");

    let stats = handle.stop().await;
    assert_eq!(stats.handled, 2);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn test_failure_reply_is_a_value() {
    let broker = MemoryBroker::new();
    let bus = MessageBus::in_memory(broker.clone());
    let topics = TopicPair::new("lookup", "lookup_response");
    let handle = bus
        .responder()
        .spawn(
            topics.clone(),
            operation_fn(|payload: Value| async move {
                Err::<Value, _>(OperationError::not_found(format!(
                    "Order {} is not found",
                    payload.as_str().unwrap_or_default()
                )))
            }),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let bridge = bus.bridge(BridgeConfig::default());
    let reply = bridge
        .call_raw("missing", &topics, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply, Reply::failure("Order missing is not found"));

    // The typed call surfaces the same text as a remote error
    let err = bridge
        .call::<_, Value>("missing", &topics, Duration::from_secs(1))
        .await
        .unwrap_err();
    match err {
        BridgeError::Remote(reason) => assert_eq!(reason, "Order missing is not found"),
        other => panic!("expected remote error, got {other:?}"),
    }

    let stats = handle.stop().await;
    assert_eq!(stats.failed, 2);
}

#[tokio::test]
async fn test_timeout_releases_subscription() {
    let broker = MemoryBroker::new();
    let bus = MessageBus::in_memory(broker.clone());
    let topics = doubling_topics();
    let bridge = bus.bridge(BridgeConfig::default());

    // Nobody is listening on the request topic
    let started = Instant::now();
    let err = bridge
        .call_raw("5", &topics, Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Timeout(_)));
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(broker.subscriber_count(&topics.response), 0);

    // The same topic pair works once a responder shows up
    let handle = bus
        .responder()
        .spawn(topics.clone(), doubling(), CancellationToken::new())
        .await
        .unwrap();
    let reply = bridge
        .call_raw("5", &topics, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply, Reply::success(json!("10")));
    handle.stop().await;
}

#[derive(Debug)]
struct FailingProducer;

#[async_trait]
impl Producer for FailingProducer {
    async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<u64, TransportError> {
        Err(TransportError::Publish("broker unreachable".into()))
    }
}

#[derive(Debug)]
struct CountingConsumer {
    broker: MemoryBroker,
    subscribes: AtomicUsize,
}

#[async_trait]
impl Consumer for CountingConsumer {
    async fn subscribe(
        &self,
        topic: &str,
        start: StartPosition,
    ) -> Result<Box<dyn Subscription>, TransportError> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        self.broker.subscribe(topic, start).await
    }
}

#[tokio::test]
async fn test_publish_failure_returns_without_waiting() {
    let broker = MemoryBroker::new();
    let consumer = Arc::new(CountingConsumer {
        broker: broker.clone(),
        subscribes: AtomicUsize::new(0),
    });
    let topics = doubling_topics();

    for timing in [SubscribeTiming::BeforePublish, SubscribeTiming::AfterPublish] {
        let bridge = RequestBridge::with_config(
            Arc::new(FailingProducer),
            consumer.clone(),
            BridgeConfig {
                subscribe_timing: timing,
                ..BridgeConfig::default()
            },
        );

        let started = Instant::now();
        let err = bridge
            .call_raw("5", &topics, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(
            matches!(err, BridgeError::Transport(TransportError::Publish(_))),
            "unexpected error: {err:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(broker.subscriber_count(&topics.response), 0);
    }

    // Publish-first never opens the response subscription at all
    assert_eq!(consumer.subscribes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_uncorrelated_replies_are_skipped() {
    let broker = MemoryBroker::new();
    let bus = MessageBus::in_memory(broker.clone());
    let topics = doubling_topics();
    let mut requests = broker
        .subscribe_topic(&topics.request, StartPosition::Latest)
        .unwrap();

    let bridge = bus.bridge(BridgeConfig::default());
    let call = {
        let topics = topics.clone();
        tokio::spawn(async move { bridge.call_raw("5", &topics, Duration::from_secs(2)).await })
    };

    let record = requests.recv().await.unwrap().unwrap();
    let request = Envelope::from_bytes(&record.payload).unwrap();

    // A stale reply for some earlier request, then garbage, then the real one
    let stale = Envelope::reply(Uuid::new_v4(), &Reply::success(json!("stale"))).unwrap();
    broker
        .publish_record(&topics.response, stale.to_bytes().unwrap())
        .unwrap();
    broker
        .publish_record(&topics.response, b"not json".to_vec())
        .unwrap();
    let real = Envelope::reply(request.request_id, &Reply::success(json!("10"))).unwrap();
    broker
        .publish_record(&topics.response, real.to_bytes().unwrap())
        .unwrap();

    let reply = call.await.unwrap().unwrap();
    assert_eq!(reply, Reply::success(json!("10")));
}

#[tokio::test]
async fn test_delivery_error_fails_the_call() {
    let broker = MemoryBroker::new();
    let bus = MessageBus::in_memory(broker.clone());
    let topics = doubling_topics();
    let bridge = bus.bridge(BridgeConfig::default());

    let call = {
        let topics = topics.clone();
        tokio::spawn(async move { bridge.call_raw("5", &topics, Duration::from_secs(2)).await })
    };

    wait_for_subscribers(&broker, &topics.response, 1).await;
    assert_eq!(broker.inject_fault(&topics.response, "partition offline"), 1);

    let err = call.await.unwrap().unwrap_err();
    match err {
        BridgeError::Transport(TransportError::Delivery(reason)) => {
            assert_eq!(reason, "partition offline")
        }
        other => panic!("expected delivery error, got {other:?}"),
    }
    assert_eq!(broker.subscriber_count(&topics.response), 0);
}

#[tokio::test]
async fn test_broker_shutdown_ends_waiting_call() {
    let broker = MemoryBroker::new();
    let bus = MessageBus::in_memory(broker.clone());
    let topics = doubling_topics();
    let bridge = bus.bridge(BridgeConfig::default());

    let call = {
        let topics = topics.clone();
        tokio::spawn(async move { bridge.call_raw("5", &topics, Duration::from_secs(5)).await })
    };
    wait_for_subscribers(&broker, &topics.response, 1).await;

    bus.shutdown().await;
    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, BridgeError::Transport(TransportError::Closed)));
}

#[tokio::test]
async fn test_responder_survives_delivery_errors() {
    let broker = MemoryBroker::new();
    let bus = MessageBus::in_memory(broker.clone());
    let topics = doubling_topics();
    let handle = bus
        .responder()
        .spawn(topics.clone(), doubling(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(broker.inject_fault(&topics.request, "transient"), 1);
    // Malformed request: no request id, so no reply
    broker
        .publish_record(&topics.request, b"{broken".to_vec())
        .unwrap();

    let bridge = bus.bridge(BridgeConfig::default());
    let reply = bridge
        .call_raw("7", &topics, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply, Reply::success(json!("14")));

    let stats = handle.stop().await;
    assert_eq!(stats.delivery_errors, 1);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.handled, 1);
}

#[tokio::test]
async fn test_responder_stops_on_cancel() {
    let broker = MemoryBroker::new();
    let bus = MessageBus::in_memory(broker.clone());
    let topics = doubling_topics();
    let shutdown = CancellationToken::new();
    let handle = bus
        .responder()
        .spawn(topics.clone(), doubling(), shutdown.clone())
        .await
        .unwrap();
    assert_eq!(broker.subscriber_count(&topics.request), 1);

    shutdown.cancel();
    wait_for_subscribers(&broker, &topics.request, 0).await;

    let stats = handle.stop().await;
    assert_eq!(stats.handled, 0);
}

#[tokio::test]
async fn test_concurrent_calls_share_response_topic() {
    let broker = MemoryBroker::new();
    let bus = MessageBus::in_memory(broker.clone());
    let topics = doubling_topics();
    let handle = bus
        .responder()
        .spawn(topics.clone(), doubling(), CancellationToken::new())
        .await
        .unwrap();
    let bridge = bus.bridge(BridgeConfig::default());

    let calls = (0..16i64).map(|n| {
        let bridge = bridge.clone();
        let topics = topics.clone();
        tokio::spawn(async move {
            let doubled: String = bridge
                .call(&n.to_string(), &topics, Duration::from_secs(2))
                .await
                .unwrap();
            (n, doubled)
        })
    });

    for (n, doubled) in futures::future::join_all(calls).await.into_iter().map(Result::unwrap) {
        assert_eq!(doubled, (n * 2).to_string());
    }
    assert_eq!(handle.stop().await.handled, 16);
}

#[tokio::test]
async fn test_publish_first_with_earliest_sees_fast_reply() {
    let broker = MemoryBroker::new();
    let bus = MessageBus::in_memory(broker.clone());
    let topics = doubling_topics();
    let handle = bus
        .responder()
        .spawn(topics.clone(), doubling(), CancellationToken::new())
        .await
        .unwrap();

    let bridge = bus.bridge(BridgeConfig {
        start_position: StartPosition::Earliest,
        subscribe_timing: SubscribeTiming::AfterPublish,
        ..BridgeConfig::default()
    });
    let reply = bridge
        .call_raw("4", &topics, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply, Reply::success(json!("8")));
    handle.stop().await;
}
