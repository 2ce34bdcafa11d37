mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use channelvisor::{
    ChannelEvent, ChannelKey, Config, ConnectionState, Delivery, EventKind, Frame, Inbound,
};
use common::*;
use serde_json::{Value, json};
use tokio::time::sleep;

fn change(key: &ChannelKey, operation: &str, payload: Value) -> Inbound {
    Inbound::Change {
        topic: key.topic(),
        operation: operation.to_string(),
        payload,
    }
}

fn counter() -> (Arc<AtomicUsize>, impl Fn(&ChannelEvent) + Send + Sync + 'static) {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    (hits, move |_ev: &ChannelEvent| {
        h.fetch_add(1, Ordering::SeqCst);
    })
}

fn messages(frames: &[Frame]) -> Vec<Value> {
    frames
        .iter()
        .filter_map(|f| match f {
            Frame::Message { payload, .. } => Some(payload.clone()),
            _ => None,
        })
        .collect()
}

fn messages_on(frames: &[Frame], key: &ChannelKey) -> Vec<Value> {
    let wanted = key.topic();
    frames
        .iter()
        .filter_map(|f| match f {
            Frame::Message { topic, payload } if *topic == wanted => Some(payload.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn inbound_bursts_are_throttled_per_window() {
    let mock = MockTransport::new([]);
    let sup = supervisor(quiet_config(), &mock);
    sup.connect().await.unwrap();

    let key = ChannelKey::orders("s1");
    let (hits, cb) = counter();
    sup.subscribe(key.clone(), cb);

    for n in 0..15 {
        mock.inject(0, change(&key, "UPDATE", json!({ "id": n, "status": "packed" })));
    }
    settle().await;
    assert_eq!(hits.load(Ordering::SeqCst), 10);
    assert_eq!(sup.channel_stats(&key).unwrap().throttled, 5);

    sleep(Duration::from_secs(1)).await;
    for n in 0..3 {
        mock.inject(0, change(&key, "UPDATE", json!({ "id": n })));
    }
    settle().await;
    assert_eq!(hits.load(Ordering::SeqCst), 13);
    sup.disconnect();
}

#[tokio::test(start_paused = true)]
async fn a_saturated_channel_does_not_throttle_its_neighbour() {
    let mock = MockTransport::new([]);
    let sup = supervisor(quiet_config(), &mock);
    sup.connect().await.unwrap();

    let busy = ChannelKey::orders("busy");
    let calm = ChannelKey::chat("calm");
    let (busy_hits, busy_cb) = counter();
    let (calm_hits, calm_cb) = counter();
    sup.subscribe(busy.clone(), busy_cb);
    sup.subscribe(calm.clone(), calm_cb);

    for n in 0..15 {
        mock.inject(0, change(&busy, "UPDATE", json!({ "id": n })));
    }
    for n in 0..10 {
        mock.inject(0, change(&calm, "UPDATE", json!({ "id": n })));
    }
    settle().await;

    assert_eq!(busy_hits.load(Ordering::SeqCst), 10);
    assert_eq!(sup.channel_stats(&busy).unwrap().throttled, 5);
    assert_eq!(calm_hits.load(Ordering::SeqCst), 10);
    assert_eq!(sup.channel_stats(&calm).unwrap().throttled, 0);
    sup.disconnect();
}

#[tokio::test(start_paused = true)]
async fn a_full_queue_does_not_evict_another_channel() {
    let mock = MockTransport::new([]);
    let cfg = Config {
        queue_capacity: 3,
        ..quiet_config()
    };
    let sup = supervisor(cfg, &mock);
    let full = ChannelKey::orders("full");
    let other = ChannelKey::chat("other");

    for n in 1..=5 {
        assert_eq!(sup.send(&full, json!(n)), Delivery::Queued);
    }
    for n in 1..=2 {
        assert_eq!(sup.send(&other, json!(n)), Delivery::Queued);
    }

    let payloads = |key: &ChannelKey| -> Vec<Value> {
        sup.queued(key).into_iter().map(|m| m.payload).collect()
    };
    assert_eq!(payloads(&full), vec![json!(3), json!(4), json!(5)]);
    assert_eq!(sup.channel_stats(&full).unwrap().evicted, 2);
    assert_eq!(payloads(&other), vec![json!(1), json!(2)]);
    assert_eq!(sup.channel_stats(&other).unwrap().evicted, 0);
    assert_eq!(sup.connection_state().queue_depth, 5);

    sup.connect().await.unwrap();
    settle().await;
    let frames = mock.drain(0);
    assert_eq!(messages_on(&frames, &full), vec![json!(3), json!(4), json!(5)]);
    assert_eq!(messages_on(&frames, &other), vec![json!(1), json!(2)]);
    assert_eq!(sup.connection_state().queue_depth, 0);
    sup.disconnect();
}

#[tokio::test(start_paused = true)]
async fn offline_queue_keeps_the_newest_messages() {
    let mock = MockTransport::new([]);
    let sup = supervisor(quiet_config(), &mock);
    let mut rx = sup.bus().subscribe();
    let key = ChannelKey::orders("s1");

    for n in 1..=150 {
        assert_eq!(sup.send(&key, json!(n)), Delivery::Queued);
    }

    let payloads: Vec<Value> = sup.queued(&key).into_iter().map(|m| m.payload).collect();
    let expected: Vec<Value> = (51..=150).map(|n| json!(n)).collect();
    assert_eq!(payloads, expected);

    let stats = sup.channel_stats(&key).unwrap();
    assert_eq!(stats.queued, 100);
    assert_eq!(stats.evicted, 50);
    assert_eq!(sup.connection_state().queue_depth, 100);

    let overflows = event_kinds(&mut rx)
        .into_iter()
        .filter(|k| *k == EventKind::QueueOverflow)
        .count();
    assert_eq!(overflows, 50);
}

#[tokio::test(start_paused = true)]
async fn queued_messages_flush_in_order_after_connect() {
    let mock = MockTransport::new([]);
    let sup = supervisor(quiet_config(), &mock);
    let key = ChannelKey::orders("s1");

    for n in 1..=3 {
        sup.send(&key, json!(n));
    }
    sup.connect().await.unwrap();
    settle().await;

    let frames = mock.drain(0);
    assert_eq!(frames[0], Frame::Join { topic: "orders:s1".into() });
    assert_eq!(messages(&frames), vec![json!(1), json!(2), json!(3)]);
    assert_eq!(sup.connection_state().queue_depth, 0);

    assert_eq!(sup.send(&key, json!(4)), Delivery::Sent);
    assert_eq!(
        mock.drain(0),
        vec![Frame::Message {
            topic: "orders:s1".into(),
            payload: json!(4)
        }]
    );
    sup.disconnect();
}

#[tokio::test(start_paused = true)]
async fn slow_link_never_reorders_messages() {
    let mock = MockTransport::with_capacity([], 2);
    let sup = supervisor(quiet_config(), &mock);
    let key = ChannelKey::chat("room-7");

    for n in 1..=5 {
        sup.send(&key, json!(n));
    }
    sup.connect().await.unwrap();
    // Still buffered behind the full link, so it must wait its turn.
    assert_eq!(sup.send(&key, json!(6)), Delivery::Queued);

    let mut frames = Vec::new();
    for _ in 0..50 {
        frames.extend(mock.drain(0));
        if messages(&frames).len() == 6 {
            break;
        }
        settle().await;
    }
    let expected: Vec<Value> = (1..=6).map(|n| json!(n)).collect();
    assert_eq!(messages(&frames), expected);
    assert_eq!(sup.connection_state().queue_depth, 0);
    sup.disconnect();
}

#[tokio::test(start_paused = true)]
async fn messages_sent_while_reconnecting_reach_the_next_link() {
    let mock = MockTransport::new([Outcome::Accept, Outcome::refused(), Outcome::Accept]);
    let sup = supervisor(quiet_config(), &mock);
    let key = ChannelKey::orders("s1");

    sup.connect().await.unwrap();
    mock.drop_link(0);
    settle().await;
    assert_eq!(sup.state(), ConnectionState::Reconnecting);

    assert_eq!(sup.send(&key, json!("a")), Delivery::Queued);
    assert_eq!(sup.send(&key, json!("b")), Delivery::Queued);

    // delay(1) after the loss, then delay(2) after the refused attempt.
    sleep(Duration::from_secs(5)).await;
    assert_eq!(sup.state(), ConnectionState::Connected);
    let frames = mock.drain(1);
    assert_eq!(frames[0], Frame::Join { topic: "orders:s1".into() });
    assert_eq!(messages(&frames), vec![json!("a"), json!("b")]);
    sup.disconnect();
}

#[tokio::test(start_paused = true)]
async fn last_unsubscribe_leaves_the_topic() {
    let mock = MockTransport::new([]);
    let sup = supervisor(quiet_config(), &mock);
    sup.connect().await.unwrap();

    let key = ChannelKey::orders("s2");
    let first = sup.subscribe(key.clone(), |_| {});
    let second = sup.subscribe(key.clone(), |_| {});
    assert_eq!(sup.channel_stats(&key).unwrap().subscribers, 2);

    sup.unsubscribe(first);
    assert_eq!(mock.drain(0), vec![Frame::Join { topic: "orders:s2".into() }]);

    sup.unsubscribe(second);
    assert_eq!(mock.drain(0), vec![Frame::Leave { topic: "orders:s2".into() }]);
    assert!(sup.channels().is_empty());
    sup.disconnect();
}

#[tokio::test(start_paused = true)]
async fn malformed_inbound_frames_are_dropped() {
    let mock = MockTransport::new([]);
    let sup = supervisor(quiet_config(), &mock);
    let mut rx = sup.bus().subscribe();
    sup.connect().await.unwrap();

    let key = ChannelKey::orders("s3");
    let (hits, cb) = counter();
    sup.subscribe(key.clone(), cb);

    mock.inject(0, change(&key, "UPSERT", json!({ "id": 1 })));
    mock.inject(0, change(&key, "UPDATE", json!("not an object")));
    mock.inject(
        0,
        Inbound::Change {
            topic: "bogus".into(),
            operation: "INSERT".into(),
            payload: json!({}),
        },
    );
    mock.inject(0, change(&key, "INSERT", json!({ "id": 2 })));
    settle().await;

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(sup.state(), ConnectionState::Connected);
    let dropped = event_kinds(&mut rx)
        .into_iter()
        .filter(|k| *k == EventKind::ProtocolDropped)
        .count();
    assert_eq!(dropped, 3);
    sup.disconnect();
}

#[tokio::test(start_paused = true)]
async fn filtered_subscription_sees_matching_events_only() {
    let mock = MockTransport::new([]);
    let sup = supervisor(quiet_config(), &mock);
    sup.connect().await.unwrap();

    let key = ChannelKey::orders("s4");
    let shipped = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = shipped.clone();
    sup.subscribe_filtered(
        key.clone(),
        |ev: &ChannelEvent| ev.record().field("status") == Some(&json!("shipped")),
        move |ev: &ChannelEvent| {
            assert!(matches!(ev, ChannelEvent::Order(_)));
            sink.lock().push(ev.record().field("id").cloned());
        },
    );

    mock.inject(0, change(&key, "UPDATE", json!({ "id": 1, "status": "packed" })));
    mock.inject(0, change(&key, "UPDATE", json!({ "id": 2, "status": "shipped" })));
    settle().await;

    assert_eq!(*shipped.lock(), vec![Some(json!(2))]);
    sup.disconnect();
}

fn faulty_callback(_ev: &ChannelEvent) {
    panic!("callback bug");
}

#[tokio::test(start_paused = true)]
async fn panicking_callback_does_not_starve_its_neighbours() {
    let mock = MockTransport::new([]);
    let sup = supervisor(quiet_config(), &mock);
    let mut rx = sup.bus().subscribe();
    sup.connect().await.unwrap();

    let key = ChannelKey::chat("room-1");
    let (hits, cb) = counter();
    sup.subscribe(key.clone(), faulty_callback);
    sup.subscribe(key.clone(), cb);

    mock.inject(0, change(&key, "INSERT", json!({ "text": "hi" })));
    mock.inject(0, change(&key, "INSERT", json!({ "text": "again" })));
    settle().await;

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(sup.state(), ConnectionState::Connected);
    let panics = event_kinds(&mut rx)
        .into_iter()
        .filter(|k| *k == EventKind::CallbackPanicked)
        .count();
    assert_eq!(panics, 2);
    sup.disconnect();
}

#[tokio::test(start_paused = true)]
async fn disconnect_discards_buffered_messages() {
    let mock = MockTransport::new([]);
    let sup = supervisor(quiet_config(), &mock);
    let key = ChannelKey::orders("s5");
    for n in 0..3 {
        sup.send(&key, json!(n));
    }
    sup.disconnect();

    assert!(sup.queued(&key).is_empty());
    assert!(sup.channels().is_empty());

    sup.connect().await.unwrap();
    settle().await;
    assert!(messages(&mock.drain(0)).is_empty());
    sup.disconnect();
}
