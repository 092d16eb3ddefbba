//! Topic router dispatch tests, standalone and wired to binders.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use stompbind::{
    listener, Bindable, Collection, Command, ConnectionState, Frame, MemoryBroker, MemoryClient,
    Outbound, RouterConfig, SubscriptionHandle, TopicRouter, Transport, CLIENT_ID_HEADER,
    FROM_SERVER_HEADER,
};

const PREFIX: &str = "/topic/backbonestomp";

fn message(suffix: &str, body: Value) -> Frame {
    Frame::message(
        &format!("{PREFIX}.todos.{suffix}"),
        serde_json::to_vec(&body).unwrap(),
    )
    .with_header(CLIENT_ID_HEADER, "browser-1")
}

fn connected_router() -> TopicRouter {
    let mut router = TopicRouter::new(RouterConfig::default());
    router.connecting();
    router.handle_frame(&Frame::new(Command::Connected)).unwrap();
    router
}

fn publication(out: &Outbound) -> (&str, Value, &[(String, String)]) {
    match out {
        Outbound::Publish {
            destination,
            body,
            headers,
        } => (
            destination.as_str(),
            serde_json::from_slice(body).unwrap(),
            headers.as_slice(),
        ),
        other => panic!("expected publish, got {other:?}"),
    }
}

// --- Dispatch ---

#[test]
fn test_create_assigns_sequential_ids_and_broadcasts_once() {
    let mut router = connected_router();
    let out = router
        .handle_frame(&message("create", json!([{"title": "a", "id": "x"}, {"title": "b"}])))
        .unwrap();

    assert_eq!(out.len(), 1);
    let (dest, body, headers) = publication(&out[0]);
    assert_eq!(dest, "/topic/backbonestomp.todos.create");
    assert_eq!(
        body,
        json!([{"title": "a", "id": "1"}, {"title": "b", "id": "2"}])
    );
    assert!(headers
        .iter()
        .any(|(k, v)| k == FROM_SERVER_HEADER && v == "true"));

    let store = router.store();
    assert_eq!(store.len(), 2);
    assert_eq!(Value::Object(store.get("1").unwrap().clone()), json!({"title": "a", "id": "1"}));
    assert_eq!(Value::Object(store.get("2").unwrap().clone()), json!({"title": "b", "id": "2"}));
}

#[test]
fn test_create_with_from_server_marker_is_ignored() {
    let mut router = connected_router();
    let frame = message("create", json!([{"title": "a"}])).with_header(FROM_SERVER_HEADER, "true");
    assert!(router.handle_frame(&frame).unwrap().is_empty());
    assert!(router.store().is_empty());
}

#[test]
fn test_update_merges_fields() {
    let mut router = connected_router();
    router
        .handle_frame(&message("create", json!([{"title": "x"}, {"title": "y"}, {"title": "a"}])))
        .unwrap();

    let out = router
        .handle_frame(&message("3.update", json!([{"title": "b"}])))
        .unwrap();
    assert!(out.is_empty());
    assert_eq!(
        Value::Object(router.store().get("3").unwrap().clone()),
        json!({"id": "3", "title": "b"})
    );
}

#[test]
fn test_update_cannot_change_id() {
    let mut router = connected_router();
    router.handle_frame(&message("create", json!([{"title": "a"}]))).unwrap();
    router
        .handle_frame(&message("1.update", json!([{"id": "9", "done": true}])))
        .unwrap();

    assert_eq!(
        Value::Object(router.store().get("1").unwrap().clone()),
        json!({"id": "1", "title": "a", "done": true})
    );
    assert!(router.store().get("9").is_none());
}

#[test]
fn test_update_missing_record_is_noop() {
    let mut router = connected_router();
    router.handle_frame(&message("create", json!([{"title": "a"}]))).unwrap();
    let out = router
        .handle_frame(&message("42.update", json!([{"title": "b"}])))
        .unwrap();
    assert!(out.is_empty());
    assert_eq!(router.store().len(), 1);
    assert_eq!(router.store().get("1").unwrap()["title"], "a");
}

#[test]
fn test_update_and_delete_match_id_exactly() {
    let mut router = connected_router();
    router.handle_frame(&message("create", json!([{"title": "a"}]))).unwrap();

    router
        .handle_frame(&message("01.update", json!([{"title": "changed"}])))
        .unwrap();
    router.handle_frame(&message("+1.delete", json!([]))).unwrap();

    assert_eq!(router.store().len(), 1);
    assert_eq!(router.store().get("1").unwrap()["title"], "a");
}

#[test]
fn test_delete_exactly_once() {
    let mut router = connected_router();
    router
        .handle_frame(&message("create", json!([{"title": "a"}, {"title": "b"}])))
        .unwrap();

    router.handle_frame(&message("1.delete", json!([]))).unwrap();
    assert!(router.store().get("1").is_none());
    assert_eq!(router.store().len(), 1);

    // Second delete and unknown id are silent no-ops.
    router.handle_frame(&message("1.delete", json!([]))).unwrap();
    router.handle_frame(&message("77.delete", json!([]))).unwrap();
    assert_eq!(router.store().len(), 1);
}

#[test]
fn test_read_replies_on_client_channel() {
    let mut router = connected_router();
    router
        .handle_frame(&message("create", json!([{"title": "a"}, {"title": "b"}])))
        .unwrap();

    let out = router.handle_frame(&message("read", json!([]))).unwrap();
    assert_eq!(out.len(), 1);
    let (dest, body, headers) = publication(&out[0]);
    assert_eq!(dest, "/topic/backbonestomp.todos.create.browser-1");
    assert_eq!(body, json!([{"title": "a", "id": "1"}, {"title": "b", "id": "2"}]));
    assert!(headers.iter().any(|(k, _)| k == FROM_SERVER_HEADER));
}

#[test]
fn test_read_on_empty_store() {
    let mut router = connected_router();
    let out = router.handle_frame(&message("read", json!([]))).unwrap();
    let (_, body, _) = publication(&out[0]);
    assert_eq!(body, json!([]));
}

#[test]
fn test_client_reply_channel_not_routed() {
    let mut router = connected_router();
    let out = router
        .handle_frame(&message("create.browser-1", json!([{"title": "a"}])))
        .unwrap();
    assert!(out.is_empty());
    assert!(router.store().is_empty());
}

#[test]
fn test_custom_prefix_and_resource() {
    let mut router = TopicRouter::new(RouterConfig {
        topic_prefix: "/topic/demo".into(),
        resource: "notes".into(),
    });
    let out = router.handle_frame(&Frame::new(Command::Connected)).unwrap();
    assert_eq!(
        out,
        vec![Outbound::Subscribe {
            destination: "/topic/demo.notes.>".into()
        }]
    );

    let frame = Frame::message("/topic/demo.notes.create", r#"[{"text":"hi"}]"#);
    let out = router.handle_frame(&frame).unwrap();
    let (dest, _, _) = publication(&out[0]);
    assert_eq!(dest, "/topic/demo.notes.create");
}

// --- Router and binders on one broker ---

/// A router fed from a channel subscription on an in-process broker.
struct Harness {
    broker: MemoryBroker,
    server: MemoryClient,
    router: TopicRouter,
    inbox: SubscriptionHandle,
}

impl Harness {
    fn new() -> Self {
        let broker = MemoryBroker::new();
        let server = broker.connect();
        let mut router = TopicRouter::new(RouterConfig::default());
        router.connecting();
        let out = router.handle_frame(&Frame::new(Command::Connected)).unwrap();
        let destination = match &out[..] {
            [Outbound::Subscribe { destination }] => destination.clone(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(router.state(), ConnectionState::Connected);
        let inbox = server.subscribe_channel(&destination, 256).unwrap();
        router.subscribed();
        assert_eq!(router.state(), ConnectionState::Subscribed);
        Self {
            broker,
            server,
            router,
            inbox,
        }
    }

    /// Dispatch until the router's inbox is empty.
    fn pump(&mut self) {
        while let Ok(frame) = self.inbox.try_recv() {
            for out in self.router.handle_frame(&frame).unwrap() {
                if let Outbound::Publish {
                    destination,
                    body,
                    headers,
                } = out
                {
                    let headers: Vec<(&str, &str)> =
                        headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                    self.server.publish(&destination, &body, &headers).unwrap();
                }
            }
        }
    }
}

#[test]
fn test_create_round_trip_reaches_binder() {
    let mut h = Harness::new();
    let browser = h.broker.connect();
    let todos = Collection::new(format!("{PREFIX}.todos"));
    let created = Arc::new(Mutex::new(Vec::new()));
    let sink = created.clone();
    todos
        .bind("create", &browser, listener(move |args| sink.lock().extend_from_slice(args)))
        .unwrap();

    browser
        .publish(&format!("{PREFIX}.todos.create"), br#"[{"title":"milk"}]"#, &[])
        .unwrap();
    // Items without an id are filtered on the way in.
    assert!(created.lock().is_empty());

    h.pump();
    assert_eq!(created.lock().as_slice(), &[json!({"title": "milk", "id": "1"})]);
    assert_eq!(h.router.store().len(), 1);
}

#[test]
fn test_read_reply_reaches_only_requester() {
    let mut h = Harness::new();
    h.router
        .handle_frame(&message("create", json!([{"title": "a"}, {"title": "b"}])))
        .unwrap();

    let alice = h.broker.connect();
    let bob = h.broker.connect();
    let alice_todos = Collection::new(format!("{PREFIX}.todos"));
    let bob_todos = Collection::new(format!("{PREFIX}.todos"));
    let alice_seen = Arc::new(Mutex::new(Vec::new()));
    let bob_seen = Arc::new(Mutex::new(Vec::new()));
    let (a, b) = (alice_seen.clone(), bob_seen.clone());
    alice_todos
        .bind("create", &alice, listener(move |args| a.lock().extend_from_slice(args)))
        .unwrap();
    bob_todos
        .bind("create", &bob, listener(move |args| b.lock().extend_from_slice(args)))
        .unwrap();

    alice
        .publish(&format!("{PREFIX}.todos.read"), b"[]", &[])
        .unwrap();
    h.pump();

    assert_eq!(alice_seen.lock().len(), 2);
    assert!(bob_seen.lock().is_empty());
}

#[test]
fn test_update_and_delete_through_broker() {
    let mut h = Harness::new();
    let browser = h.broker.connect();
    browser
        .publish(&format!("{PREFIX}.todos.create"), br#"[{"title":"a"},{"title":"b"}]"#, &[])
        .unwrap();
    h.pump();

    browser
        .publish(&format!("{PREFIX}.todos.2.update"), br#"[{"completed":true}]"#, &[])
        .unwrap();
    browser
        .publish(&format!("{PREFIX}.todos.1.delete"), b"[]", &[])
        .unwrap();
    h.pump();

    assert!(h.router.store().get("1").is_none());
    assert_eq!(
        Value::Object(h.router.store().get("2").unwrap().clone()),
        json!({"title": "b", "id": "2", "completed": true})
    );
}
