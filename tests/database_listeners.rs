use firebase_bridge::database::{
    DataSnapshot, DatabaseError, DatabaseErrorCode, EventToken, EventType, FirebaseApi,
    FirebaseConfig, MemoryFirebase, SnapshotListener,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

fn unique_url(name: &str) -> String {
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!(
        "https://{name}-{}.listeners.test",
        COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}

fn connect(name: &str) -> MemoryFirebase {
    MemoryFirebase::create_new(FirebaseConfig::new(unique_url(name))).expect("connect root")
}

fn recorder() -> (Arc<Mutex<Vec<DataSnapshot>>>, SnapshotListener) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let captured = events.clone();
    let listener: SnapshotListener = Arc::new(move |snapshot: DataSnapshot| {
        captured.lock().unwrap().push(snapshot);
    });
    (events, listener)
}

#[tokio::test]
async fn push_on_empty_root_creates_one_auto_key() {
    let root = connect("push");
    assert!(root.push(json!({ "a": 1 })).await.unwrap());

    let (events, listener) = recorder();
    let _token = root.on("value", listener, None).unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key(), "");
    let children = events[0].val().as_object().expect("object at root");
    assert_eq!(children.len(), 1);
    let (key, value) = children.iter().next().unwrap();
    assert_eq!(key.len(), 20);
    assert_eq!(value, &json!({ "a": 1 }));
}

#[tokio::test]
async fn set_null_at_leaf_delivers_null() {
    let root = connect("set-null");
    let leaf = root.child("profile/name").unwrap();
    leaf.set(json!("Ada")).await.unwrap();
    assert!(leaf.set(Value::Null).await.unwrap());

    let (events, listener) = recorder();
    leaf.on("value", listener, None).unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events[0].key(), "name");
    assert_eq!(events[0].val(), &Value::Null);
    assert!(!events[0].exists());
}

#[tokio::test]
async fn value_listener_emits_initial_and_updates() {
    let root = connect("value");
    let counter = root.child("counters/main").unwrap();

    let (events, listener) = recorder();
    let token = counter.on("value", listener, None).unwrap();

    counter.set(json!(1)).await.unwrap();
    counter.set(json!(2)).await.unwrap();
    assert!(counter.off("value", &token).unwrap());
    counter.set(json!(3)).await.unwrap();

    let values: Vec<Value> = events
        .lock()
        .unwrap()
        .iter()
        .map(|snapshot| snapshot.val().clone())
        .collect();
    assert_eq!(values, [Value::Null, json!(1), json!(2)]);
}

#[tokio::test]
async fn child_events_report_keys() {
    let root = connect("child-events");
    let messages = root.child("messages").unwrap();
    messages.set_value("first", json!("hello")).await.unwrap();

    let (added, on_added) = recorder();
    let (changed, on_changed) = recorder();
    let (removed, on_removed) = recorder();
    messages.on("child_added", on_added, None).unwrap();
    messages.on("child_changed", on_changed, None).unwrap();
    messages.on("child_removed", on_removed, None).unwrap();

    messages.set_value("second", json!("world")).await.unwrap();
    messages.set_value("first", json!("hi")).await.unwrap();
    messages.remove(Some("second")).await.unwrap();

    let keys = |events: &Arc<Mutex<Vec<DataSnapshot>>>| -> Vec<String> {
        events
            .lock()
            .unwrap()
            .iter()
            .map(|snapshot| snapshot.key().to_string())
            .collect()
    };
    assert_eq!(keys(&added), ["first", "second"]);
    assert_eq!(keys(&changed), ["first"]);
    assert_eq!(keys(&removed), ["second"]);
    assert_eq!(changed.lock().unwrap()[0].val(), &json!("hi"));
}

#[tokio::test]
async fn child_moved_stays_quiet_when_key_order_is_unchanged() {
    let root = connect("child-moved");
    let scores = root.child("scores").unwrap();
    scores.set(json!({ "a": 1, "b": 2 })).await.unwrap();

    let (moved, listener) = recorder();
    scores.on("child_moved", listener, None).unwrap();

    scores.set(json!({ "b": 2 })).await.unwrap();
    scores.set_value("c", json!(3)).await.unwrap();
    scores.set_value("b", json!(20)).await.unwrap();

    assert!(moved.lock().unwrap().is_empty());
}

#[tokio::test]
async fn bogus_event_name_is_rejected_without_calling_back() {
    let root = connect("bogus");
    let (events, listener) = recorder();
    let err = root.on("bogus_event", listener, None).unwrap_err();
    assert_eq!(err.code, DatabaseErrorCode::InvalidArgument);
    assert_eq!(err.field(), Some("eventName"));
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(root.active_listeners(), 0);
}

#[tokio::test]
async fn off_with_foreign_token_is_a_no_op() {
    let first = connect("foreign-a");
    let second = connect("foreign-b");
    let (events, listener) = recorder();
    let token: EventToken = first.on("value", listener, None).unwrap();

    assert!(!second.off("value", &token).unwrap());
    assert_eq!(first.active_listeners(), 1);

    first.set(json!("still listening")).await.unwrap();
    assert_eq!(events.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn children_share_subscriptions_with_their_root() {
    let root = connect("shared-registry");
    let child = root.child("rooms/lobby").unwrap();
    let (_, listener) = recorder();
    let token = child.on("value", listener, None).unwrap();
    assert_eq!(token.event_type(), EventType::Value);

    assert_eq!(root.active_listeners(), 1);
    assert!(root.off("value", &token).unwrap());
    assert_eq!(child.active_listeners(), 0);
}

#[tokio::test]
async fn cancelled_listener_reports_error_and_unregisters() {
    let root = connect("cancelled");
    let errors = Arc::new(Mutex::new(Vec::new()));
    let captured = errors.clone();
    let (_, listener) = recorder();
    let secret = root.child("secret").unwrap();
    let token = secret
        .on(
            "value",
            listener,
            Some(Arc::new(move |err: DatabaseError| {
                captured.lock().unwrap().push(err)
            })),
        )
        .unwrap();

    root.native()
        .cancel_observers(firebase_bridge::database::native::NativeError::permission_denied(
            "rules changed",
        ));

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, DatabaseErrorCode::PermissionDenied);

    assert_eq!(root.native().observer_count(), 0);
    assert_eq!(root.active_listeners(), 0);
    assert!(!secret.off("value", &token).unwrap());
}
