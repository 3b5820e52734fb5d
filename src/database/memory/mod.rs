//! In-process implementation of the native SDK contract.
//!
//! Every connection URL (scheme + host) maps to one shared store
//! for as long as a handle to it is alive, so two `connect` calls with the
//! same URL observe the same data. Writes are applied synchronously and
//! observers are notified before the write completion runs.

mod auth;
mod push_id;
mod query;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, Weak};

use chrono::Utc;
use serde_json::{Map, Value};
use url::Url;

use crate::database::native::{
    AuthCompletion, CancelCallback, Completion, NativeAuthData, NativeError, NativeEventType,
    NativeHandle, NativeLocation, NativeObservable, NativeQuery, NativeResult, NativeSnapshot,
    SnapshotCallback, UserCompletion,
};
use crate::database::path::{is_prefix, normalize_path, paths_related};
use crate::database::value::{ConverterOptions, ValueConverter};
use crate::logger::Logger;

use auth::{AuthState, Session};
use push_id::PushIdGenerator;
use query::{ordered_children, QueryIndex, QueryLimit, QueryParams};

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@firebase-bridge/memory"));

static STORES: LazyLock<Mutex<HashMap<String, Weak<MemoryStore>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

type Deliver = Arc<dyn Fn(Option<String>, Value) + Send + Sync>;

#[derive(Clone)]
struct Observer {
    path: Vec<String>,
    params: Option<QueryParams>,
    event: NativeEventType,
    deliver: Deliver,
    cancel: CancelCallback,
}

impl Observer {
    fn key(&self) -> Option<String> {
        self.path.last().cloned()
    }
}

#[derive(Default)]
struct Faults {
    throw_next_write: Option<NativeError>,
    reject_next_write: Option<NativeError>,
}

struct MemoryStore {
    name: String,
    data: Mutex<Value>,
    observers: Mutex<BTreeMap<u64, Observer>>,
    next_handle: AtomicU64,
    push_ids: Mutex<PushIdGenerator>,
    auth: Mutex<AuthState>,
    faults: Mutex<Faults>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    fn new(name: String) -> Self {
        Self {
            name,
            data: Mutex::new(Value::Null),
            observers: Mutex::new(BTreeMap::new()),
            next_handle: AtomicU64::new(1),
            push_ids: Mutex::new(PushIdGenerator::default()),
            auth: Mutex::new(AuthState::default()),
            faults: Mutex::new(Faults::default()),
        }
    }

    fn for_url(url: &Url) -> NativeResult<Arc<Self>> {
        let Some(host) = url.host_str() else {
            return Err(NativeError::new(format!(
                "Firebase URL '{url}' does not name a host"
            )));
        };
        let name = match url.port() {
            Some(port) => format!("{}://{host}:{port}", url.scheme()),
            None => format!("{}://{host}", url.scheme()),
        };

        let mut stores = STORES.lock().unwrap();
        if let Some(store) = stores.get(&name).and_then(Weak::upgrade) {
            return Ok(store);
        }
        LOGGER.debug(format!("Opening in-memory database {name}"));
        stores.retain(|_, store| store.strong_count() > 0);
        let store = Arc::new(MemoryStore::new(name.clone()));
        stores.insert(name, Arc::downgrade(&store));
        Ok(store)
    }

    fn read(&self, path: &[String]) -> Value {
        let data = self.data.lock().unwrap();
        value_at(&data, path).cloned().unwrap_or(Value::Null)
    }

    fn write(&self, path: &[String], value: Value) {
        let value = strip_nulls(value);
        let (old_root, new_root) = {
            let mut data = self.data.lock().unwrap();
            let old_root = data.clone();
            if value.is_null() {
                delete_at(&mut data, path);
            } else {
                set_at(&mut data, path, value);
            }
            (old_root, data.clone())
        };

        let observers: Vec<Observer> = {
            let observers = self.observers.lock().unwrap();
            observers
                .values()
                .filter(|observer| paths_related(&observer.path, path))
                .cloned()
                .collect()
        };
        for observer in observers {
            emit_changes(&observer, &old_root, &new_root);
        }
    }

    fn add_observer(&self, observer: Observer) -> NativeHandle {
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.observers
            .lock()
            .unwrap()
            .insert(id, observer.clone());

        let current = NodeView::of(&observer, &self.data.lock().unwrap());
        match observer.event {
            NativeEventType::Value => (observer.deliver)(observer.key(), current.value),
            NativeEventType::ChildAdded => {
                for (key, value) in current.children {
                    (observer.deliver)(Some(key), value);
                }
            }
            _ => {}
        }
        NativeHandle(id)
    }

    fn remove_observer(&self, handle: NativeHandle) {
        if self.observers.lock().unwrap().remove(&handle.0).is_none() {
            LOGGER.debug(format!("Ignoring removal of unknown observer {}", handle.0));
        }
    }

    fn cancel_observers(&self, path: &[String], error: NativeError) {
        let cancelled: Vec<Observer> = {
            let mut observers = self.observers.lock().unwrap();
            let ids: Vec<u64> = observers
                .iter()
                .filter(|(_, observer)| is_prefix(path, &observer.path))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| observers.remove(&id))
                .collect()
        };
        for observer in cancelled {
            (observer.cancel)(error.clone());
        }
    }

    fn take_fault(&self) -> Faults {
        std::mem::take(&mut *self.faults.lock().unwrap())
    }
}

/// What an observer sees of the tree: the node value and its ordered children.
struct NodeView {
    value: Value,
    children: Vec<(String, Value)>,
}

impl NodeView {
    fn of(observer: &Observer, root: &Value) -> Self {
        let node = value_at(root, &observer.path).cloned().unwrap_or(Value::Null);
        match &observer.params {
            None => {
                let children = ordered_children(&node);
                Self {
                    value: node,
                    children,
                }
            }
            Some(params) => {
                let children = params.view(&node);
                let value = if children.is_empty() {
                    Value::Null
                } else {
                    Value::Object(children.iter().cloned().collect::<Map<String, Value>>())
                };
                Self { value, children }
            }
        }
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.children
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value)
    }

    /// Previous sibling of every child also present in `other`, so removals
    /// and insertions alone never count as moves.
    fn previous_keys<'a>(&'a self, other: &NodeView) -> HashMap<&'a str, Option<&'a str>> {
        let mut previous = HashMap::with_capacity(self.children.len());
        let mut last: Option<&str> = None;
        for (key, _) in &self.children {
            if other.get(key).is_none() {
                continue;
            }
            previous.insert(key.as_str(), last);
            last = Some(key.as_str());
        }
        previous
    }
}

fn emit_changes(observer: &Observer, old_root: &Value, new_root: &Value) {
    let before = NodeView::of(observer, old_root);
    let after = NodeView::of(observer, new_root);
    let deliver = &observer.deliver;

    match observer.event {
        NativeEventType::Value => {
            if before.value != after.value {
                deliver(observer.key(), after.value);
            }
        }
        NativeEventType::ChildAdded => {
            for (key, value) in &after.children {
                if before.get(key).is_none() {
                    deliver(Some(key.clone()), value.clone());
                }
            }
        }
        NativeEventType::ChildRemoved => {
            for (key, value) in &before.children {
                if after.get(key).is_none() {
                    deliver(Some(key.clone()), value.clone());
                }
            }
        }
        NativeEventType::ChildChanged => {
            for (key, value) in &after.children {
                if before.get(key).is_some_and(|old| old != value) {
                    deliver(Some(key.clone()), value.clone());
                }
            }
        }
        NativeEventType::ChildMoved => {
            let old_previous = before.previous_keys(&after);
            let new_previous = after.previous_keys(&before);
            // Only a child whose own value changed can move.
            for (key, value) in &after.children {
                let changed = before.get(key).is_some_and(|old| old != value);
                let moved = match (old_previous.get(key.as_str()), new_previous.get(key.as_str())) {
                    (Some(old), Some(new)) => changed && old != new,
                    _ => false,
                };
                if moved {
                    deliver(Some(key.clone()), value.clone());
                }
            }
        }
    }
}

fn value_at<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = root;
    for segment in path {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn array_to_object(items: Vec<Value>) -> Value {
    Value::Object(
        items
            .into_iter()
            .enumerate()
            .filter(|(_, value)| !value.is_null())
            .map(|(index, value)| (index.to_string(), value))
            .collect(),
    )
}

fn set_at(node: &mut Value, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        *node = value;
        return;
    };
    if let Value::Array(items) = node {
        *node = array_to_object(std::mem::take(items));
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(first.clone()).or_insert(Value::Null);
        set_at(child, rest, value);
    }
}

/// Deletes the node at `path` and prunes parents left without children.
fn delete_at(node: &mut Value, path: &[String]) {
    let Some((first, rest)) = path.split_first() else {
        *node = Value::Null;
        return;
    };
    if let Value::Array(items) = node {
        *node = array_to_object(std::mem::take(items));
    }
    if let Value::Object(map) = node {
        if rest.is_empty() {
            map.remove(first);
        } else if let Some(child) = map.get_mut(first) {
            delete_at(child, rest);
            if child.is_null() {
                map.remove(first);
            }
        }
        if map.is_empty() {
            *node = Value::Null;
        }
    }
}

/// The database never stores nulls or empty objects.
fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let stripped: Map<String, Value> = map
                .into_iter()
                .map(|(key, value)| (key, strip_nulls(value)))
                .filter(|(_, value)| !value.is_null())
                .collect();
            if stripped.is_empty() {
                Value::Null
            } else {
                Value::Object(stripped)
            }
        }
        Value::Array(items) => {
            if items.is_empty() {
                Value::Null
            } else {
                Value::Array(items.into_iter().map(strip_nulls).collect())
            }
        }
        other => other,
    }
}

fn invalid_path(err: impl fmt::Display) -> NativeError {
    NativeError::new(format!("Invalid Firebase path: {err}"))
}

/// Native snapshot delivered by the in-memory SDK.
#[derive(Clone, Debug)]
pub struct MemorySnapshot<O> {
    key: Option<String>,
    value: O,
}

impl<O: Clone + Send + 'static> NativeSnapshot for MemorySnapshot<O> {
    type Object = O;

    fn value(&self) -> O {
        self.value.clone()
    }

    fn key(&self) -> Option<String> {
        self.key.clone()
    }
}

fn observe_path<C: ValueConverter>(
    store: &MemoryStore,
    converter: &Arc<C>,
    path: &[String],
    params: Option<QueryParams>,
    event: NativeEventType,
    on_snapshot: SnapshotCallback<MemorySnapshot<C::Native>>,
    on_cancel: CancelCallback,
) -> NativeHandle {
    let converter = Arc::clone(converter);
    let deliver: Deliver = Arc::new(move |key: Option<String>, value: Value| {
        on_snapshot(MemorySnapshot {
            key,
            value: converter.to_native(&value),
        })
    });
    store.add_observer(Observer {
        path: path.to_vec(),
        params,
        event,
        deliver,
        cancel: on_cancel,
    })
}

/// Location handle of the in-memory SDK, generic over the platform object shape.
pub struct MemoryLocation<C: ValueConverter> {
    store: Arc<MemoryStore>,
    path: Vec<String>,
    converter: Arc<C>,
}

impl<C: ValueConverter> Clone for MemoryLocation<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            path: self.path.clone(),
            converter: Arc::clone(&self.converter),
        }
    }
}

impl<C: ValueConverter> fmt::Debug for MemoryLocation<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLocation")
            .field("store", &self.store.name)
            .field("path", &self.path())
            .finish()
    }
}

impl<C: ValueConverter> MemoryLocation<C> {
    fn at(&self, path: Vec<String>) -> Self {
        Self {
            store: Arc::clone(&self.store),
            path,
            converter: Arc::clone(&self.converter),
        }
    }

    pub fn path(&self) -> String {
        format!("/{}", self.path.join("/"))
    }

    /// Current stored value at this location.
    pub fn peek(&self) -> Value {
        self.store.read(&self.path)
    }

    /// Makes the next `set_value` on this database fail synchronously.
    pub fn throw_on_next_write(&self, error: NativeError) {
        self.store.faults.lock().unwrap().throw_next_write = Some(error);
    }

    /// Makes the next `set_value` on this database report `error` through its completion.
    pub fn reject_next_write(&self, error: NativeError) {
        self.store.faults.lock().unwrap().reject_next_write = Some(error);
    }

    /// Cancels every observer at or below this location, as a rules change would.
    pub fn cancel_observers(&self, error: NativeError) {
        self.store.cancel_observers(&self.path, error);
    }

    pub fn observer_count(&self) -> usize {
        self.store.observers.lock().unwrap().len()
    }

    fn query(&self, index: QueryIndex) -> MemoryQuery<C> {
        MemoryQuery {
            store: Arc::clone(&self.store),
            path: self.path.clone(),
            params: QueryParams::with_index(index),
            converter: Arc::clone(&self.converter),
        }
    }

    fn native_auth_data(&self, session: &Session) -> NativeAuthData<C::Native> {
        NativeAuthData {
            uid: session.uid.clone(),
            provider: session.provider.clone(),
            expires: session.expires,
            auth: self.converter.to_native(&session.auth),
        }
    }

    fn complete_auth(
        &self,
        result: NativeResult<Session>,
        completion: AuthCompletion<C::Native>,
    ) -> NativeResult<()> {
        completion(result.map(|session| self.native_auth_data(&session)));
        Ok(())
    }
}

impl<C: ValueConverter> NativeObservable for MemoryLocation<C> {
    type Object = C::Native;
    type Snapshot = MemorySnapshot<C::Native>;

    fn observe(
        &self,
        event: NativeEventType,
        on_snapshot: SnapshotCallback<Self::Snapshot>,
        on_cancel: CancelCallback,
    ) -> NativeResult<NativeHandle> {
        Ok(observe_path(
            &self.store,
            &self.converter,
            &self.path,
            None,
            event,
            on_snapshot,
            on_cancel,
        ))
    }

    fn remove_observer(&self, handle: NativeHandle) -> NativeResult<()> {
        self.store.remove_observer(handle);
        Ok(())
    }
}

impl<C: ValueConverter> NativeLocation for MemoryLocation<C> {
    type Query = MemoryQuery<C>;
    type Converter = C;

    fn connect(url: &Url) -> NativeResult<Self> {
        let store = MemoryStore::for_url(url)?;
        let path = normalize_path(url.path()).map_err(invalid_path)?;
        Ok(Self {
            store,
            path,
            converter: Arc::new(C::with_options(ConverterOptions::default())),
        })
    }

    fn child(&self, path: &str) -> NativeResult<Self> {
        let mut segments = self.path.clone();
        segments.extend(normalize_path(path).map_err(invalid_path)?);
        Ok(self.at(segments))
    }

    fn child_by_auto_id(&self) -> NativeResult<Self> {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        let key = self.store.push_ids.lock().unwrap().next_id(now);
        let mut segments = self.path.clone();
        segments.push(key);
        Ok(self.at(segments))
    }

    fn key(&self) -> Option<String> {
        self.path.last().cloned()
    }

    fn set_value(&self, value: C::Native, completion: Completion) -> NativeResult<()> {
        let faults = self.store.take_fault();
        if let Some(error) = faults.throw_next_write {
            return Err(error);
        }
        let tree = self
            .converter
            .to_tree(&value)
            .map_err(|err| NativeError::new(format!("Cannot store value: {}", err.message())))?;
        if let Some(error) = faults.reject_next_write {
            completion(Err(error));
            return Ok(());
        }
        self.store.write(&self.path, tree);
        completion(Ok(()));
        Ok(())
    }

    fn order_by_key(&self) -> NativeResult<MemoryQuery<C>> {
        Ok(self.query(QueryIndex::Key))
    }

    fn order_by_value(&self) -> NativeResult<MemoryQuery<C>> {
        Ok(self.query(QueryIndex::Value))
    }

    fn order_by_priority(&self) -> NativeResult<MemoryQuery<C>> {
        Ok(self.query(QueryIndex::Priority))
    }

    fn order_by_child(&self, path: &str) -> NativeResult<MemoryQuery<C>> {
        let segments = normalize_path(path).map_err(invalid_path)?;
        if segments.is_empty() {
            return Err(NativeError::new("orderByChild requires a child key"));
        }
        Ok(self.query(QueryIndex::Child(segments)))
    }

    fn auth_anonymously(&self, completion: AuthCompletion<C::Native>) -> NativeResult<()> {
        let session = self.store.auth.lock().unwrap().sign_in_anonymously();
        self.complete_auth(Ok(session), completion)
    }

    fn auth_with_password(
        &self,
        email: &str,
        password: &str,
        completion: AuthCompletion<C::Native>,
    ) -> NativeResult<()> {
        let result = self
            .store
            .auth
            .lock()
            .unwrap()
            .sign_in_with_password(email, password);
        self.complete_auth(result, completion)
    }

    fn auth_with_custom_token(
        &self,
        token: &str,
        completion: AuthCompletion<C::Native>,
    ) -> NativeResult<()> {
        let result = self
            .store
            .auth
            .lock()
            .unwrap()
            .sign_in_with_custom_token(token);
        self.complete_auth(result, completion)
    }

    fn auth_with_oauth_token(
        &self,
        provider: &str,
        token: &str,
        completion: AuthCompletion<C::Native>,
    ) -> NativeResult<()> {
        let result = self
            .store
            .auth
            .lock()
            .unwrap()
            .sign_in_with_oauth_token(provider, token);
        self.complete_auth(result, completion)
    }

    fn create_user(
        &self,
        email: &str,
        password: &str,
        completion: UserCompletion,
    ) -> NativeResult<()> {
        let result = self.store.auth.lock().unwrap().create_user(email, password);
        completion(result);
        Ok(())
    }

    fn unauth(&self) -> NativeResult<()> {
        self.store.auth.lock().unwrap().sign_out();
        Ok(())
    }

    fn auth_data(&self) -> Option<NativeAuthData<C::Native>> {
        let session = self.store.auth.lock().unwrap().current().cloned()?;
        Some(self.native_auth_data(&session))
    }
}

/// Query handle of the in-memory SDK.
pub struct MemoryQuery<C: ValueConverter> {
    store: Arc<MemoryStore>,
    path: Vec<String>,
    params: QueryParams,
    converter: Arc<C>,
}

impl<C: ValueConverter> Clone for MemoryQuery<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            path: self.path.clone(),
            params: self.params.clone(),
            converter: Arc::clone(&self.converter),
        }
    }
}

impl<C: ValueConverter> MemoryQuery<C> {
    fn bound_value(&self, value: &C::Native) -> NativeResult<Value> {
        self.converter
            .to_tree(value)
            .map_err(|err| NativeError::new(format!("Invalid query bound: {}", err.message())))
    }

    fn narrowed<F>(&self, update: F) -> NativeResult<Self>
    where
        F: FnOnce(&mut QueryParams) -> NativeResult<()>,
    {
        let mut next = self.clone();
        update(&mut next.params)?;
        Ok(next)
    }
}

impl<C: ValueConverter> NativeObservable for MemoryQuery<C> {
    type Object = C::Native;
    type Snapshot = MemorySnapshot<C::Native>;

    fn observe(
        &self,
        event: NativeEventType,
        on_snapshot: SnapshotCallback<Self::Snapshot>,
        on_cancel: CancelCallback,
    ) -> NativeResult<NativeHandle> {
        Ok(observe_path(
            &self.store,
            &self.converter,
            &self.path,
            Some(self.params.clone()),
            event,
            on_snapshot,
            on_cancel,
        ))
    }

    fn remove_observer(&self, handle: NativeHandle) -> NativeResult<()> {
        self.store.remove_observer(handle);
        Ok(())
    }
}

impl<C: ValueConverter> NativeQuery for MemoryQuery<C> {
    fn start_at(&self, value: C::Native) -> NativeResult<Self> {
        let bound = self.bound_value(&value)?;
        self.narrowed(|params| params.set_start(bound))
    }

    fn end_at(&self, value: C::Native) -> NativeResult<Self> {
        let bound = self.bound_value(&value)?;
        self.narrowed(|params| params.set_end(bound))
    }

    fn equal_to(&self, value: C::Native) -> NativeResult<Self> {
        let bound = self.bound_value(&value)?;
        self.narrowed(|params| {
            params.set_start(bound.clone())?;
            params.set_end(bound)
        })
    }

    fn limit_to_first(&self, limit: u32) -> NativeResult<Self> {
        if limit == 0 {
            return Err(NativeError::new("Query.limitToFirst: limit must be positive"));
        }
        self.narrowed(|params| params.set_limit(QueryLimit::First(limit)))
    }

    fn limit_to_last(&self, limit: u32) -> NativeResult<Self> {
        if limit == 0 {
            return Err(NativeError::new("Query.limitToLast: limit must be positive"));
        }
        self.narrowed(|params| params.set_limit(QueryLimit::Last(limit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::android::{AndroidConverter, JavaObject};
    use serde_json::json;

    type Location = MemoryLocation<AndroidConverter>;

    fn connect(name: &str) -> Location {
        let url = Url::parse(&format!("https://{name}.memory.test")).unwrap();
        Location::connect(&url).unwrap()
    }

    fn write(location: &Location, value: Value) {
        let native = AndroidConverter::default().to_native(&value);
        location
            .set_value(native, Box::new(|result| assert!(result.is_ok())))
            .unwrap();
    }

    fn recorder() -> (
        Arc<Mutex<Vec<(Option<String>, JavaObject)>>>,
        SnapshotCallback<MemorySnapshot<JavaObject>>,
    ) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&events);
        let callback: SnapshotCallback<MemorySnapshot<JavaObject>> =
            Arc::new(move |snapshot: MemorySnapshot<JavaObject>| {
                captured
                    .lock()
                    .unwrap()
                    .push((snapshot.key(), snapshot.value()));
            });
        (events, callback)
    }

    fn no_cancel() -> CancelCallback {
        Arc::new(|_| {})
    }

    #[test]
    fn same_url_shares_a_store() {
        let first = connect("shared-store");
        let second = connect("shared-store");
        write(&first.child("a").unwrap(), json!(1));
        assert_eq!(second.child("a").unwrap().peek(), json!(1));
    }

    #[test]
    fn url_path_selects_a_child_location() {
        let url = Url::parse("https://url-path.memory.test/users/ada").unwrap();
        let location = Location::connect(&url).unwrap();
        assert_eq!(location.path(), "/users/ada");
        assert_eq!(location.key().as_deref(), Some("ada"));
    }

    #[test]
    fn null_writes_delete_and_prune() {
        let root = connect("null-writes");
        write(&root, json!({ "a": { "b": 1 }, "c": 2 }));
        write(&root.child("a/b").unwrap(), Value::Null);
        assert_eq!(root.peek(), json!({ "c": 2 }));
        write(&root.child("c").unwrap(), json!({ "gone": null }));
        assert_eq!(root.peek(), Value::Null);
    }

    #[test]
    fn value_observer_fires_initially_and_on_change() {
        let root = connect("value-observer");
        let (events, callback) = recorder();
        let handle = root
            .child("counter")
            .unwrap()
            .observe(NativeEventType::Value, callback, no_cancel())
            .unwrap();

        write(&root.child("counter").unwrap(), json!(1));
        write(&root.child("other").unwrap(), json!(1));
        root.remove_observer(handle).unwrap();
        write(&root.child("counter").unwrap(), json!(2));

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                (Some("counter".into()), JavaObject::Null),
                (Some("counter".into()), JavaObject::Long(1)),
            ]
        );
    }

    #[test]
    fn child_events_follow_writes() {
        let root = connect("child-events");
        let list = root.child("list").unwrap();
        write(&list.child("a").unwrap(), json!(1));

        let (added, on_added) = recorder();
        let (changed, on_changed) = recorder();
        let (removed, on_removed) = recorder();
        list.observe(NativeEventType::ChildAdded, on_added, no_cancel())
            .unwrap();
        list.observe(NativeEventType::ChildChanged, on_changed, no_cancel())
            .unwrap();
        list.observe(NativeEventType::ChildRemoved, on_removed, no_cancel())
            .unwrap();

        write(&list.child("b").unwrap(), json!(2));
        write(&list.child("a").unwrap(), json!(10));
        write(&list.child("b").unwrap(), Value::Null);

        let keys = |events: &Arc<Mutex<Vec<(Option<String>, JavaObject)>>>| -> Vec<String> {
            events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(key, _)| key.clone())
                .collect()
        };
        assert_eq!(keys(&added), ["a", "b"]);
        assert_eq!(keys(&changed), ["a"]);
        assert_eq!(keys(&removed), ["b"]);
    }

    #[test]
    fn query_observer_sees_filtered_children() {
        let root = connect("query-observer");
        write(&root, json!({ "a": 5, "b": 1, "c": 3 }));
        let query = root.order_by_value().unwrap().limit_to_first(2).unwrap();
        let (events, callback) = recorder();
        query
            .observe(NativeEventType::Value, callback, no_cancel())
            .unwrap();

        let converter = AndroidConverter::default();
        let events = events.lock().unwrap();
        assert_eq!(
            converter.to_tree(&events[0].1).unwrap(),
            json!({ "b": 1, "c": 3 })
        );
    }

    #[test]
    fn child_moved_follows_query_order() {
        let root = connect("child-moved");
        write(&root, json!({ "a": 1, "b": 2, "c": 3 }));
        let (events, callback) = recorder();
        root.order_by_value()
            .unwrap()
            .observe(NativeEventType::ChildMoved, callback, no_cancel())
            .unwrap();

        write(&root.child("b").unwrap(), json!(2));
        write(&root.child("a").unwrap(), json!(4));

        let events = events.lock().unwrap();
        assert_eq!(*events, vec![(Some("a".into()), JavaObject::Long(4))]);
    }

    #[test]
    fn query_builders_reject_repeated_bounds() {
        let root = connect("query-repeats");
        let query = root
            .order_by_key()
            .unwrap()
            .start_at(JavaObject::String("a".into()))
            .unwrap();
        assert!(query.start_at(JavaObject::String("b".into())).is_err());
        assert!(query.equal_to(JavaObject::String("b".into())).is_err());
        assert!(query.limit_to_first(0).is_err());
    }

    #[test]
    fn faults_surface_once() {
        let root = connect("faults");
        root.throw_on_next_write(NativeError::new("thrown"));
        assert!(root
            .set_value(JavaObject::Long(1), Box::new(|_| {}))
            .is_err());

        root.reject_next_write(NativeError::new("rejected"));
        let outcome = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&outcome);
        root.set_value(
            JavaObject::Long(1),
            Box::new(move |result: NativeResult<()>| *captured.lock().unwrap() = Some(result)),
        )
        .unwrap();
        assert!(matches!(*outcome.lock().unwrap(), Some(Err(_))));
        assert_eq!(root.peek(), Value::Null);

        write(&root, json!(3));
        assert_eq!(root.peek(), json!(3));
    }

    #[test]
    fn cancel_observers_invokes_cancel_callbacks() {
        let root = connect("cancel");
        let cancelled = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&cancelled);
        let (_, callback) = recorder();
        root.child("private")
            .unwrap()
            .observe(
                NativeEventType::Value,
                callback,
                Arc::new(move |err: NativeError| captured.lock().unwrap().push(err)),
            )
            .unwrap();

        root.cancel_observers(NativeError::permission_denied("rules changed"));
        assert_eq!(cancelled.lock().unwrap().len(), 1);
        assert_eq!(root.observer_count(), 0);
    }

    #[test]
    fn closed_stores_are_pruned_on_next_open() {
        drop(connect("short-lived"));
        let _other = connect("short-lived-next");
        let stores = STORES.lock().unwrap();
        assert!(!stores.contains_key("https://short-lived.memory.test"));
        assert!(stores.contains_key("https://short-lived-next.memory.test"));
    }

    #[test]
    fn auto_ids_are_children_with_sortable_keys() {
        let root = connect("auto-ids");
        let first = root.child_by_auto_id().unwrap();
        let second = root.child_by_auto_id().unwrap();
        assert_eq!(first.key().unwrap().len(), 20);
        assert!(first.key() < second.key());
    }
}
