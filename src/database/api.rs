use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use futures::channel::oneshot;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::auth::{AuthData, CreateUserOptions, Credentials, LoginOptions};
use crate::database::error::{
    internal_error, invalid_field, native_call_error, native_callback_error, DatabaseError,
    DatabaseResult,
};
use crate::database::events::{
    ErrorListener, EventToken, EventType, SnapshotListener, SubscriptionRegistry,
};
use crate::database::native::{AuthCompletion, NativeAuthData, NativeLocation, NativeResult};
use crate::database::path::normalize_path;
use crate::database::query::{QueryOptions, QueryPlan};
use crate::database::value::{ConverterOptions, UnsupportedValuePolicy, ValueConverter};
use crate::logger::Logger;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@firebase-bridge/database"));

/// Connection settings for [`FirebaseApi::create_new`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseConfig {
    pub url: String,
    #[serde(default)]
    pub unsupported_values: UnsupportedValuePolicy,
}

impl FirebaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            unsupported_values: UnsupportedValuePolicy::default(),
        }
    }

    pub fn with_unsupported_values(mut self, policy: UnsupportedValuePolicy) -> Self {
        self.unsupported_values = policy;
        self
    }

    pub fn converter_options(&self) -> ConverterOptions {
        ConverterOptions {
            unsupported_values: self.unsupported_values,
        }
    }
}

/// Platform-neutral surface shared by every native binding.
///
/// Asynchronous operations resolve once the native completion fires. A
/// completion that never fires leaves the future pending; there is no timeout.
/// Errors raised synchronously by the native layer and errors delivered through
/// its completions both come back as [`DatabaseError`], never as panics.
#[async_trait]
pub trait FirebaseApi: Sized + Send + Sync {
    /// Parses `config.url` and connects a root handle to it.
    fn create_new(config: FirebaseConfig) -> DatabaseResult<Self>;

    async fn login(&self, options: LoginOptions) -> DatabaseResult<AuthData>;

    async fn auth_with_password(&self, email: &str, password: &str) -> DatabaseResult<AuthData> {
        self.login(LoginOptions::password(email, password)).await
    }

    async fn auth_with_custom_token(&self, token: &str) -> DatabaseResult<AuthData> {
        self.login(LoginOptions::custom_token(token)).await
    }

    /// Signs in with an access token issued by `provider` (`github`, `google`, ...).
    async fn auth_with_oauth_token(
        &self,
        provider: &str,
        token: &str,
    ) -> DatabaseResult<AuthData> {
        self.login(LoginOptions::oauth(provider, token)).await
    }

    /// Creates an email/password account and resolves with its uid.
    async fn create_user(&self, options: CreateUserOptions) -> DatabaseResult<String>;

    async fn logout(&self) -> DatabaseResult<bool>;

    async fn unauth(&self) -> DatabaseResult<bool>;

    /// Authentication state currently held by the native client, if any.
    fn get_auth(&self) -> DatabaseResult<Option<AuthData>>;

    /// Writes `data` under a new auto-generated child key.
    async fn push(&self, data: Value) -> DatabaseResult<bool>;

    async fn set(&self, data: Value) -> DatabaseResult<bool>;

    /// Writes `value` at `path` relative to this location.
    async fn set_value(&self, path: &str, value: Value) -> DatabaseResult<bool>;

    /// Builds the query described by `options` at `path` (or at this location)
    /// and subscribes `callback` to its `value` events.
    async fn query(
        &self,
        callback: SnapshotListener,
        path: Option<&str>,
        options: QueryOptions,
    ) -> DatabaseResult<EventToken>;

    /// Removes the child `key`, or this location when no key is given.
    async fn remove(&self, key: Option<&str>) -> DatabaseResult<bool>;

    fn on(
        &self,
        event_name: &str,
        callback: SnapshotListener,
        error_callback: Option<ErrorListener>,
    ) -> DatabaseResult<EventToken>;

    /// Detaches the subscription behind `token`. Returns `false` without
    /// touching anything when the token is unknown, already removed or was
    /// registered for another event.
    fn off(&self, event_name: &str, token: &EventToken) -> DatabaseResult<bool>;

    fn child(&self, path: &str) -> DatabaseResult<Self>;
}

/// Facade over one native location handle.
pub struct Firebase<L: NativeLocation> {
    location: L,
    converter: Arc<L::Converter>,
    subscriptions: Arc<SubscriptionRegistry>,
}

impl<L: NativeLocation> Clone for Firebase<L> {
    fn clone(&self) -> Self {
        Self {
            location: self.location.clone(),
            converter: Arc::clone(&self.converter),
            subscriptions: Arc::clone(&self.subscriptions),
        }
    }
}

impl<L: NativeLocation> std::fmt::Debug for Firebase<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Firebase")
            .field("key", &self.location.key())
            .field("converter", self.converter.options())
            .finish()
    }
}

impl<L: NativeLocation> Firebase<L> {
    /// Wraps an already connected native handle.
    pub fn from_native(location: L, options: ConverterOptions) -> Self {
        Self {
            location,
            converter: Arc::new(L::Converter::with_options(options)),
            subscriptions: Arc::new(SubscriptionRegistry::default()),
        }
    }

    /// The wrapped native handle.
    pub fn native(&self) -> &L {
        &self.location
    }

    /// Last path segment of this location, `None` at the root.
    pub fn key(&self) -> Option<String> {
        self.location.key()
    }

    /// Subscriptions still attached through this handle tree.
    pub fn active_listeners(&self) -> usize {
        self.subscriptions.len()
    }

    fn derive(&self, location: L) -> Self {
        Self {
            location,
            converter: Arc::clone(&self.converter),
            subscriptions: Arc::clone(&self.subscriptions),
        }
    }

    fn child_location(&self, path: &str) -> DatabaseResult<L> {
        let segments = normalize_path(path)?;
        if segments.is_empty() {
            return Err(invalid_field("path", "Child path must not be empty"));
        }
        self.location
            .child(path)
            .map_err(|err| failed(native_call_error("child", err)))
    }

    async fn write(&self, target: &L, operation: &'static str, data: &Value) -> DatabaseResult<bool> {
        let native = self.converter.to_native(data);
        let (tx, rx) = oneshot::channel::<NativeResult<()>>();
        target
            .set_value(
                native,
                Box::new(move |result| {
                    let _ = tx.send(result);
                }),
            )
            .map_err(|err| failed(native_call_error(operation, err)))?;
        completion(operation, rx).await?;
        Ok(true)
    }

    async fn authenticate(&self, credentials: &Credentials) -> DatabaseResult<AuthData> {
        let (tx, rx) = oneshot::channel::<NativeResult<NativeAuthData<L::Object>>>();
        let done: AuthCompletion<L::Object> = Box::new(move |result| {
            let _ = tx.send(result);
        });
        let call = match credentials {
            Credentials::Anonymous => self.location.auth_anonymously(done),
            Credentials::Password { email, password } => {
                self.location.auth_with_password(email, password, done)
            }
            Credentials::CustomToken { token } => self.location.auth_with_custom_token(token, done),
            Credentials::OAuthToken { provider, token } => {
                self.location.auth_with_oauth_token(provider, token, done)
            }
        };
        call.map_err(|err| failed(native_call_error("login", err)))?;
        let native = completion("login", rx).await?;
        AuthData::from_native(native, self.converter.as_ref())
    }
}

async fn completion<T>(
    operation: &'static str,
    rx: oneshot::Receiver<NativeResult<T>>,
) -> DatabaseResult<T> {
    match rx.await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(failed(native_callback_error(operation, err))),
        Err(_) => Err(failed(internal_error(format!(
            "{operation} completion was dropped before it fired"
        )))),
    }
}

fn failed(err: DatabaseError) -> DatabaseError {
    LOGGER.warn(err.to_string());
    err
}

#[async_trait]
impl<L: NativeLocation> FirebaseApi for Firebase<L> {
    fn create_new(config: FirebaseConfig) -> DatabaseResult<Self> {
        let url = Url::parse(&config.url).map_err(|err| {
            invalid_field("url", format!("Invalid Firebase URL '{}': {err}", config.url))
        })?;
        let location = L::connect(&url).map_err(|err| failed(native_call_error("createNew", err)))?;
        LOGGER.debug(format!("Connected to {url}"));
        Ok(Self::from_native(location, config.converter_options()))
    }

    async fn login(&self, options: LoginOptions) -> DatabaseResult<AuthData> {
        let credentials = options.credentials()?;
        let auth = self.authenticate(&credentials).await?;
        LOGGER.debug(format!(
            "Signed in {} via {}",
            auth.uid,
            credentials.login_type()
        ));
        Ok(auth)
    }

    async fn create_user(&self, options: CreateUserOptions) -> DatabaseResult<String> {
        let (email, password) = options.validate()?;
        let (tx, rx) = oneshot::channel::<NativeResult<String>>();
        self.location
            .create_user(
                &email,
                &password,
                Box::new(move |result| {
                    let _ = tx.send(result);
                }),
            )
            .map_err(|err| failed(native_call_error("createUser", err)))?;
        completion("createUser", rx).await
    }

    async fn logout(&self) -> DatabaseResult<bool> {
        self.unauth().await
    }

    async fn unauth(&self) -> DatabaseResult<bool> {
        self.location
            .unauth()
            .map_err(|err| failed(native_call_error("unauth", err)))?;
        Ok(true)
    }

    fn get_auth(&self) -> DatabaseResult<Option<AuthData>> {
        self.location
            .auth_data()
            .map(|native| AuthData::from_native(native, self.converter.as_ref()))
            .transpose()
    }

    async fn push(&self, data: Value) -> DatabaseResult<bool> {
        let target = self
            .location
            .child_by_auto_id()
            .map_err(|err| failed(native_call_error("push", err)))?;
        self.write(&target, "push", &data).await
    }

    async fn set(&self, data: Value) -> DatabaseResult<bool> {
        self.write(&self.location, "set", &data).await
    }

    async fn set_value(&self, path: &str, value: Value) -> DatabaseResult<bool> {
        let target = self.child_location(path)?;
        self.write(&target, "setValue", &value).await
    }

    async fn query(
        &self,
        callback: SnapshotListener,
        path: Option<&str>,
        options: QueryOptions,
    ) -> DatabaseResult<EventToken> {
        let plan = QueryPlan::translate(&options)?;
        let target = match path {
            Some(path) if !path.trim_matches('/').is_empty() => self.child_location(path)?,
            _ => self.location.clone(),
        };
        let query = plan.apply(&target, self.converter.as_ref()).map_err(failed)?;
        self.subscriptions
            .subscribe(
                &query,
                EventType::Value,
                Arc::clone(&self.converter),
                callback,
                None,
            )
            .map_err(failed)
    }

    async fn remove(&self, key: Option<&str>) -> DatabaseResult<bool> {
        match key {
            Some(key) => {
                let target = self.child_location(key)?;
                self.write(&target, "remove", &Value::Null).await
            }
            None => self.write(&self.location, "remove", &Value::Null).await,
        }
    }

    fn on(
        &self,
        event_name: &str,
        callback: SnapshotListener,
        error_callback: Option<ErrorListener>,
    ) -> DatabaseResult<EventToken> {
        let event: EventType = event_name.parse()?;
        self.subscriptions
            .subscribe(
                &self.location,
                event,
                Arc::clone(&self.converter),
                callback,
                error_callback,
            )
            .map_err(failed)
    }

    fn off(&self, event_name: &str, token: &EventToken) -> DatabaseResult<bool> {
        let event: EventType = event_name.parse()?;
        self.subscriptions.unsubscribe(event, token).map_err(failed)
    }

    fn child(&self, path: &str) -> DatabaseResult<Self> {
        Ok(self.derive(self.child_location(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::error::DatabaseErrorCode;
    use crate::database::memory::MemoryLocation;
    use crate::database::native::NativeError;
    use crate::database::snapshot::DataSnapshot;
    use crate::platform::android::AndroidConverter;
    use futures::executor::block_on;
    use serde_json::json;
    use std::sync::Mutex;

    type TestFirebase = Firebase<MemoryLocation<AndroidConverter>>;

    fn root(name: &str) -> TestFirebase {
        TestFirebase::create_new(FirebaseConfig::new(format!("https://{name}.api.test"))).unwrap()
    }

    fn collector() -> (Arc<Mutex<Vec<DataSnapshot>>>, SnapshotListener) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let listener: SnapshotListener = Arc::new(move |snapshot: DataSnapshot| {
            captured.lock().unwrap().push(snapshot);
        });
        (seen, listener)
    }

    #[test]
    fn config_deserializes_from_host_arguments() {
        let config: FirebaseConfig =
            serde_json::from_value(json!({ "url": "https://x.test", "unsupportedValues": "drop" }))
                .unwrap();
        assert_eq!(config.unsupported_values, UnsupportedValuePolicy::Drop);

        let config: FirebaseConfig = serde_json::from_value(json!({ "url": "https://x.test" })).unwrap();
        assert_eq!(config.unsupported_values, UnsupportedValuePolicy::Reject);
    }

    #[test]
    fn create_new_rejects_invalid_urls() {
        let err = TestFirebase::create_new(FirebaseConfig::new("not a url")).unwrap_err();
        assert_eq!(err.code, DatabaseErrorCode::InvalidArgument);
        assert_eq!(err.field(), Some("url"));
    }

    #[test]
    fn set_then_child_reads_back() {
        let db = root("set-child");
        assert!(block_on(db.set(json!({ "user": { "name": "Ada" } }))).unwrap());

        let (seen, listener) = collector();
        db.child("user/name")
            .unwrap()
            .on("value", listener, None)
            .unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].key(), "name");
        assert_eq!(seen[0].val(), &json!("Ada"));
    }

    #[test]
    fn child_handles_leave_the_parent_untouched() {
        let db = root("child-untouched");
        let child = db.child("a/b").unwrap();
        assert_eq!(child.key().as_deref(), Some("b"));
        assert_eq!(db.key(), None);
        assert!(db.child("").is_err());
    }

    #[test]
    fn set_value_and_remove_by_key() {
        let db = root("set-value-remove");
        block_on(db.set_value("items/one", json!(1))).unwrap();
        block_on(db.set_value("items/two", json!(2))).unwrap();
        assert!(block_on(db.remove(Some("items/one"))).unwrap());
        assert_eq!(db.native().peek(), json!({ "items": { "two": 2 } }));

        let items = db.child("items").unwrap();
        assert!(block_on(items.remove(None)).unwrap());
        assert_eq!(db.native().peek(), Value::Null);
    }

    #[test]
    fn synchronous_native_failures_become_native_call_errors() {
        let db = root("sync-failure");
        db.native().throw_on_next_write(NativeError::new("bridge threw"));
        let err = block_on(db.set(json!(1))).unwrap_err();
        assert_eq!(err.code, DatabaseErrorCode::NativeCall);
        assert!(err.message().contains("bridge threw"));
    }

    #[test]
    fn completion_failures_become_callback_errors() {
        let db = root("async-failure");
        db.native()
            .reject_next_write(NativeError::permission_denied("rules rejected write"));
        let err = block_on(db.push(json!({ "a": 1 }))).unwrap_err();
        assert_eq!(err.code, DatabaseErrorCode::PermissionDenied);

        db.native().reject_next_write(NativeError::new("disconnected"));
        let err = block_on(db.set(json!(1))).unwrap_err();
        assert_eq!(err.code, DatabaseErrorCode::NativeCallback);
    }

    #[test]
    fn off_detaches_and_is_idempotent() {
        let db = root("off-idempotent");
        let (seen, listener) = collector();
        let token = db.on("value", listener, None).unwrap();
        assert_eq!(db.active_listeners(), 1);

        assert!(!db.off("child_added", &token).unwrap());
        assert!(db.off("value", &token).unwrap());
        assert!(!db.off("value", &token).unwrap());
        assert_eq!(db.active_listeners(), 0);

        block_on(db.set(json!(5))).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn query_builds_plan_and_delivers_value_events() {
        let db = root("query-plan");
        block_on(db.set(json!({ "scores": { "a": 30, "b": 10, "c": 20 } }))).unwrap();

        let (seen, listener) = collector();
        let options = QueryOptions::from_value(json!({
            "orderBy": { "type": "VALUE" },
            "limit": { "type": "LAST", "value": 2 }
        }))
        .unwrap();
        block_on(db.query(listener, Some("scores"), options)).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].key(), "scores");
        assert_eq!(seen[0].val(), &json!({ "a": 30, "c": 20 }));
    }

    #[test]
    fn invalid_query_options_attach_nothing() {
        let db = root("query-invalid");
        let (seen, listener) = collector();
        let options = QueryOptions::from_value(json!({ "orderBy": { "type": "CHILD" } })).unwrap();
        let err = block_on(db.query(listener, None, options)).unwrap_err();
        assert_eq!(err.field(), Some("orderBy.value"));
        assert_eq!(db.native().observer_count(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn login_and_logout_update_auth_state() {
        let db = root("login-logout");
        assert_eq!(db.get_auth().unwrap(), None);

        let auth = block_on(db.login(LoginOptions::anonymous())).unwrap();
        assert_eq!(auth.provider, "anonymous");
        assert_eq!(db.get_auth().unwrap().map(|auth| auth.uid), Some(auth.uid));

        assert!(block_on(db.logout()).unwrap());
        assert_eq!(db.get_auth().unwrap(), None);
    }

    #[test]
    fn password_login_uses_created_account() {
        let db = root("password-login");
        let uid = block_on(db.create_user(CreateUserOptions::new("ada@example.com", "pw"))).unwrap();
        let auth = block_on(db.login(LoginOptions::password("ada@example.com", "pw"))).unwrap();
        assert_eq!(auth.uid, uid);
        assert_eq!(auth.auth["email"], json!("ada@example.com"));

        let err = block_on(db.login(LoginOptions::password("ada@example.com", "nope"))).unwrap_err();
        assert_eq!(err.code, DatabaseErrorCode::PermissionDenied);
    }
}
