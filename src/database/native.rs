//! Outbound contract consumed from the native Realtime Database/Auth SDKs.
//!
//! The bridge never talks to Java or Objective-C directly. Each platform
//! binding implements these traits over its SDK handles (`com.firebase.client.Firebase`
//! on Android, `Firebase`/`FQuery` on iOS), and [`crate::database::MemoryLocation`]
//! implements them in-process for tests.
//!
//! Native calls return `Err(NativeError)` for failures raised synchronously
//! (what the SDK would throw), while asynchronous outcomes are reported through
//! the completion closures. A completion that is never invoked leaves the
//! matching bridge future pending.

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::database::value::ValueConverter;

/// Error code the SDKs use for rule and credential rejections.
pub const PERMISSION_DENIED_CODE: i64 = -3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeError {
    pub message: String,
    pub code: Option<i64>,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: i64) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::with_code(message, PERMISSION_DENIED_CODE)
    }

    pub fn is_permission_denied(&self) -> bool {
        self.code == Some(PERMISSION_DENIED_CODE)
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for NativeError {}

pub type NativeResult<T> = Result<T, NativeError>;

/// Native event enumerants (`FEventType` on iOS, listener kinds on Android).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NativeEventType {
    Value,
    ChildAdded,
    ChildRemoved,
    ChildChanged,
    ChildMoved,
}

/// Observer handle returned by the native subscription call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub u64);

/// Authentication payload as the SDK reports it; `auth` is a native object tree.
#[derive(Clone, Debug)]
pub struct NativeAuthData<O> {
    pub uid: String,
    pub provider: String,
    pub expires: i64,
    pub auth: O,
}

pub type Completion = Box<dyn FnOnce(NativeResult<()>) + Send>;
pub type AuthCompletion<O> = Box<dyn FnOnce(NativeResult<NativeAuthData<O>>) + Send>;
pub type UserCompletion = Box<dyn FnOnce(NativeResult<String>) + Send>;
pub type SnapshotCallback<S> = Arc<dyn Fn(S) + Send + Sync>;
pub type CancelCallback = Arc<dyn Fn(NativeError) + Send + Sync>;

pub trait NativeSnapshot: Send + 'static {
    type Object;

    fn value(&self) -> Self::Object;

    /// Last path segment of the node, `None` for the root.
    fn key(&self) -> Option<String>;
}

pub trait NativeObservable: Clone + Send + Sync + 'static {
    type Object: Clone + Send + Sync + 'static;
    type Snapshot: NativeSnapshot<Object = Self::Object>;

    fn observe(
        &self,
        event: NativeEventType,
        on_snapshot: SnapshotCallback<Self::Snapshot>,
        on_cancel: CancelCallback,
    ) -> NativeResult<NativeHandle>;

    fn remove_observer(&self, handle: NativeHandle) -> NativeResult<()>;
}

/// Query produced by one of the `order_by_*` calls on a location. Range and
/// limit calls narrow it further and return a new query.
pub trait NativeQuery: NativeObservable {
    fn start_at(&self, value: Self::Object) -> NativeResult<Self>;
    fn end_at(&self, value: Self::Object) -> NativeResult<Self>;
    fn equal_to(&self, value: Self::Object) -> NativeResult<Self>;
    fn limit_to_first(&self, limit: u32) -> NativeResult<Self>;
    fn limit_to_last(&self, limit: u32) -> NativeResult<Self>;
}

pub trait NativeLocation: NativeObservable {
    type Query: NativeQuery<Object = Self::Object, Snapshot = Self::Snapshot>;
    type Converter: ValueConverter<Native = Self::Object>;

    fn connect(url: &Url) -> NativeResult<Self>;
    fn child(&self, path: &str) -> NativeResult<Self>;
    fn child_by_auto_id(&self) -> NativeResult<Self>;
    fn key(&self) -> Option<String>;

    fn set_value(&self, value: Self::Object, completion: Completion) -> NativeResult<()>;

    fn order_by_key(&self) -> NativeResult<Self::Query>;
    fn order_by_value(&self) -> NativeResult<Self::Query>;
    fn order_by_priority(&self) -> NativeResult<Self::Query>;
    fn order_by_child(&self, path: &str) -> NativeResult<Self::Query>;

    fn auth_anonymously(&self, completion: AuthCompletion<Self::Object>) -> NativeResult<()>;
    fn auth_with_password(
        &self,
        email: &str,
        password: &str,
        completion: AuthCompletion<Self::Object>,
    ) -> NativeResult<()>;
    fn auth_with_custom_token(
        &self,
        token: &str,
        completion: AuthCompletion<Self::Object>,
    ) -> NativeResult<()>;
    fn auth_with_oauth_token(
        &self,
        provider: &str,
        token: &str,
        completion: AuthCompletion<Self::Object>,
    ) -> NativeResult<()>;
    fn create_user(
        &self,
        email: &str,
        password: &str,
        completion: UserCompletion,
    ) -> NativeResult<()>;
    fn unauth(&self) -> NativeResult<()>;
    fn auth_data(&self) -> Option<NativeAuthData<Self::Object>>;
}
