//! Event names, subscription tokens and the adapter that routes native
//! snapshots to caller callbacks.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, Weak};

use crate::database::error::{
    invalid_field, native_call_error, native_callback_error, DatabaseError, DatabaseResult,
};
use crate::database::native::{
    CancelCallback, NativeError, NativeEventType, NativeObservable, NativeResult, SnapshotCallback,
};
use crate::database::snapshot::DataSnapshot;
use crate::database::value::ValueConverter;
use crate::logger::Logger;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@firebase-bridge/events"));

/// Token ids are unique process-wide so a token can never match a
/// subscription created under a different root.
static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

pub type SnapshotListener = Arc<dyn Fn(DataSnapshot) + Send + Sync>;
pub type ErrorListener = Arc<dyn Fn(DatabaseError) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    Value,
    ChildAdded,
    ChildRemoved,
    ChildChanged,
    ChildMoved,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Value => "value",
            EventType::ChildAdded => "child_added",
            EventType::ChildRemoved => "child_removed",
            EventType::ChildChanged => "child_changed",
            EventType::ChildMoved => "child_moved",
        }
    }

    pub fn native(self) -> NativeEventType {
        match self {
            EventType::Value => NativeEventType::Value,
            EventType::ChildAdded => NativeEventType::ChildAdded,
            EventType::ChildRemoved => NativeEventType::ChildRemoved,
            EventType::ChildChanged => NativeEventType::ChildChanged,
            EventType::ChildMoved => NativeEventType::ChildMoved,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "value" => Ok(EventType::Value),
            "child_added" => Ok(EventType::ChildAdded),
            "child_removed" => Ok(EventType::ChildRemoved),
            "child_changed" => Ok(EventType::ChildChanged),
            "child_moved" => Ok(EventType::ChildMoved),
            other => Err(invalid_field(
                "eventName",
                format!(
                    "Unsupported event type '{other}', use value, child_added, child_removed, child_changed or child_moved"
                ),
            )),
        }
    }
}

/// Handle pairing one `on` call with one `off` call.
///
/// Tokens are deliberately not `Clone`: `off` borrows the token, and a second
/// `off` with the same token is a no-op.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct EventToken {
    id: u64,
    event: EventType,
}

impl EventToken {
    pub fn event_type(&self) -> EventType {
        self.event
    }
}

type Detach = Box<dyn FnOnce() -> NativeResult<()> + Send>;

struct Subscription {
    event: EventType,
    detach: Detach,
}

type Subscriptions = Mutex<HashMap<u64, Subscription>>;

/// Live subscriptions of one root handle and every handle derived from it.
/// A subscription the native SDK cancels leaves the registry with it.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    subscriptions: Arc<Subscriptions>,
}

impl SubscriptionRegistry {
    pub(crate) fn subscribe<O, C>(
        &self,
        target: &O,
        event: EventType,
        converter: Arc<C>,
        callback: SnapshotListener,
        error_callback: Option<ErrorListener>,
    ) -> DatabaseResult<EventToken>
    where
        O: NativeObservable,
        C: ValueConverter<Native = O::Object>,
    {
        let snapshot_errors = error_callback.clone();
        let on_snapshot: SnapshotCallback<O::Snapshot> = Arc::new(move |native: O::Snapshot| {
            match DataSnapshot::from_native(&native, converter.as_ref()) {
                Ok(snapshot) => callback(snapshot),
                Err(err) => report(snapshot_errors.as_ref(), event, err),
            }
        });
        let id = NEXT_TOKEN_ID.fetch_add(1, Ordering::SeqCst);
        let cancelled = Arc::new(AtomicBool::new(false));
        let registry: Weak<Subscriptions> = Arc::downgrade(&self.subscriptions);
        let cancel_flag = Arc::clone(&cancelled);
        let on_cancel: CancelCallback = Arc::new(move |err: NativeError| {
            cancel_flag.store(true, Ordering::SeqCst);
            if let Some(subscriptions) = registry.upgrade() {
                subscriptions.lock().unwrap().remove(&id);
            }
            report(
                error_callback.as_ref(),
                event,
                native_callback_error(event.as_str(), err),
            )
        });

        let handle = target
            .observe(event.native(), on_snapshot, on_cancel)
            .map_err(|err| native_call_error("on", err))?;

        let observable = target.clone();
        let mut subscriptions = self.subscriptions.lock().unwrap();
        // Cancelled while attaching: the native side has already let go.
        if cancelled.load(Ordering::SeqCst) {
            LOGGER.debug(format!("{event} listener was cancelled while attaching"));
        } else {
            subscriptions.insert(
                id,
                Subscription {
                    event,
                    detach: Box::new(move || observable.remove_observer(handle)),
                },
            );
        }
        Ok(EventToken { id, event })
    }

    /// Detaches the subscription behind `token`. Unknown, already removed and
    /// mismatched tokens leave everything untouched and return `Ok(false)`.
    pub(crate) fn unsubscribe(&self, event: EventType, token: &EventToken) -> DatabaseResult<bool> {
        let subscription = {
            let mut subscriptions = self.subscriptions.lock().unwrap();
            match subscriptions.get(&token.id) {
                None => {
                    LOGGER.debug(format!(
                        "off({event}) ignored: token is not registered on this location"
                    ));
                    return Ok(false);
                }
                Some(existing) if existing.event != event => {
                    LOGGER.warn(format!(
                        "off({event}) ignored: token was registered for {}",
                        existing.event
                    ));
                    return Ok(false);
                }
                Some(_) => subscriptions.remove(&token.id),
            }
        };

        match subscription {
            Some(subscription) => {
                (subscription.detach)().map_err(|err| native_call_error("off", err))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }
}

fn report(error_callback: Option<&ErrorListener>, event: EventType, err: DatabaseError) {
    match error_callback {
        Some(callback) => callback(err),
        None => LOGGER.debug(format!("Swallowing {event} listener error: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::error::DatabaseErrorCode;

    #[test]
    fn parses_portable_event_names() {
        assert_eq!("value".parse::<EventType>().unwrap(), EventType::Value);
        assert_eq!(
            "child_moved".parse::<EventType>().unwrap().native(),
            NativeEventType::ChildMoved
        );
    }

    #[test]
    fn rejects_unknown_event_names() {
        let err = "bogus_event".parse::<EventType>().unwrap_err();
        assert_eq!(err.code, DatabaseErrorCode::InvalidArgument);
        assert_eq!(err.field(), Some("eventName"));
        assert!("Value".parse::<EventType>().is_err());
    }

    #[test]
    fn unknown_token_is_a_no_op() {
        let registry = SubscriptionRegistry::default();
        let token = EventToken {
            id: u64::MAX,
            event: EventType::Value,
        };
        assert!(!registry.unsubscribe(EventType::Value, &token).unwrap());
        assert_eq!(registry.len(), 0);
    }
}
