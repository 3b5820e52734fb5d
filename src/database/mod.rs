//! # Realtime Database bridge
//!
//! One platform-neutral facade, [`Firebase`], over the native Realtime Database
//! SDK of the host platform. The facade translates in both directions:
//!
//! - native snapshots into [`DataSnapshot`]s holding plain value trees
//!   (`serde_json::Value`), through the platform [`ValueConverter`];
//! - value trees into native objects for writes;
//! - declarative [`QueryOptions`] into native order/range/limit builder chains;
//! - portable event names (`value`, `child_added`, ...) into native event types;
//! - native completion callbacks into futures.
//!
//! The native SDK is reached through the traits in [`native`]. The crate ships
//! [`MemoryLocation`], an in-process implementation of those traits, so the
//! whole bridge can run on a development host.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use firebase_bridge::database::{DataSnapshot, FirebaseApi, FirebaseConfig, MemoryFirebase};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let root = MemoryFirebase::create_new(FirebaseConfig::new("https://demo.firebaseio.com"))?;
//! root.push(json!({ "text": "hello" })).await?;
//!
//! let token = root.on(
//!     "child_added",
//!     Arc::new(|snapshot: DataSnapshot| println!("{} => {}", snapshot.key(), snapshot.val())),
//!     None,
//! )?;
//! root.off("child_added", &token)?;
//! # Ok(())
//! # }
//! ```

mod api;
pub mod error;
mod events;
mod memory;
pub mod native;
mod path;
pub mod query;
mod snapshot;
pub mod value;

#[doc(inline)]
pub use api::{Firebase, FirebaseApi, FirebaseConfig};

#[doc(inline)]
pub use error::{DatabaseError, DatabaseErrorCode, DatabaseResult};

#[doc(inline)]
pub use events::{ErrorListener, EventToken, EventType, SnapshotListener};

#[doc(inline)]
pub use memory::{MemoryLocation, MemoryQuery, MemorySnapshot};

#[doc(inline)]
pub use query::{QueryOption, QueryOptions, QueryPlan, QueryStep};

#[doc(inline)]
pub use snapshot::DataSnapshot;

#[doc(inline)]
pub use value::{ConverterOptions, UnsupportedValuePolicy, ValueConverter};

/// Facade over the in-memory SDK with the converter of the build target.
pub type MemoryFirebase = Firebase<MemoryLocation<crate::platform::PlatformConverter>>;
