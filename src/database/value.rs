//! Conversion between native object trees and plain value trees.
//!
//! Value trees are `serde_json::Value`s. Each platform provides a
//! [`ValueConverter`] over its own native object shape; see
//! [`crate::platform::android`] and [`crate::platform::ios`].

use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::database::error::{unsupported_value, DatabaseResult};
use crate::logger::Logger;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@firebase-bridge/value"));

/// What to do with a native leaf that is neither a string, a boolean nor a number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnsupportedValuePolicy {
    /// Fail the conversion with an `UnsupportedValue` error.
    #[default]
    Reject,
    /// Omit the map entry (or null out the array element) and log a warning.
    Drop,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConverterOptions {
    pub unsupported_values: UnsupportedValuePolicy,
}

pub trait ValueConverter: Send + Sync + 'static {
    type Native: Clone + fmt::Debug + Send + Sync + 'static;

    fn with_options(options: ConverterOptions) -> Self
    where
        Self: Sized;

    fn options(&self) -> &ConverterOptions;

    /// Converts a native object into a value tree.
    fn to_tree(&self, native: &Self::Native) -> DatabaseResult<Value>;

    /// Rebuilds a native object from a value tree.
    fn to_native(&self, tree: &Value) -> Self::Native;
}

/// Location inside the tree being converted, used for diagnostics.
#[derive(Clone, Debug, Default)]
pub(crate) struct TreePath {
    segments: Vec<String>,
}

impl TreePath {
    pub(crate) fn root() -> Self {
        Self::default()
    }

    pub(crate) fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            f.write_str("/")
        } else {
            write!(f, "/{}", self.segments.join("/"))
        }
    }
}

/// Applies the unsupported-value policy. `Ok(None)` means the entry is dropped.
pub(crate) fn unsupported_leaf(
    options: &ConverterOptions,
    path: &TreePath,
    class_name: &str,
) -> DatabaseResult<Option<Value>> {
    match options.unsupported_values {
        UnsupportedValuePolicy::Reject => Err(unsupported_value(format!(
            "Native value of type {class_name} at {path} cannot be converted"
        ))),
        UnsupportedValuePolicy::Drop => {
            LOGGER.warn(format!(
                "Dropping native value of type {class_name} at {path}"
            ));
            Ok(None)
        }
    }
}

pub(crate) fn float_leaf(
    options: &ConverterOptions,
    path: &TreePath,
    value: f64,
) -> DatabaseResult<Option<Value>> {
    match Number::from_f64(value) {
        Some(number) => Ok(Some(Value::Number(number))),
        None => unsupported_leaf(options, path, "non-finite double"),
    }
}

/// Composite the SDK handed over without a usable key or index set.
pub(crate) fn opaque_composite(path: &TreePath, class_name: &str) -> Value {
    LOGGER.debug(format!(
        "Treating non-enumerable {class_name} at {path} as an empty map"
    ));
    Value::Object(Default::default())
}
