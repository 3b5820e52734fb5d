use serde_json::Value;

use crate::database::error::DatabaseResult;
use crate::database::native::NativeSnapshot;
use crate::database::path::normalize_path;
use crate::database::value::ValueConverter;

/// Immutable `(value, key)` pair delivered to event callbacks.
///
/// The native snapshot is converted once, when the `DataSnapshot` is built, so
/// `val()` never touches the native object again.
#[derive(Clone, Debug, PartialEq)]
pub struct DataSnapshot {
    key: String,
    value: Value,
}

impl DataSnapshot {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Wraps a native snapshot, converting its value with the platform converter.
    pub fn from_native<S, C>(snapshot: &S, converter: &C) -> DatabaseResult<Self>
    where
        S: NativeSnapshot,
        C: ValueConverter<Native = S::Object>,
    {
        let value = converter.to_tree(&snapshot.value())?;
        Ok(Self {
            key: snapshot.key().unwrap_or_default(),
            value,
        })
    }

    pub fn val(&self) -> &Value {
        &self.value
    }

    /// Last path segment of the node, `""` for the root.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Returns the snapshot of a descendant; missing data yields a `null` value.
    pub fn child(&self, relative_path: &str) -> DatabaseResult<DataSnapshot> {
        let segments = normalize_path(relative_path)?;
        let Some(last) = segments.last() else {
            return Ok(self.clone());
        };
        let value = value_at(&self.value, &segments).cloned().unwrap_or(Value::Null);
        Ok(DataSnapshot::new(last.clone(), value))
    }

    pub fn has_child(&self, relative_path: &str) -> DatabaseResult<bool> {
        let segments = normalize_path(relative_path)?;
        Ok(value_at(&self.value, &segments)
            .map(|value| !value.is_null())
            .unwrap_or(false))
    }

    pub fn has_children(&self) -> bool {
        self.size() > 0
    }

    /// Number of direct children.
    pub fn size(&self) -> usize {
        match &self.value {
            Value::Object(map) => map.len(),
            Value::Array(array) => array.len(),
            _ => 0,
        }
    }
}

fn value_at<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(array) => array.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
