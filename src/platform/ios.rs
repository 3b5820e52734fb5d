//! iOS object shapes: `NSDictionary` (`allKeys` / `valueForKey:`), `NSArray`
//! (`count` / `objectAtIndex:`), `NSNumber`, `NSString` and `NSNull`.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::database::error::DatabaseResult;
use crate::database::value::{
    float_leaf, opaque_composite, unsupported_leaf, ConverterOptions, TreePath, ValueConverter,
};

/// `NSNumber` payload, distinguished by its `objCType`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NsNumber {
    Bool(bool),
    Integer(i64),
    Double(f64),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NsDictionary {
    keys: Vec<String>,
    values: HashMap<String, NsObject>,
}

impl NsDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: NsObject) {
        let key = key.into();
        if self.values.insert(key.clone(), value).is_none() {
            self.keys.push(key);
        }
    }

    pub fn all_keys(&self) -> &[String] {
        &self.keys
    }

    pub fn value_for_key(&self, key: &str) -> Option<&NsObject> {
        self.values.get(key)
    }

    pub fn count(&self) -> usize {
        self.keys.len()
    }
}

impl<K: Into<String>> FromIterator<(K, NsObject)> for NsDictionary {
    fn from_iter<I: IntoIterator<Item = (K, NsObject)>>(iter: I) -> Self {
        let mut dictionary = NsDictionary::new();
        for (key, value) in iter {
            dictionary.insert(key, value);
        }
        dictionary
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NsObject {
    Null,
    String(String),
    Number(NsNumber),
    Array(Vec<NsObject>),
    Dictionary(NsDictionary),
    /// A collection proxy that exposes neither `allKeys` nor `count`.
    Opaque { class_name: String },
    /// Any other object, e.g. `NSDate` or `NSData`.
    Other { class_name: String },
}

#[derive(Clone, Debug, Default)]
pub struct IosConverter {
    options: ConverterOptions,
}

impl IosConverter {
    fn convert(&self, object: &NsObject, path: &TreePath) -> DatabaseResult<Option<Value>> {
        match object {
            NsObject::Null => Ok(Some(Value::Null)),
            NsObject::String(value) => Ok(Some(Value::String(value.clone()))),
            NsObject::Number(NsNumber::Bool(value)) => Ok(Some(Value::Bool(*value))),
            NsObject::Number(NsNumber::Integer(value)) => Ok(Some(Value::from(*value))),
            NsObject::Number(NsNumber::Double(value)) => float_leaf(&self.options, path, *value),
            NsObject::Array(items) => {
                let mut converted = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    // A dropped element keeps its slot so later indices do not shift.
                    let value = self.convert(item, &path.join(index.to_string()))?;
                    converted.push(value.unwrap_or(Value::Null));
                }
                Ok(Some(Value::Array(converted)))
            }
            NsObject::Dictionary(dictionary) => {
                let mut converted = Map::with_capacity(dictionary.count());
                for key in dictionary.all_keys() {
                    let Some(item) = dictionary.value_for_key(key) else {
                        continue;
                    };
                    if let Some(value) = self.convert(item, &path.join(key.as_str()))? {
                        converted.insert(key.clone(), value);
                    }
                }
                Ok(Some(Value::Object(converted)))
            }
            NsObject::Opaque { class_name } => Ok(Some(opaque_composite(path, class_name))),
            NsObject::Other { class_name } => unsupported_leaf(&self.options, path, class_name),
        }
    }
}

impl ValueConverter for IosConverter {
    type Native = NsObject;

    fn with_options(options: ConverterOptions) -> Self {
        Self { options }
    }

    fn options(&self) -> &ConverterOptions {
        &self.options
    }

    fn to_tree(&self, native: &NsObject) -> DatabaseResult<Value> {
        Ok(self
            .convert(native, &TreePath::root())?
            .unwrap_or(Value::Null))
    }

    fn to_native(&self, tree: &Value) -> NsObject {
        match tree {
            Value::Null => NsObject::Null,
            Value::Bool(value) => NsObject::Number(NsNumber::Bool(*value)),
            Value::Number(number) => match number.as_i64() {
                Some(value) => NsObject::Number(NsNumber::Integer(value)),
                None => NsObject::Number(NsNumber::Double(number.as_f64().unwrap_or(f64::NAN))),
            },
            Value::String(value) => NsObject::String(value.clone()),
            Value::Array(items) => {
                NsObject::Array(items.iter().map(|item| self.to_native(item)).collect())
            }
            Value::Object(entries) => NsObject::Dictionary(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), self.to_native(value)))
                    .collect(),
            ),
        }
    }
}
