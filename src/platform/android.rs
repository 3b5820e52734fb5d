//! Android object shapes: the SDK hands snapshots over as boxed Java objects
//! (`java.util.HashMap`, `java.util.ArrayList`, `java.lang.Long`, ...).

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::database::error::DatabaseResult;
use crate::database::value::{
    float_leaf, opaque_composite, unsupported_leaf, ConverterOptions, TreePath, ValueConverter,
};

#[derive(Clone, Debug, PartialEq)]
pub enum JavaObject {
    Null,
    Boolean(bool),
    Long(i64),
    Double(f64),
    String(String),
    ArrayList(Vec<JavaObject>),
    HashMap(HashMap<String, JavaObject>),
    /// A `java.util.Map` implementation whose entry set cannot be read.
    Opaque { class_name: String },
    /// Any other boxed object, e.g. `java.util.Date`.
    Other { class_name: String },
}

impl JavaObject {
    pub fn class_name(&self) -> &str {
        match self {
            JavaObject::Null => "null",
            JavaObject::Boolean(_) => "java.lang.Boolean",
            JavaObject::Long(_) => "java.lang.Long",
            JavaObject::Double(_) => "java.lang.Double",
            JavaObject::String(_) => "java.lang.String",
            JavaObject::ArrayList(_) => "java.util.ArrayList",
            JavaObject::HashMap(_) => "java.util.HashMap",
            JavaObject::Opaque { class_name } | JavaObject::Other { class_name } => class_name,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AndroidConverter {
    options: ConverterOptions,
}

impl AndroidConverter {
    fn convert(&self, object: &JavaObject, path: &TreePath) -> DatabaseResult<Option<Value>> {
        match object {
            JavaObject::Null => Ok(Some(Value::Null)),
            JavaObject::Boolean(value) => Ok(Some(Value::Bool(*value))),
            JavaObject::Long(value) => Ok(Some(Value::from(*value))),
            JavaObject::Double(value) => float_leaf(&self.options, path, *value),
            JavaObject::String(value) => Ok(Some(Value::String(value.clone()))),
            JavaObject::ArrayList(items) => {
                let mut converted = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    // A dropped element keeps its slot so later indices do not shift.
                    let value = self.convert(item, &path.join(index.to_string()))?;
                    converted.push(value.unwrap_or(Value::Null));
                }
                Ok(Some(Value::Array(converted)))
            }
            JavaObject::HashMap(entries) => {
                let mut converted = Map::with_capacity(entries.len());
                for (key, item) in entries {
                    if let Some(value) = self.convert(item, &path.join(key.as_str()))? {
                        converted.insert(key.clone(), value);
                    }
                }
                Ok(Some(Value::Object(converted)))
            }
            JavaObject::Opaque { class_name } => Ok(Some(opaque_composite(path, class_name))),
            JavaObject::Other { class_name } => unsupported_leaf(&self.options, path, class_name),
        }
    }
}

impl ValueConverter for AndroidConverter {
    type Native = JavaObject;

    fn with_options(options: ConverterOptions) -> Self {
        Self { options }
    }

    fn options(&self) -> &ConverterOptions {
        &self.options
    }

    fn to_tree(&self, native: &JavaObject) -> DatabaseResult<Value> {
        Ok(self
            .convert(native, &TreePath::root())?
            .unwrap_or(Value::Null))
    }

    fn to_native(&self, tree: &Value) -> JavaObject {
        match tree {
            Value::Null => JavaObject::Null,
            Value::Bool(value) => JavaObject::Boolean(*value),
            Value::Number(number) => match number.as_i64() {
                Some(value) => JavaObject::Long(value),
                // u64 above i64::MAX has no java.lang.Long form and widens to Double.
                None => JavaObject::Double(number.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(value) => JavaObject::String(value.clone()),
            Value::Array(items) => {
                JavaObject::ArrayList(items.iter().map(|item| self.to_native(item)).collect())
            }
            Value::Object(entries) => JavaObject::HashMap(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), self.to_native(value)))
                    .collect(),
            ),
        }
    }
}
