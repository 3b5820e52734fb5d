//! Translation of declarative query descriptors into native query-builder calls.
//!
//! A descriptor is validated completely into a [`QueryPlan`] before any native
//! call is made. The plan then runs strictly as orderBy, range, limit, which
//! is the only order the native builders accept.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use crate::database::error::{
    invalid_argument, invalid_field, native_call_error, DatabaseError, DatabaseResult,
};
use crate::database::native::{NativeLocation, NativeQuery};
use crate::database::path::normalize_path;
use crate::database::value::ValueConverter;

/// Query option descriptor as the host passes it:
/// `{ orderBy: {type, value?}, range?: {type, value}, limit?: {type, value} }`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    #[serde(default)]
    pub order_by: Option<QueryOption>,
    #[serde(default)]
    pub range: Option<QueryOption>,
    #[serde(default)]
    pub limit: Option<QueryOption>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct QueryOption {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

impl QueryOption {
    pub fn new(kind: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            kind: Some(kind.into()),
            value,
        }
    }
}

impl QueryOptions {
    pub fn from_value(value: Value) -> DatabaseResult<Self> {
        serde_json::from_value(value)
            .map_err(|err| invalid_argument(format!("Malformed query options: {err}")))
    }
}

/// Lowercases and strips underscores so `START_AT`, `startAt` and `start_at` agree.
pub(crate) fn option_token(raw: &str) -> String {
    raw.chars()
        .filter(|ch| *ch != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderByType {
    Key,
    Value,
    Priority,
    Child,
}

impl FromStr for OrderByType {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match option_token(s).as_str() {
            "key" => Ok(OrderByType::Key),
            "value" => Ok(OrderByType::Value),
            "priority" => Ok(OrderByType::Priority),
            "child" => Ok(OrderByType::Child),
            _ => Err(invalid_argument(format!("Unknown orderBy type '{s}'"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeType {
    StartAt,
    EndAt,
    EqualTo,
}

impl FromStr for RangeType {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match option_token(s).as_str() {
            "startat" => Ok(RangeType::StartAt),
            "endat" => Ok(RangeType::EndAt),
            "equalto" => Ok(RangeType::EqualTo),
            _ => Err(invalid_argument(format!("Unknown range type '{s}'"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitType {
    First,
    Last,
}

impl FromStr for LimitType {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match option_token(s).as_str() {
            "first" => Ok(LimitType::First),
            "last" => Ok(LimitType::Last),
            _ => Err(invalid_argument(format!("Unknown limit type '{s}'"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderBy {
    Key,
    Value,
    Priority,
    Child(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum RangeBound {
    StartAt(Value),
    EndAt(Value),
    EqualTo(Value),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Limit {
    First(u32),
    Last(u32),
}

/// One native builder call, in the order it is issued.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryStep {
    OrderByKey,
    OrderByValue,
    OrderByPriority,
    OrderByChild(String),
    StartAt(Value),
    EndAt(Value),
    EqualTo(Value),
    LimitToFirst(u32),
    LimitToLast(u32),
}

impl fmt::Display for QueryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStep::OrderByKey => f.write_str("orderByKey()"),
            QueryStep::OrderByValue => f.write_str("orderByValue()"),
            QueryStep::OrderByPriority => f.write_str("orderByPriority()"),
            QueryStep::OrderByChild(path) => write!(f, "orderByChild({path})"),
            QueryStep::StartAt(value) => write!(f, "startAt({value})"),
            QueryStep::EndAt(value) => write!(f, "endAt({value})"),
            QueryStep::EqualTo(value) => write!(f, "equalTo({value})"),
            QueryStep::LimitToFirst(limit) => write!(f, "limitToFirst({limit})"),
            QueryStep::LimitToLast(limit) => write!(f, "limitToLast({limit})"),
        }
    }
}

/// Validated query: an ordering plus an optional range and limit.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryPlan {
    pub order_by: OrderBy,
    pub range: Option<RangeBound>,
    pub limit: Option<Limit>,
}

impl QueryPlan {
    pub fn translate(options: &QueryOptions) -> DatabaseResult<Self> {
        let order_by = translate_order_by(options.order_by.as_ref())?;
        let range = options.range.as_ref().map(translate_range).transpose()?;
        let limit = options.limit.as_ref().map(translate_limit).transpose()?;
        Ok(Self {
            order_by,
            range,
            limit,
        })
    }

    pub fn steps(&self) -> Vec<QueryStep> {
        let mut steps = Vec::with_capacity(3);
        steps.push(match &self.order_by {
            OrderBy::Key => QueryStep::OrderByKey,
            OrderBy::Value => QueryStep::OrderByValue,
            OrderBy::Priority => QueryStep::OrderByPriority,
            OrderBy::Child(path) => QueryStep::OrderByChild(path.clone()),
        });
        if let Some(range) = &self.range {
            steps.push(match range {
                RangeBound::StartAt(value) => QueryStep::StartAt(value.clone()),
                RangeBound::EndAt(value) => QueryStep::EndAt(value.clone()),
                RangeBound::EqualTo(value) => QueryStep::EqualTo(value.clone()),
            });
        }
        if let Some(limit) = self.limit {
            steps.push(match limit {
                Limit::First(count) => QueryStep::LimitToFirst(count),
                Limit::Last(count) => QueryStep::LimitToLast(count),
            });
        }
        steps
    }

    /// Issues the builder calls against `location`, returning the final native query.
    pub fn apply<L: NativeLocation>(
        &self,
        location: &L,
        converter: &L::Converter,
    ) -> DatabaseResult<L::Query> {
        let mut query = match &self.order_by {
            OrderBy::Key => location.order_by_key(),
            OrderBy::Value => location.order_by_value(),
            OrderBy::Priority => location.order_by_priority(),
            OrderBy::Child(path) => location.order_by_child(path),
        }
        .map_err(|err| native_call_error("orderBy", err))?;

        if let Some(range) = &self.range {
            query = match range {
                RangeBound::StartAt(value) => query.start_at(converter.to_native(value)),
                RangeBound::EndAt(value) => query.end_at(converter.to_native(value)),
                RangeBound::EqualTo(value) => query.equal_to(converter.to_native(value)),
            }
            .map_err(|err| native_call_error("range", err))?;
        }

        if let Some(limit) = self.limit {
            query = match limit {
                Limit::First(count) => query.limit_to_first(count),
                Limit::Last(count) => query.limit_to_last(count),
            }
            .map_err(|err| native_call_error("limit", err))?;
        }

        Ok(query)
    }
}

fn parse_kind<T>(option: &QueryOption, field: &str, hint: &str) -> DatabaseResult<T>
where
    T: FromStr<Err = DatabaseError>,
{
    let Some(kind) = option.kind.as_deref() else {
        return Err(invalid_field(field, format!("{field} is required")));
    };
    kind.parse::<T>().map_err(|_| {
        invalid_field(
            field,
            format!("Invalid {field} '{kind}', use one of {hint}"),
        )
    })
}

fn translate_order_by(option: Option<&QueryOption>) -> DatabaseResult<OrderBy> {
    let Some(option) = option else {
        return Err(invalid_field("orderBy", "orderBy is required"));
    };
    let kind: OrderByType = parse_kind(option, "orderBy.type", "key, value, priority, child")?;
    Ok(match kind {
        OrderByType::Key => OrderBy::Key,
        OrderByType::Value => OrderBy::Value,
        OrderByType::Priority => OrderBy::Priority,
        OrderByType::Child => OrderBy::Child(child_key(option.value.as_ref())?),
    })
}

fn child_key(value: Option<&Value>) -> DatabaseResult<String> {
    let path = match value {
        Some(Value::String(path)) if !path.trim_matches('/').is_empty() => path,
        Some(Value::String(_)) | None => {
            return Err(invalid_field(
                "orderBy.value",
                "When orderBy.type is 'child' you must set orderBy.value as well",
            ))
        }
        Some(other) => {
            return Err(invalid_field(
                "orderBy.value",
                format!("orderBy.value must be a child key path, got {other}"),
            ))
        }
    };
    if matches!(path.as_str(), "$key" | "$value" | "$priority") {
        return Err(invalid_field(
            "orderBy.value",
            format!("'{path}' is not a child key; use the matching orderBy.type instead"),
        ));
    }
    let segments = normalize_path(path)
        .map_err(|err| invalid_field("orderBy.value", err.message().to_string()))?;
    Ok(segments.join("/"))
}

fn translate_range(option: &QueryOption) -> DatabaseResult<RangeBound> {
    let kind: RangeType = parse_kind(option, "range.type", "startAt, endAt, equalTo")?;
    let Some(value) = option.value.clone() else {
        return Err(invalid_field("range.value", "Please set range.value"));
    };
    if matches!(value, Value::Array(_) | Value::Object(_)) {
        return Err(invalid_field(
            "range.value",
            "range.value must be a string, number, or boolean",
        ));
    }
    Ok(match kind {
        RangeType::StartAt => RangeBound::StartAt(value),
        RangeType::EndAt => RangeBound::EndAt(value),
        RangeType::EqualTo => RangeBound::EqualTo(value),
    })
}

fn translate_limit(option: &QueryOption) -> DatabaseResult<Limit> {
    let kind: LimitType = parse_kind(option, "limit.type", "first, last")?;
    let count = match option.value.as_ref() {
        None => return Err(invalid_field("limit.value", "Please set limit.value")),
        Some(value) => value
            .as_u64()
            .filter(|count| *count > 0)
            .and_then(|count| u32::try_from(count).ok())
            .ok_or_else(|| {
                invalid_field(
                    "limit.value",
                    format!("limit.value must be a positive integer, got {value}"),
                )
            })?,
    };
    Ok(match kind {
        LimitType::First => Limit::First(count),
        LimitType::Last => Limit::Last(count),
    })
}
