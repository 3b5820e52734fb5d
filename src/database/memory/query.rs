use std::cmp::Ordering;

use serde_json::Value;

use crate::database::native::{NativeError, NativeResult};

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub(crate) enum QueryIndex {
    #[default]
    Priority,
    Key,
    Value,
    Child(Vec<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct QueryBound {
    pub(crate) value: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum QueryLimit {
    First(u32),
    Last(u32),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct QueryParams {
    pub(crate) index: QueryIndex,
    pub(crate) start: Option<QueryBound>,
    pub(crate) end: Option<QueryBound>,
    pub(crate) limit: Option<QueryLimit>,
}

impl QueryParams {
    pub(crate) fn with_index(index: QueryIndex) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub(crate) fn set_start(&mut self, value: Value) -> NativeResult<()> {
        if self.start.is_some() {
            return Err(NativeError::new(
                "Query.startAt: Starting point was already set (by another call to startAt or equalTo)",
            ));
        }
        self.start = Some(QueryBound { value });
        Ok(())
    }

    pub(crate) fn set_end(&mut self, value: Value) -> NativeResult<()> {
        if self.end.is_some() {
            return Err(NativeError::new(
                "Query.endAt: Ending point was already set (by another call to endAt or equalTo)",
            ));
        }
        self.end = Some(QueryBound { value });
        Ok(())
    }

    pub(crate) fn set_limit(&mut self, limit: QueryLimit) -> NativeResult<()> {
        if self.limit.is_some() {
            return Err(NativeError::new(
                "Query.limit: Limit was already set (by another call to limit, limitToFirst, or limitToLast)",
            ));
        }
        self.limit = Some(limit);
        Ok(())
    }

    /// Children of `node` that match the query, in query order.
    pub(crate) fn view(&self, node: &Value) -> Vec<(String, Value)> {
        let mut children = ordered_children(node);
        children.sort_by(|(left_key, left), (right_key, right)| {
            compare_values(&self.sort_value(left_key, left), &self.sort_value(right_key, right))
                .then_with(|| compare_keys(left_key, right_key))
        });

        children.retain(|(key, value)| {
            let sort_value = self.sort_value(key, value);
            let after_start = self.start.as_ref().map_or(true, |bound| {
                compare_values(&sort_value, &bound.value) != Ordering::Less
            });
            let before_end = self.end.as_ref().map_or(true, |bound| {
                compare_values(&sort_value, &bound.value) != Ordering::Greater
            });
            after_start && before_end
        });

        match self.limit {
            Some(QueryLimit::First(count)) => children.truncate(count as usize),
            Some(QueryLimit::Last(count)) => {
                let count = count as usize;
                if children.len() > count {
                    children.drain(..children.len() - count);
                }
            }
            None => {}
        }
        children
    }

    fn sort_value(&self, key: &str, value: &Value) -> Value {
        match &self.index {
            // Priorities are not stored, so every child has a null priority.
            QueryIndex::Priority => Value::Null,
            QueryIndex::Key => Value::String(key.to_string()),
            QueryIndex::Value => value.clone(),
            QueryIndex::Child(path) => {
                let mut current = value;
                for segment in path {
                    match current.get(segment.as_str()) {
                        Some(next) => current = next,
                        None => return Value::Null,
                    }
                }
                current.clone()
            }
        }
    }
}

/// Children of a node ordered by key, arrays exposing their indexes as keys.
pub(crate) fn ordered_children(node: &Value) -> Vec<(String, Value)> {
    let mut children: Vec<(String, Value)> = match node {
        Value::Object(map) => map
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, value)| !value.is_null())
            .map(|(index, value)| (index.to_string(), value.clone()))
            .collect(),
        _ => Vec::new(),
    };
    children.sort_by(|(left, _), (right, _)| compare_keys(left, right));
    children
}

/// Integer-like keys sort numerically before all other keys.
pub(crate) fn compare_keys(left: &str, right: &str) -> Ordering {
    match (left.parse::<i64>(), right.parse::<i64>()) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => left.cmp(right),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) | Value::Object(_) => 5,
    }
}

/// Orders values the way the database does: null, false, true, numbers,
/// strings, then objects.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Ordering {
    let rank = type_rank(left).cmp(&type_rank(right));
    if rank != Ordering::Equal {
        return rank;
    }
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => {
            let left = left.as_f64().unwrap_or_default();
            let right = right.as_f64().unwrap_or_default();
            left.partial_cmp(&right).unwrap_or(Ordering::Equal)
        }
        (Value::String(left), Value::String(right)) => left.cmp(right),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(children: &[(String, Value)]) -> Vec<&str> {
        children.iter().map(|(key, _)| key.as_str()).collect()
    }

    #[test]
    fn key_order_puts_integers_first() {
        let node = json!({ "b": 1, "10": 1, "a": 1, "2": 1 });
        assert_eq!(keys(&ordered_children(&node)), ["2", "10", "a", "b"]);
    }

    #[test]
    fn value_order_with_limit() {
        let node = json!({ "a": 30, "b": 10, "c": "x", "d": 20, "e": true });
        let mut params = QueryParams::with_index(QueryIndex::Value);
        params.set_limit(QueryLimit::First(3)).unwrap();
        assert_eq!(keys(&params.view(&node)), ["e", "b", "d"]);

        let mut params = QueryParams::with_index(QueryIndex::Value);
        params.set_limit(QueryLimit::Last(2)).unwrap();
        assert_eq!(keys(&params.view(&node)), ["a", "c"]);
    }

    #[test]
    fn child_order_with_range() {
        let node = json!({
            "ada": { "age": 36 },
            "bob": { "age": 17 },
            "cy": { "age": 52 },
            "dee": {}
        });
        let mut params = QueryParams::with_index(QueryIndex::Child(vec!["age".into()]));
        params.set_start(json!(18)).unwrap();
        assert_eq!(keys(&params.view(&node)), ["ada", "cy"]);
    }

    #[test]
    fn equal_to_sets_both_bounds() {
        let node = json!({ "a": 1, "b": 2, "c": 2 });
        let mut params = QueryParams::with_index(QueryIndex::Value);
        params.set_start(json!(2)).unwrap();
        params.set_end(json!(2)).unwrap();
        assert_eq!(keys(&params.view(&node)), ["b", "c"]);
    }

    #[test]
    fn bounds_and_limits_cannot_be_set_twice() {
        let mut params = QueryParams::default();
        params.set_start(json!(1)).unwrap();
        assert!(params.set_start(json!(2)).is_err());
        params.set_limit(QueryLimit::First(1)).unwrap();
        assert!(params.set_limit(QueryLimit::Last(1)).is_err());
    }
}
