use std::collections::BTreeMap;

use crate::Value;

/// A `Value`'s optional meta-attribute side-car: an integer-keyed map plus
/// a string-keyed map. The RPC layer (`shv-rpc`) stores the envelope
/// fields from spec §3 (request id, path, method, ...) in the integer
/// map; the string map is free-form extension space.
///
/// An empty `Meta` and an absent `Meta` are indistinguishable at the
/// `Value` API surface (see `Value::meta`) — this type only exists once
/// at least one key has been set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta {
    int_keys: BTreeMap<i64, Value>,
    str_keys: BTreeMap<String, Value>,
}

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.int_keys.is_empty() && self.str_keys.is_empty()
    }

    pub fn get_int(&self, key: i64) -> Option<&Value> {
        self.int_keys.get(&key)
    }

    pub fn set_int(&mut self, key: i64, value: Value) -> Option<Value> {
        self.int_keys.insert(key, value)
    }

    pub fn remove_int(&mut self, key: i64) -> Option<Value> {
        self.int_keys.remove(&key)
    }

    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.str_keys.get(key)
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.str_keys.insert(key.into(), value)
    }

    pub fn remove_str(&mut self, key: &str) -> Option<Value> {
        self.str_keys.remove(key)
    }

    pub fn int_keys(&self) -> impl Iterator<Item = (i64, &Value)> {
        self.int_keys.iter().map(|(k, v)| (*k, v))
    }

    pub fn str_keys(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.str_keys.iter().map(|(k, v)| (k.as_str(), v))
    }
}
