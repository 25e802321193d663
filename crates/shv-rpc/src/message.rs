use shv_value::{Data, Value};
use std::collections::BTreeMap;

use crate::error_code::ErrorCode;
use crate::keys;

/// What a decoded [`Value`] turns out to mean once its [`Meta`](shv_value::Meta)
/// is interpreted against the invariants in spec §3.
///
/// `Invalid` is never raised as an exception — spec §4.4 and §7 both say
/// invalid messages are dropped with a log event, and that logging
/// decision belongs to `shv-broker`, not here (this layer only classifies).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Request,
    Response,
    Signal,
    Invalid(InvalidReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    RequestMissingMethod,
    ResponseMissingRequestId,
    ResponseHasMethod,
    SignalMissingMethod,
    SignalHasRequestId,
    Unclassifiable,
}

/// A [`Value`] interpreted as an RPC request, response, or signal.
///
/// Thin wrapper: all state lives in the underlying `Value`'s `Meta`, so
/// constructing one never copies the body and round-trips losslessly
/// through either codec.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcMessage {
    value: Value,
}

impl RpcMessage {
    pub fn from_value(value: Value) -> Self {
        Self { value }
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    fn meta_int(&self, key: i64) -> Option<i64> {
        match self.value.meta()?.get_int(key)?.data() {
            Data::Int(v) => Some(*v),
            Data::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    fn meta_str(&self, key: i64) -> Option<&str> {
        match self.value.meta()?.get_int(key)?.data() {
            Data::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn request_id(&self) -> Option<i64> {
        self.meta_int(keys::REQUEST_ID)
    }

    pub fn shv_path(&self) -> &str {
        self.meta_str(keys::SHV_PATH).unwrap_or("")
    }

    pub fn method(&self) -> Option<&str> {
        self.meta_str(keys::METHOD)
    }

    pub fn signal_name(&self) -> Option<&str> {
        self.meta_str(keys::SIGNAL_NAME)
            .or(Some(keys::DEFAULT_SIGNAL_NAME))
    }

    pub fn caller_ids(&self) -> Vec<u64> {
        let Some(Data::List(items)) = self
            .value
            .meta()
            .and_then(|m| m.get_int(keys::CALLER_IDS))
            .map(|v| v.data())
        else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|v| match v.data() {
                Data::UInt(u) => Some(*u),
                Data::Int(i) => u64::try_from(*i).ok(),
                _ => None,
            })
            .collect()
    }

    pub fn access_grant(&self) -> Option<i64> {
        self.meta_int(keys::ACCESS_GRANT)
            .or_else(|| self.meta_int(keys::ACCESS_LEVEL_LEGACY))
    }

    pub fn user_id(&self) -> Option<&str> {
        self.meta_str(keys::USER_ID)
    }

    pub fn params(&self) -> &Value {
        &self.value
    }

    /// Whether the body is an error-response IMap (`{code, message}`).
    pub fn error(&self) -> Option<(ErrorCode, String)> {
        let Data::IMap(map) = self.value.data() else {
            return None;
        };
        let code = match map.get(&keys::ERROR_CODE)?.data() {
            Data::Int(v) => *v,
            Data::UInt(v) => i64::try_from(*v).ok()?,
            _ => return None,
        };
        let message = match map.get(&keys::ERROR_MESSAGE) {
            Some(v) => match v.data() {
                Data::String(s) => s.clone(),
                _ => String::new(),
            },
            None => String::new(),
        };
        Some((ErrorCode::from_code(code), message))
    }

    /// Classifies this message per the invariants in spec §3:
    /// request ⇒ (request_id, method) present; response ⇒ request_id
    /// present, method absent, exactly one of result/error; signal ⇒
    /// method present, request_id absent.
    pub fn kind(&self) -> Kind {
        let has_request_id = self.request_id().is_some();
        let has_method = self.method().is_some();

        if self.value.meta().is_none() {
            return Kind::Invalid(InvalidReason::Unclassifiable);
        }

        match (has_request_id, has_method) {
            (true, true) => Kind::Request,
            // request_id present, method absent is sufficient to call this
            // a response (spec §3) — a legitimately `IMap`-shaped result
            // (one that just happens to lack an error `code` key) must not
            // be mistaken for a malformed error body.
            (true, false) => Kind::Response,
            (false, true) => Kind::Signal,
            (false, false) => Kind::Invalid(InvalidReason::Unclassifiable),
        }
    }

    pub fn new_request(path: &str, method: &str, request_id: i64, params: Value) -> Self {
        let mut msg = Self { value: params };
        let meta = msg.value.meta_mut();
        meta.set_int(keys::META_KEY_TYPE, Value::from(keys::CHAIN_PACK_MAJOR_VERSION));
        meta.set_int(keys::REQUEST_ID, Value::from(request_id));
        meta.set_int(keys::SHV_PATH, Value::from(path));
        meta.set_int(keys::METHOD, Value::from(method));
        msg
    }

    pub fn new_response(request_id: i64, caller_ids: &[u64], result: Value) -> Self {
        let mut msg = Self { value: result };
        let meta = msg.value.meta_mut();
        meta.set_int(keys::META_KEY_TYPE, Value::from(keys::CHAIN_PACK_MAJOR_VERSION));
        meta.set_int(keys::REQUEST_ID, Value::from(request_id));
        if !caller_ids.is_empty() {
            meta.set_int(
                keys::CALLER_IDS,
                Value::new(Data::List(caller_ids.iter().map(|id| Value::from(*id)).collect())),
            );
        }
        msg
    }

    pub fn new_error_response(
        request_id: i64,
        caller_ids: &[u64],
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        let mut body = BTreeMap::new();
        body.insert(keys::ERROR_CODE, Value::from(code.code()));
        body.insert(keys::ERROR_MESSAGE, Value::from(message.into()));
        Self::new_response(request_id, caller_ids, Value::new(Data::IMap(body)))
    }

    pub fn new_signal(path: &str, method: &str, signal_name: &str, param: Value) -> Self {
        let mut msg = Self { value: param };
        let meta = msg.value.meta_mut();
        meta.set_int(keys::META_KEY_TYPE, Value::from(keys::CHAIN_PACK_MAJOR_VERSION));
        meta.set_int(keys::SHV_PATH, Value::from(path));
        meta.set_int(keys::METHOD, Value::from(method));
        if signal_name != keys::DEFAULT_SIGNAL_NAME {
            meta.set_int(keys::SIGNAL_NAME, Value::from(signal_name));
        }
        msg
    }

    pub fn set_caller_ids(&mut self, caller_ids: &[u64]) {
        let meta = self.value.meta_mut();
        if caller_ids.is_empty() {
            meta.remove_int(keys::CALLER_IDS);
        } else {
            meta.set_int(
                keys::CALLER_IDS,
                Value::new(Data::List(caller_ids.iter().map(|id| Value::from(*id)).collect())),
            );
        }
    }

    pub fn set_shv_path(&mut self, path: &str) {
        self.value.meta_mut().set_int(keys::SHV_PATH, Value::from(path));
    }

    pub fn set_request_id(&mut self, request_id: i64) {
        self.value
            .meta_mut()
            .set_int(keys::REQUEST_ID, Value::from(request_id));
    }

    pub fn set_access_grant(&mut self, level: i64) {
        self.value
            .meta_mut()
            .set_int(keys::ACCESS_GRANT, Value::from(level));
    }
}
