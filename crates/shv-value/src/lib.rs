//! The dynamic value model shared by the ChainPack and CPON codecs.
//!
//! Every wire value in Silicon Heaven RPC — request parameters, a getter's
//! result, a signal payload, even the RPC envelope's own meta-attributes —
//! is a [`Value`]. The codecs in `shv-chainpack` and `shv-cpon` are pure
//! transformations between bytes and `Value`; the RPC layer in `shv-rpc`
//! interprets a `Value`'s [`Meta`] as request/response/signal framing.
//!
//! `Value` is an acyclic tree (no `Rc`/`Weak` cycles are possible by
//! construction), so ownership throughout this crate is plain `Clone`.

mod meta;

pub use meta::Meta;

use std::collections::BTreeMap;

/// A dynamically typed Silicon Heaven RPC value.
///
/// Two values are equal iff their variant, payload, and [`Meta`] are all
/// structurally equal — there are no implicit numeric coercions (a
/// `Decimal` is never equal to a `Double`, `Int` is never equal to `UInt`).
#[derive(Debug, Clone, Default)]
pub struct Value {
    meta: Option<Box<Meta>>,
    data: Data,
}

/// The payload carried by a [`Value`], without its meta-attributes.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Data {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    Decimal(Decimal),
    Bytes(Vec<u8>),
    String(String),
    DateTime(DateTime),
    List(Vec<Value>),
    /// Ordering-irrelevant string-keyed map. `BTreeMap` gives us
    /// order-irrelevant equality for free.
    Map(BTreeMap<String, Value>),
    /// Mapping from a non-negative integer key to a `Value`. An empty
    /// dictionary literal with no other type information decodes as
    /// `IMap` (CPON's `{}` vs `i{}` ambiguity, resolved in favor of IMap).
    IMap(BTreeMap<i64, Value>),
}

/// Arbitrary-precision-flavored decimal: `mantissa * 10^exponent`.
///
/// Real-world ChainPack producers never need more than an `i64` mantissa
/// and an `i8` exponent, so that's what this repo carries rather than a
/// bignum type — but the two are kept in their own fields (never folded
/// into `Double`) so `Decimal` vs `Double` equality stays meaningfully
/// distinct, per spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decimal {
    pub mantissa: i64,
    pub exponent: i8,
}

impl Decimal {
    pub fn new(mantissa: i64, exponent: i8) -> Self {
        Self { mantissa, exponent }
    }

    /// Best-effort conversion to `f64`, for display/debugging only — never
    /// used by the codecs themselves, which round-trip the
    /// mantissa/exponent pair bit-exactly.
    pub fn to_f64_lossy(self) -> f64 {
        self.mantissa as f64 * 10f64.powi(self.exponent as i32)
    }
}

/// Absolute instant with a UTC offset and millisecond precision.
///
/// `epoch_msec` is milliseconds since the Unix epoch (1970-01-01T00:00:00Z),
/// independent of how ChainPack happens to encode it on the wire (§4.2.1's
/// 2018-02-02 epoch offset is purely a wire-encoding detail, resolved by
/// the codec before it ever becomes a `DateTime`). `utc_offset_min` is the
/// offset of the *recorded* local time from UTC, in minutes, and does not
/// change `epoch_msec` — it's carried for round-tripping and display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTime {
    pub epoch_msec: i64,
    pub utc_offset_min: i16,
}

impl DateTime {
    pub fn new(epoch_msec: i64, utc_offset_min: i16) -> Self {
        Self {
            epoch_msec,
            utc_offset_min,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data && self.meta_view() == other.meta_view()
    }
}

impl Value {
    pub fn new(data: Data) -> Self {
        Self { meta: None, data }
    }

    pub fn null() -> Self {
        Self::new(Data::Null)
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn into_data(self) -> Data {
        self.data
    }

    pub fn is_null(&self) -> bool {
        matches!(self.data, Data::Null)
    }

    /// An empty `Meta` is indistinguishable from an absent one: both read
    /// back as `None` here.
    pub fn meta(&self) -> Option<&Meta> {
        self.meta
            .as_deref()
            .filter(|m| !m.is_empty())
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        if self.meta.is_none() {
            self.meta = Some(Box::new(Meta::new()));
        }
        self.meta.as_mut().unwrap()
    }

    pub fn set_meta(&mut self, meta: Meta) {
        self.meta = if meta.is_empty() {
            None
        } else {
            Some(Box::new(meta))
        };
    }

    pub fn take_meta(&mut self) -> Option<Meta> {
        self.meta.take().map(|b| *b).filter(|m| !m.is_empty())
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.set_meta(meta);
        self
    }

    fn meta_view(&self) -> Option<&Meta> {
        self.meta()
    }
}

macro_rules! from_variant {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::new(Data::$variant(v.into()))
            }
        }
    };
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::null()
    }
}
from_variant!(bool, Bool);
from_variant!(i64, Int);
from_variant!(u64, UInt);
from_variant!(f64, Double);
from_variant!(Decimal, Decimal);
from_variant!(Vec<u8>, Bytes);
from_variant!(String, String);
from_variant!(DateTime, DateTime);
from_variant!(Vec<Value>, List);
from_variant!(BTreeMap<String, Value>, Map);
from_variant!(BTreeMap<i64, Value>, IMap);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::new(Data::String(v.to_string()))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::new(Data::Int(v as i64))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::new(Data::UInt(v as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_meta_is_absent() {
        let mut v = Value::from(1i64);
        assert!(v.meta().is_none());
        let _ = v.meta_mut();
        assert!(v.meta().is_none(), "touching meta_mut without inserting keys shouldn't make it present");
    }

    #[test]
    fn meta_round_trip_via_mutation() {
        let mut v = Value::from(1i64);
        v.meta_mut().set_int(1, Value::from(2i64));
        assert!(v.meta().is_some());
        assert_eq!(v.meta().unwrap().get_int(1), Some(&Value::from(2i64)));
    }

    #[test]
    fn equality_ignores_decimal_double_coercion() {
        let d = Value::from(Decimal::new(150, -1));
        let f = Value::from(15.0f64);
        assert_ne!(d, f);
    }

    #[test]
    fn map_equality_is_order_irrelevant() {
        let mut a = BTreeMap::new();
        a.insert("x".to_string(), Value::from(1i64));
        a.insert("y".to_string(), Value::from(2i64));
        let mut b = BTreeMap::new();
        b.insert("y".to_string(), Value::from(2i64));
        b.insert("x".to_string(), Value::from(1i64));
        assert_eq!(Value::from(a), Value::from(b));
    }
}
