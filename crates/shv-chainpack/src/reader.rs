use std::collections::BTreeMap;

use shv_value::{Data, DateTime, Decimal, Meta, Value};

use crate::error::DecodeError;
use crate::varint::{read_uint_data, zigzag_decode};
use crate::writer::{
    SHV_EPOCH_MSEC, TAG_BLOB, TAG_CSTRING, TAG_DATETIME, TAG_DECIMAL, TAG_DOUBLE, TAG_FALSE,
    TAG_IMAP_BEGIN, TAG_INT, TAG_LIST_BEGIN, TAG_MAP_BEGIN, TAG_META_BEGIN, TAG_NULL, TAG_STRING,
    TAG_TERMINATOR, TAG_TRUE, TAG_UINT,
};

/// Containers nest at most this deep before decoding gives up. Guards
/// against a hostile or corrupt peer driving the recursive reader into a
/// stack overflow.
pub const MAX_NESTING_DEPTH: u32 = 512;

/// Reads `Value`s from a ChainPack byte slice.
///
/// Borrows its input rather than owning a cursor type, mirroring the
/// narrow, allocation-light boundary the teacher's transport layer reads
/// frames through.
pub struct ChainPackReader<'a> {
    input: &'a [u8],
    depth: u32,
}

impl<'a> ChainPackReader<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, depth: 0 }
    }

    /// Reads exactly one value, returning the unconsumed remainder.
    pub fn read_value(&mut self) -> Result<Value, DecodeError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.depth -= 1;
            return Err(DecodeError::NestingTooDeep);
        }
        let result = self.read_value_inner();
        self.depth -= 1;
        result
    }

    pub fn remaining(&self) -> &'a [u8] {
        self.input
    }

    fn peek(&self) -> Result<u8, DecodeError> {
        self.input.first().copied().ok_or(DecodeError::UnexpectedEof)
    }

    fn take_byte(&mut self) -> Result<u8, DecodeError> {
        let b = self.peek()?;
        self.input = &self.input[1..];
        Ok(b)
    }

    fn read_value_inner(&mut self) -> Result<Value, DecodeError> {
        let meta = if self.peek()? == TAG_META_BEGIN {
            self.take_byte()?;
            Some(self.read_meta()?)
        } else {
            None
        };
        let data = self.read_data()?;
        let mut value = Value::new(data);
        if let Some(meta) = meta {
            value.set_meta(meta);
        }
        Ok(value)
    }

    fn read_meta(&mut self) -> Result<Meta, DecodeError> {
        let mut meta = Meta::new();
        loop {
            if self.peek()? == TAG_TERMINATOR {
                self.take_byte()?;
                break;
            }
            let key = read_uint_data(&mut self.input)? as i64;
            let value = self.read_value()?;
            meta.set_int(key, value);
        }
        loop {
            if self.peek()? == TAG_TERMINATOR {
                self.take_byte()?;
                break;
            }
            let key = self.read_tagged_string()?;
            let value = self.read_value()?;
            meta.set_str(key, value);
        }
        Ok(meta)
    }

    fn read_data(&mut self) -> Result<Data, DecodeError> {
        let tag = self.take_byte()?;
        match tag {
            TAG_NULL => Ok(Data::Null),
            TAG_FALSE => Ok(Data::Bool(false)),
            TAG_TRUE => Ok(Data::Bool(true)),
            TAG_INT => {
                let z = read_uint_data(&mut self.input)?;
                Ok(Data::Int(zigzag_decode(z)))
            }
            TAG_UINT => Ok(Data::UInt(read_uint_data(&mut self.input)?)),
            TAG_DOUBLE => {
                if self.input.len() < 8 {
                    return Err(DecodeError::UnexpectedEof);
                }
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&self.input[..8]);
                self.input = &self.input[8..];
                Ok(Data::Double(f64::from_le_bytes(buf)))
            }
            TAG_DECIMAL => {
                let mantissa = zigzag_decode(read_uint_data(&mut self.input)?);
                let exponent = zigzag_decode(read_uint_data(&mut self.input)?);
                let exponent =
                    i8::try_from(exponent).map_err(|_| DecodeError::MalformedDateTime)?;
                Ok(Data::Decimal(Decimal::new(mantissa, exponent)))
            }
            TAG_BLOB => {
                let len = read_uint_data(&mut self.input)? as usize;
                if self.input.len() < len {
                    return Err(DecodeError::UnexpectedEof);
                }
                let (bytes, rest) = self.input.split_at(len);
                self.input = rest;
                Ok(Data::Bytes(bytes.to_vec()))
            }
            TAG_STRING => {
                let len = read_uint_data(&mut self.input)? as usize;
                if self.input.len() < len {
                    return Err(DecodeError::UnexpectedEof);
                }
                let (bytes, rest) = self.input.split_at(len);
                self.input = rest;
                let s = std::str::from_utf8(bytes)
                    .map_err(|_| DecodeError::InvalidUtf8)?
                    .to_string();
                Ok(Data::String(s))
            }
            TAG_CSTRING => {
                let end = self
                    .input
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(DecodeError::UnexpectedEof)?;
                let (bytes, rest) = self.input.split_at(end);
                self.input = &rest[1..];
                let s = std::str::from_utf8(bytes)
                    .map_err(|_| DecodeError::InvalidUtf8)?
                    .to_string();
                Ok(Data::String(s))
            }
            TAG_DATETIME => {
                let shv_msec = zigzag_decode(read_uint_data(&mut self.input)?);
                let utc_offset_min = zigzag_decode(read_uint_data(&mut self.input)?);
                let utc_offset_min = i16::try_from(utc_offset_min)
                    .map_err(|_| DecodeError::MalformedDateTime)?;
                let epoch_msec = shv_msec
                    .checked_add(SHV_EPOCH_MSEC)
                    .ok_or(DecodeError::MalformedDateTime)?;
                Ok(Data::DateTime(DateTime::new(epoch_msec, utc_offset_min)))
            }
            TAG_LIST_BEGIN => {
                let mut items = Vec::new();
                while self.peek()? != TAG_TERMINATOR {
                    items.push(self.read_value()?);
                }
                self.take_byte()?;
                Ok(Data::List(items))
            }
            TAG_MAP_BEGIN => {
                let mut map = BTreeMap::new();
                while self.peek()? != TAG_TERMINATOR {
                    let key = self.read_tagged_string()?;
                    let value = self.read_value()?;
                    map.insert(key, value);
                }
                self.take_byte()?;
                Ok(Data::Map(map))
            }
            TAG_IMAP_BEGIN => {
                let mut map = BTreeMap::new();
                while self.peek()? != TAG_TERMINATOR {
                    let key = read_uint_data(&mut self.input)? as i64;
                    let value = self.read_value()?;
                    map.insert(key, value);
                }
                self.take_byte()?;
                Ok(Data::IMap(map))
            }
            other => Err(DecodeError::InvalidControlByte(other)),
        }
    }

    fn read_tagged_string(&mut self) -> Result<String, DecodeError> {
        match self.read_data()? {
            Data::String(s) => Ok(s),
            _ => Err(DecodeError::InvalidControlByte(0)),
        }
    }
}

/// Decodes exactly one value from `input`, erroring if bytes remain.
pub fn decode(input: &[u8]) -> Result<Value, DecodeError> {
    let mut reader = ChainPackReader::new(input);
    let value = reader.read_value()?;
    if !reader.remaining().is_empty() {
        return Err(DecodeError::TrailingBytes);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::encode;
    use shv_value::DateTime as Dt;
    use std::collections::BTreeMap as Map;

    fn round_trip(v: Value) {
        let bytes = encode(&v).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, v, "round trip via {bytes:02x?}");
    }

    #[test]
    fn round_trips_scalars() {
        round_trip(Value::null());
        round_trip(Value::from(true));
        round_trip(Value::from(false));
        round_trip(Value::from(0i64));
        round_trip(Value::from(-1i64));
        round_trip(Value::from(i64::MIN));
        round_trip(Value::from(i64::MAX));
        round_trip(Value::from(u64::MAX));
        round_trip(Value::from(1.5f64));
        round_trip(Value::from("hello, \u{1F600}"));
        round_trip(Value::new(Data::Bytes(vec![0, 1, 2, 255])));
    }

    #[test]
    fn round_trips_decimal() {
        round_trip(Value::new(Data::Decimal(Decimal::new(-1234, -2))));
        round_trip(Value::new(Data::Decimal(Decimal::new(0, 0))));
    }

    #[test]
    fn round_trips_pre_epoch_datetime() {
        // 1969-12-31T23:59:00Z, well before the 2018-02-02 ChainPack
        // epoch — the known pre-epoch defect case from spec.md.
        let dt = Dt::new(-60_000, 0);
        round_trip(Value::new(Data::DateTime(dt)));
    }

    #[test]
    fn round_trips_list_and_maps() {
        let mut m = Map::new();
        m.insert("a".to_string(), Value::from(1i64));
        m.insert("b".to_string(), Value::null());
        round_trip(Value::new(Data::Map(m)));

        let mut im = Map::new();
        im.insert(1, Value::from(true));
        im.insert(-5, Value::from("x"));
        round_trip(Value::new(Data::IMap(im)));

        round_trip(Value::new(Data::List(vec![
            Value::from(1i64),
            Value::from("two"),
            Value::null(),
        ])));
    }

    #[test]
    fn round_trips_meta() {
        let mut v = Value::from(3i64);
        v.meta_mut().set_int(1, Value::from(2i64));
        v.meta_mut().set_str("tag", Value::from("x"));
        round_trip(v);
    }

    #[test]
    fn rejects_garbage_control_byte() {
        let err = decode(&[0x9f]).unwrap_err();
        assert_eq!(err, DecodeError::InvalidControlByte(0x9f));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = encode(&Value::from(1i64)).unwrap();
        bytes.push(0);
        assert_eq!(decode(&bytes).unwrap_err(), DecodeError::TrailingBytes);
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = encode(&Value::new(Data::List(vec![Value::from(1i64)]))).unwrap();
        let truncated = &bytes[..bytes.len() - 2];
        assert_eq!(decode(truncated).unwrap_err(), DecodeError::UnexpectedEof);
    }

    #[test]
    fn nesting_guard_trips_on_pathological_depth() {
        let mut v = Value::from(0i64);
        for _ in 0..(MAX_NESTING_DEPTH as usize + 1) {
            v = Value::new(Data::List(vec![v]));
        }
        let bytes = encode(&v).unwrap();
        assert_eq!(decode(&bytes).unwrap_err(), DecodeError::NestingTooDeep);
    }
}
