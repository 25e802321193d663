use shv_value::{Data, Decimal, Meta, Value};

use crate::error::EncodeError;
use crate::varint::{write_uint_data, zigzag_encode};

/// No byte in the spec's partial control-byte table is assigned to Null;
/// this reserves the otherwise-unused `0x8e` slot for it.
pub const TAG_NULL: u8 = 0x8e;
pub const TAG_FALSE: u8 = 0x80;
pub const TAG_TRUE: u8 = 0x81;
pub const TAG_INT: u8 = 0x82;
pub const TAG_UINT: u8 = 0x83;
pub const TAG_DOUBLE: u8 = 0x84;
pub const TAG_DECIMAL: u8 = 0x85;
pub const TAG_BLOB: u8 = 0x86;
pub const TAG_STRING: u8 = 0x87;
pub const TAG_LIST_BEGIN: u8 = 0x88;
pub const TAG_MAP_BEGIN: u8 = 0x89;
pub const TAG_IMAP_BEGIN: u8 = 0x8a;
pub const TAG_META_BEGIN: u8 = 0x8b;
pub const TAG_CSTRING: u8 = 0x8c;
/// Repurposed from the legacy "Bool-False" alias, which this writer never
/// emits and this reader never needs to accept: `0x8b` is already spoken
/// for as the meta marker, so DateTime moves here instead of colliding
/// with it (see `crates/shv-chainpack` note in DESIGN.md).
pub const TAG_DATETIME: u8 = 0x8d;
pub const TAG_TERMINATOR: u8 = 0xff;

/// Milliseconds between the Unix epoch and 2018-02-02T00:00:00Z, ChainPack's
/// own DateTime epoch.
pub const SHV_EPOCH_MSEC: i64 = 1_517_529_600_000;

/// Writes `Value`s as ChainPack onto an in-memory buffer.
///
/// A `Vec<u8>` sink keeps this symmetric with [`crate::reader::ChainPackReader`]
/// without forcing every caller through `std::io::Write`; callers streaming
/// to a socket drain the buffer between messages (see `shv-transport`'s
/// block framing, which calls this once per outbound message).
#[derive(Debug, Default)]
pub struct ChainPackWriter {
    out: Vec<u8>,
}

impl ChainPackWriter {
    pub fn new() -> Self {
        Self { out: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    pub fn bytes(&self) -> &[u8] {
        &self.out
    }

    pub fn write_value(&mut self, value: &Value) -> Result<(), EncodeError> {
        if let Some(meta) = value.meta() {
            self.write_meta(meta)?;
        }
        self.write_data_inner(value.data())
    }

    fn write_meta(&mut self, meta: &Meta) -> Result<(), EncodeError> {
        self.out.push(TAG_META_BEGIN);
        for (key, value) in meta.int_keys() {
            let key = u64::try_from(key).map_err(|_| EncodeError::IllFormedDecimal)?;
            write_uint_data(&mut self.out, key);
            self.write_value(value)?;
        }
        self.out.push(TAG_TERMINATOR);
        for (key, value) in meta.str_keys() {
            self.write_string_bytes(key.as_bytes());
            self.write_value(value)?;
        }
        self.out.push(TAG_TERMINATOR);
        Ok(())
    }

    fn write_data_inner(&mut self, data: &Data) -> Result<(), EncodeError> {
        match data {
            Data::Null => self.out.push(TAG_NULL),
            Data::Bool(false) => self.out.push(TAG_FALSE),
            Data::Bool(true) => self.out.push(TAG_TRUE),
            Data::Int(v) => {
                self.out.push(TAG_INT);
                write_uint_data(&mut self.out, zigzag_encode(*v));
            }
            Data::UInt(v) => {
                self.out.push(TAG_UINT);
                write_uint_data(&mut self.out, *v);
            }
            Data::Double(v) => {
                self.out.push(TAG_DOUBLE);
                self.out.extend_from_slice(&v.to_le_bytes());
            }
            Data::Decimal(d) => self.write_decimal(*d),
            Data::Bytes(b) => {
                self.out.push(TAG_BLOB);
                write_uint_data(&mut self.out, b.len() as u64);
                self.out.extend_from_slice(b);
            }
            Data::String(s) => self.write_string_bytes(s.as_bytes()),
            Data::DateTime(dt) => self.write_datetime(dt)?,
            Data::List(items) => {
                self.out.push(TAG_LIST_BEGIN);
                for item in items {
                    self.write_value(item)?;
                }
                self.out.push(TAG_TERMINATOR);
            }
            Data::Map(map) => {
                self.out.push(TAG_MAP_BEGIN);
                for (key, value) in map {
                    self.write_string_bytes(key.as_bytes());
                    self.write_value(value)?;
                }
                self.out.push(TAG_TERMINATOR);
            }
            Data::IMap(map) => {
                self.out.push(TAG_IMAP_BEGIN);
                for (key, value) in map {
                    let key = u64::try_from(*key).map_err(|_| EncodeError::IllFormedDecimal)?;
                    write_uint_data(&mut self.out, key);
                    self.write_value(value)?;
                }
                self.out.push(TAG_TERMINATOR);
            }
        }
        Ok(())
    }

    fn write_decimal(&mut self, d: Decimal) {
        self.out.push(TAG_DECIMAL);
        write_uint_data(&mut self.out, zigzag_encode(d.mantissa));
        write_uint_data(&mut self.out, zigzag_encode(d.exponent as i64));
    }

    fn write_datetime(&mut self, dt: &shv_value::DateTime) -> Result<(), EncodeError> {
        self.out.push(TAG_DATETIME);
        let shv_msec = dt
            .epoch_msec
            .checked_sub(SHV_EPOCH_MSEC)
            .ok_or(EncodeError::MalformedDateTime)?;
        write_uint_data(&mut self.out, zigzag_encode(shv_msec));
        write_uint_data(&mut self.out, zigzag_encode(dt.utc_offset_min as i64));
        Ok(())
    }

    fn write_string_bytes(&mut self, bytes: &[u8]) {
        self.out.push(TAG_STRING);
        write_uint_data(&mut self.out, bytes.len() as u64);
        self.out.extend_from_slice(bytes);
    }
}

pub fn encode(value: &Value) -> Result<Vec<u8>, EncodeError> {
    let mut w = ChainPackWriter::new();
    w.write_value(value)?;
    Ok(w.into_bytes())
}
