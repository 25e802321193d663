use shv_value::{Data, Decimal, Meta, Value};

use crate::error::EncodeError;
use crate::{datetime, hexfloat};

/// Writes `Value`s as CPON text onto an in-memory buffer.
///
/// Canonical per spec §4.2.2: doubles always in hex-mantissa scientific
/// form, Map keys in their `BTreeMap` (lexicographic) order — round-trip
/// equality doesn't care about Map key order, so this is just "pick one".
#[derive(Debug, Default)]
pub struct CponWriter {
    out: String,
}

impl CponWriter {
    pub fn new() -> Self {
        Self { out: String::new() }
    }

    pub fn into_string(self) -> String {
        self.out
    }

    pub fn as_str(&self) -> &str {
        &self.out
    }

    pub fn write_value(&mut self, value: &Value) -> Result<(), EncodeError> {
        if let Some(meta) = value.meta() {
            self.write_meta(meta)?;
        }
        self.write_data(value.data())
    }

    fn write_meta(&mut self, meta: &Meta) -> Result<(), EncodeError> {
        self.out.push('<');
        let mut first = true;
        for (key, value) in meta.int_keys() {
            if !first {
                self.out.push(',');
            }
            first = false;
            self.out.push_str(&key.to_string());
            self.out.push(':');
            self.write_value(value)?;
        }
        for (key, value) in meta.str_keys() {
            if !first {
                self.out.push(',');
            }
            first = false;
            self.write_string(key);
            self.out.push(':');
            self.write_value(value)?;
        }
        self.out.push('>');
        Ok(())
    }

    fn write_data(&mut self, data: &Data) -> Result<(), EncodeError> {
        match data {
            Data::Null => self.out.push_str("null"),
            Data::Bool(true) => self.out.push_str("true"),
            Data::Bool(false) => self.out.push_str("false"),
            Data::Int(v) => self.out.push_str(&v.to_string()),
            Data::UInt(v) => {
                self.out.push_str(&v.to_string());
                self.out.push('u');
            }
            Data::Double(v) => self.out.push_str(&hexfloat::format(*v)),
            Data::Decimal(d) => self.write_decimal(*d)?,
            Data::Bytes(b) => self.write_blob(b),
            Data::String(s) => self.write_string(s),
            Data::DateTime(dt) => {
                self.out.push_str("d\"");
                self.out
                    .push_str(&datetime::format(dt).map_err(|_| EncodeError::MalformedDateTime)?);
                self.out.push('"');
            }
            Data::List(items) => {
                self.out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.out.push(',');
                    }
                    self.write_value(item)?;
                }
                self.out.push(']');
            }
            Data::Map(map) => {
                self.out.push('{');
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        self.out.push(',');
                    }
                    self.write_string(key);
                    self.out.push(':');
                    self.write_value(value)?;
                }
                self.out.push('}');
            }
            Data::IMap(map) => {
                self.out.push_str("i{");
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        self.out.push(',');
                    }
                    self.out.push_str(&key.to_string());
                    self.out.push(':');
                    self.write_value(value)?;
                }
                self.out.push('}');
            }
        }
        Ok(())
    }

    fn write_decimal(&mut self, d: Decimal) -> Result<(), EncodeError> {
        self.out.push_str(&format_decimal(d.mantissa, d.exponent));
        Ok(())
    }

    fn write_string(&mut self, s: &str) {
        self.out.push('"');
        for c in s.chars() {
            match c {
                '"' => self.out.push_str("\\\""),
                '\\' => self.out.push_str("\\\\"),
                '\n' => self.out.push_str("\\n"),
                '\r' => self.out.push_str("\\r"),
                '\t' => self.out.push_str("\\t"),
                c if (c as u32) < 0x20 => self.out.push_str(&format!("\\x{:02x}", c as u32)),
                c => self.out.push(c),
            }
        }
        self.out.push('"');
    }

    fn write_blob(&mut self, bytes: &[u8]) {
        self.out.push_str("b\"");
        for &b in bytes {
            match b {
                b'"' => self.out.push_str("\\\""),
                b'\\' => self.out.push_str("\\\\"),
                0x20..=0x7e => self.out.push(b as char),
                _ => self.out.push_str(&format!("\\x{b:02x}")),
            }
        }
        self.out.push('"');
    }
}

/// `mantissa * 10^exponent` rendered with an explicit `n` type marker, e.g.
/// `1.23n` for mantissa=123 exponent=-2, `12e3n` for mantissa=12 exponent=3.
fn format_decimal(mantissa: i64, exponent: i8) -> String {
    if exponent == 0 {
        format!("{mantissa}n")
    } else if exponent > 0 {
        format!("{mantissa}e{exponent}n")
    } else {
        let neg = mantissa < 0;
        let digits = mantissa.unsigned_abs().to_string();
        let frac_len = (-exponent) as usize;
        let padded = if digits.len() <= frac_len {
            format!("{:0>width$}", digits, width = frac_len + 1)
        } else {
            digits
        };
        let split = padded.len() - frac_len;
        let (int_part, frac_part) = padded.split_at(split);
        format!("{}{int_part}.{frac_part}n", if neg { "-" } else { "" })
    }
}

pub fn encode(value: &Value) -> Result<String, EncodeError> {
    let mut w = CponWriter::new();
    w.write_value(value)?;
    Ok(w.into_string())
}
