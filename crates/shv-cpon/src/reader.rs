use std::collections::BTreeMap;

use shv_value::{Data, Meta, Value};

use crate::error::DecodeError;
use crate::{datetime, hexfloat};

/// Containers (and meta-wrapped values) nest at most this deep, matching
/// `shv_chainpack::MAX_NESTING_DEPTH` so neither codec is the weak link in
/// the framing layer's "recover at message boundaries" contract.
pub const MAX_NESTING_DEPTH: u32 = 512;

/// Reads `Value`s from CPON text.
pub struct CponReader<'a> {
    input: &'a [u8],
    pos: usize,
    depth: u32,
}

impl<'a> CponReader<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            depth: 0,
        }
    }

    pub fn read_value(&mut self) -> Result<Value, DecodeError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.depth -= 1;
            return Err(DecodeError::NestingTooDeep { pos: self.pos });
        }
        let result = self.read_value_inner();
        self.depth -= 1;
        result
    }

    pub fn remaining_pos(&self) -> usize {
        self.pos
    }

    fn read_value_inner(&mut self) -> Result<Value, DecodeError> {
        self.skip_ws();
        let meta = if self.peek() == Some(b'<') {
            Some(self.read_meta()?)
        } else {
            None
        };
        self.skip_ws();
        let data = self.read_data()?;
        let mut value = Value::new(data);
        if let Some(meta) = meta {
            value.set_meta(meta);
        }
        Ok(value)
    }

    fn read_meta(&mut self) -> Result<Meta, DecodeError> {
        self.expect(b'<')?;
        let mut meta = Meta::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(b'>') {
                self.bump();
                break;
            }
            self.skip_ws();
            if self.peek() == Some(b'"') {
                let key = self.read_quoted_string()?;
                self.skip_ws();
                self.expect(b':')?;
                let value = self.read_value()?;
                meta.set_str(key, value);
            } else {
                let key = self.read_int_literal()?;
                self.skip_ws();
                self.expect(b':')?;
                let value = self.read_value()?;
                meta.set_int(key, value);
            }
            self.skip_ws();
            if self.peek() == Some(b',') {
                self.bump();
            }
        }
        Ok(meta)
    }

    fn read_data(&mut self) -> Result<Data, DecodeError> {
        match self.peek().ok_or(DecodeError::UnexpectedEof)? {
            b'n' if self.starts_with("null") => {
                self.pos += 4;
                Ok(Data::Null)
            }
            b'n' if self.starts_with("nan") => {
                self.pos += 3;
                Ok(Data::Double(f64::NAN))
            }
            b't' if self.starts_with("true") => {
                self.pos += 4;
                Ok(Data::Bool(true))
            }
            b'f' if self.starts_with("false") => {
                self.pos += 5;
                Ok(Data::Bool(false))
            }
            b'i' if self.peek_at(1) == Some(b'{') => {
                self.pos += 2;
                self.read_imap_body()
            }
            b'i' if self.starts_with("inf") => {
                self.pos += 3;
                Ok(Data::Double(f64::INFINITY))
            }
            b'"' => Ok(Data::String(self.read_quoted_string()?)),
            b'b' if self.peek_at(1) == Some(b'"') => {
                self.pos += 1;
                Ok(Data::Bytes(self.read_blob_body()?))
            }
            b'd' if self.peek_at(1) == Some(b'"') => {
                self.pos += 2;
                let start = self.pos;
                let end = self.find_closing_quote(start)?;
                let body = std::str::from_utf8(&self.input[start..end])
                    .map_err(|_| DecodeError::InvalidUtf8 { pos: start })?;
                let dt = datetime::parse(body, start)?;
                self.pos = end + 1;
                Ok(Data::DateTime(dt))
            }
            b'[' => {
                self.bump();
                self.read_list_body()
            }
            b'{' => {
                self.bump();
                self.read_map_body()
            }
            b'-' if self.starts_with("-inf") => {
                self.pos += 4;
                Ok(Data::Double(f64::NEG_INFINITY))
            }
            b'-' | b'0'..=b'9' => self.read_number(),
            found => Err(DecodeError::UnexpectedChar {
                pos: self.pos,
                found: found as char,
            }),
        }
    }

    fn read_list_body(&mut self) -> Result<Data, DecodeError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(b']') {
                self.bump();
                break;
            }
            items.push(self.read_value()?);
            self.skip_ws();
            if self.peek() == Some(b',') {
                self.bump();
            }
        }
        Ok(Data::List(items))
    }

    fn read_map_body(&mut self) -> Result<Data, DecodeError> {
        let mut map = BTreeMap::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.bump();
            // An empty dictionary literal carries no type information, so
            // it's read as an (empty) IMap (spec §3).
            return Ok(Data::IMap(BTreeMap::new()));
        }
        loop {
            self.skip_ws();
            if self.peek() == Some(b'}') {
                self.bump();
                break;
            }
            let key = self.read_quoted_string()?;
            self.skip_ws();
            self.expect(b':')?;
            let value = self.read_value()?;
            map.insert(key, value);
            self.skip_ws();
            if self.peek() == Some(b',') {
                self.bump();
            }
        }
        Ok(Data::Map(map))
    }

    fn read_imap_body(&mut self) -> Result<Data, DecodeError> {
        let mut map = BTreeMap::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(b'}') {
                self.bump();
                break;
            }
            let key = self.read_int_literal()?;
            self.skip_ws();
            self.expect(b':')?;
            let value = self.read_value()?;
            map.insert(key, value);
            self.skip_ws();
            if self.peek() == Some(b',') {
                self.bump();
            }
        }
        Ok(Data::IMap(map))
    }

    fn read_int_literal(&mut self) -> Result<i64, DecodeError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.bump();
        }
        let digits_start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.bump();
        }
        if self.pos == digits_start {
            return Err(DecodeError::InvalidNumber { pos: start });
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(DecodeError::InvalidNumber { pos: start })
    }

    fn read_number(&mut self) -> Result<Data, DecodeError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.bump();
        }
        if self.starts_with("0x") || self.starts_with("0X") {
            self.pos += 2;
            self.consume_hex_digits();
            if self.peek() == Some(b'.') {
                self.bump();
                self.consume_hex_digits();
            }
            if matches!(self.peek(), Some(b'p' | b'P')) {
                self.bump();
                if matches!(self.peek(), Some(b'+' | b'-')) {
                    self.bump();
                }
                self.consume_digits();
            }
            let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap();
            let v = hexfloat::parse(text).ok_or(DecodeError::InvalidNumber { pos: start })?;
            return Ok(Data::Double(v));
        }

        self.consume_digits();
        let mut has_dot = false;
        let mut has_exp = false;
        if self.peek() == Some(b'.') {
            has_dot = true;
            self.bump();
            self.consume_digits();
        }
        if matches!(self.peek(), Some(b'e' | b'E' | b'p' | b'P')) {
            has_exp = true;
            self.bump();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.bump();
            }
            self.consume_digits();
        }

        if self.peek() == Some(b'u') {
            if has_dot || has_exp {
                return Err(DecodeError::InvalidNumber { pos: start });
            }
            let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap();
            let v: u64 = text.parse().map_err(|_| DecodeError::InvalidNumber { pos: start })?;
            self.bump();
            return Ok(Data::UInt(v));
        }
        if self.peek() == Some(b'n') {
            let (mantissa, exponent) = parse_decimal_body(&self.input[start..self.pos], start)?;
            self.bump();
            return Ok(Data::Decimal(shv_value::Decimal::new(mantissa, exponent)));
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap();
        if has_dot || has_exp {
            let v: f64 = text.parse().map_err(|_| DecodeError::InvalidNumber { pos: start })?;
            Ok(Data::Double(v))
        } else {
            let v: i64 = text.parse().map_err(|_| DecodeError::InvalidNumber { pos: start })?;
            Ok(Data::Int(v))
        }
    }

    fn read_quoted_string(&mut self) -> Result<String, DecodeError> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            match self.peek().ok_or(DecodeError::UnexpectedEof)? {
                b'"' => {
                    self.bump();
                    break;
                }
                b'\\' => {
                    let pos = self.pos;
                    self.bump();
                    self.push_escape(&mut out, pos)?;
                }
                b => {
                    out.push(b);
                    self.bump();
                }
            }
        }
        String::from_utf8(out).map_err(|_| DecodeError::InvalidUtf8 { pos: self.pos })
    }

    fn read_blob_body(&mut self) -> Result<Vec<u8>, DecodeError> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            match self.peek().ok_or(DecodeError::UnexpectedEof)? {
                b'"' => {
                    self.bump();
                    break;
                }
                b'\\' => {
                    let pos = self.pos;
                    self.bump();
                    self.push_escape(&mut out, pos)?;
                }
                b => {
                    out.push(b);
                    self.bump();
                }
            }
        }
        Ok(out)
    }

    fn push_escape(&mut self, out: &mut Vec<u8>, pos: usize) -> Result<(), DecodeError> {
        let c = self.peek().ok_or(DecodeError::UnexpectedEof)?;
        match c {
            b'"' | b'\\' | b'/' => {
                out.push(c);
                self.bump();
            }
            b'n' => {
                out.push(b'\n');
                self.bump();
            }
            b't' => {
                out.push(b'\t');
                self.bump();
            }
            b'r' => {
                out.push(b'\r');
                self.bump();
            }
            b'0' => {
                out.push(0);
                self.bump();
            }
            b'x' => {
                self.bump();
                let hex = self.take_n(2).ok_or(DecodeError::InvalidEscape { pos })?;
                let v = u8::from_str_radix(
                    std::str::from_utf8(hex).map_err(|_| DecodeError::InvalidEscape { pos })?,
                    16,
                )
                .map_err(|_| DecodeError::InvalidEscape { pos })?;
                out.push(v);
            }
            b'u' => {
                self.bump();
                let hex = self.take_n(4).ok_or(DecodeError::InvalidEscape { pos })?;
                let v = u32::from_str_radix(
                    std::str::from_utf8(hex).map_err(|_| DecodeError::InvalidEscape { pos })?,
                    16,
                )
                .map_err(|_| DecodeError::InvalidEscape { pos })?;
                let ch = char::from_u32(v).ok_or(DecodeError::InvalidEscape { pos })?;
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            _ => return Err(DecodeError::InvalidEscape { pos }),
        }
        Ok(())
    }

    fn find_closing_quote(&self, from: usize) -> Result<usize, DecodeError> {
        let mut i = from;
        while i < self.input.len() {
            if self.input[i] == b'"' {
                return Ok(i);
            }
            i += 1;
        }
        Err(DecodeError::UnexpectedEof)
    }

    fn take_n(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.pos + n > self.input.len() {
            return None;
        }
        let out = &self.input[self.pos..self.pos + n];
        self.pos += n;
        Some(out)
    }

    fn consume_digits(&mut self) {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.bump();
        }
    }

    fn consume_hex_digits(&mut self) {
        while matches!(self.peek(), Some(b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F')) {
            self.bump();
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.bump();
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s.as_bytes())
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn expect(&mut self, b: u8) -> Result<(), DecodeError> {
        match self.peek() {
            Some(found) if found == b => {
                self.bump();
                Ok(())
            }
            Some(found) => Err(DecodeError::UnexpectedChar {
                pos: self.pos,
                found: found as char,
            }),
            None => Err(DecodeError::UnexpectedEof),
        }
    }
}

/// Parses `mantissa`/`exponent` out of a decimal literal's body, *excluding*
/// the trailing `n` marker: digits, optional `.frac`, optional
/// `(e|p)[sign]digits`.
fn parse_decimal_body(body: &[u8], pos: usize) -> Result<(i64, i8), DecodeError> {
    let text = std::str::from_utf8(body).map_err(|_| DecodeError::InvalidNumber { pos })?;
    let (neg, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (mantissa_part, exp_part) = match text.find(['e', 'E', 'p', 'P']) {
        Some(i) => (&text[..i], Some(&text[i + 1..])),
        None => (text, None),
    };
    let (int_part, frac_part) = match mantissa_part.split_once('.') {
        Some((i, f)) => (i, f),
        None => (mantissa_part, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(DecodeError::InvalidNumber { pos });
    }
    let digits: String = format!("{int_part}{frac_part}");
    let mut mantissa: i64 = digits.parse().map_err(|_| DecodeError::InvalidNumber { pos })?;
    if neg {
        mantissa = -mantissa;
    }
    let exp_from_frac = -(frac_part.len() as i64);
    let explicit_exp: i64 = match exp_part {
        Some(e) => e.parse().map_err(|_| DecodeError::InvalidNumber { pos })?,
        None => 0,
    };
    let exponent = exp_from_frac + explicit_exp;
    let exponent = i8::try_from(exponent).map_err(|_| DecodeError::InvalidNumber { pos })?;
    Ok((mantissa, exponent))
}

/// Decodes exactly one value from `input`, erroring if non-whitespace
/// bytes remain.
pub fn decode(input: &str) -> Result<Value, DecodeError> {
    let mut reader = CponReader::new(input);
    let value = reader.read_value()?;
    reader.skip_ws();
    if reader.pos != reader.input.len() {
        return Err(DecodeError::TrailingBytes { pos: reader.pos });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::encode;
    use shv_value::DateTime as Dt;

    fn round_trip(v: Value) {
        let s = encode(&v).unwrap();
        let decoded = decode(&s).unwrap();
        assert_eq!(decoded, v, "round trip via {s:?}");
    }

    #[test]
    fn round_trips_scalars() {
        round_trip(Value::null());
        round_trip(Value::from(true));
        round_trip(Value::from(false));
        round_trip(Value::from(0i64));
        round_trip(Value::from(-42i64));
        round_trip(Value::from(u64::MAX));
        round_trip(Value::from(1.5f64));
        round_trip(Value::from(0.1f64));
        round_trip(Value::from("hello, \u{1F600}\n\"quoted\""));
        round_trip(Value::new(Data::Bytes(vec![0, 1, 2, 255, b'"', b'\\'])));
    }

    #[test]
    fn round_trips_decimal() {
        round_trip(Value::new(Data::Decimal(shv_value::Decimal::new(123, -2))));
        round_trip(Value::new(Data::Decimal(shv_value::Decimal::new(-5, -1))));
        round_trip(Value::new(Data::Decimal(shv_value::Decimal::new(12, 3))));
        round_trip(Value::new(Data::Decimal(shv_value::Decimal::new(0, 0))));
    }

    #[test]
    fn round_trips_datetime_pre_epoch() {
        round_trip(Value::new(Data::DateTime(Dt::new(-60_000, 0))));
    }

    #[test]
    fn round_trips_meta_and_containers() {
        let mut v = Value::new(Data::List(vec![Value::from(3i64), {
            let mut m = BTreeMap::new();
            m.insert("a".to_string(), Value::from(false));
            Value::new(Data::Map(m))
        }]));
        v.meta_mut().set_int(1, Value::from(2i64));
        round_trip(v);
    }

    #[test]
    fn decodes_spec_example() {
        // S3: `<1:2>[3,{"a":false}]`
        let v = decode(r#"<1:2>[3,{"a":false}]"#).unwrap();
        let Data::List(items) = v.data() else {
            panic!("expected list")
        };
        assert_eq!(items[0], Value::from(3i64));
        assert_eq!(v.meta().unwrap().get_int(1), Some(&Value::from(2i64)));
    }

    #[test]
    fn empty_dict_literal_is_imap() {
        // Spec §3: "An empty dictionary literal in absence of type
        // information is interpreted as IMap."
        let v = decode("{}").unwrap();
        assert!(matches!(v.data(), Data::IMap(m) if m.is_empty()));
    }

    #[test]
    fn non_empty_map_stays_map() {
        let v = decode(r#"{"a":1}"#).unwrap();
        assert!(matches!(v.data(), Data::Map(m) if m.len() == 1));
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(decode("1 2").is_err());
    }

    #[test]
    fn rejects_unterminated_string() {
        assert!(decode("\"abc").is_err());
    }
}
