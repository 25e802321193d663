//! CPON's textual `d"YYYY-MM-DDThh:mm:ss[.fff][±hh:mm|Z]"` datetime form.
//!
//! Calendar arithmetic (leap years, days-per-month) is delegated to the
//! `time` crate rather than hand-rolled, matching how the teacher reaches
//! for an ecosystem crate over a bespoke implementation whenever the shape
//! fits (see DESIGN.md).

use shv_value::DateTime;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::error::{DecodeError, EncodeError};

pub fn format(dt: &DateTime) -> Result<String, EncodeError> {
    let total_ms = dt
        .epoch_msec
        .checked_add(dt.utc_offset_min as i64 * 60_000)
        .ok_or(EncodeError::MalformedDateTime)?;
    let nanos = (total_ms as i128) * 1_000_000;
    let local = OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|_| EncodeError::MalformedDateTime)?;
    let ms = total_ms.rem_euclid(1000);

    let mut out = String::with_capacity(32);
    out.push_str(&format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
        local.year(),
        u8::from(local.month()),
        local.day(),
        local.hour(),
        local.minute(),
        local.second()
    ));
    if ms != 0 {
        out.push_str(&format!(".{ms:03}"));
    }
    if dt.utc_offset_min == 0 {
        out.push('Z');
    } else {
        let sign = if dt.utc_offset_min < 0 { '-' } else { '+' };
        let abs = dt.utc_offset_min.unsigned_abs();
        out.push_str(&format!("{sign}{:02}:{:02}", abs / 60, abs % 60));
    }
    Ok(out)
}

/// Parses the body between `d"` and the closing `"` (exclusive of quotes).
pub fn parse(s: &str, pos: usize) -> Result<DateTime, DecodeError> {
    let err = || DecodeError::MalformedDateTime { pos };
    let bytes = s.as_bytes();
    if bytes.len() < 19 {
        return Err(err());
    }
    let year: i32 = s[0..4].parse().map_err(|_| err())?;
    if &s[4..5] != "-" || &s[7..8] != "-" || &s[10..11] != "T" {
        return Err(err());
    }
    let month: u8 = s[5..7].parse().map_err(|_| err())?;
    let day: u8 = s[8..10].parse().map_err(|_| err())?;
    if &s[13..14] != ":" || &s[16..17] != ":" {
        return Err(err());
    }
    let hour: u8 = s[11..13].parse().map_err(|_| err())?;
    let minute: u8 = s[14..16].parse().map_err(|_| err())?;
    let second: u8 = s[17..19].parse().map_err(|_| err())?;

    let mut rest = &s[19..];
    let mut ms: u16 = 0;
    if let Some(frac) = rest.strip_prefix('.') {
        let digits_len = frac.bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits_len == 0 {
            return Err(err());
        }
        let digits = &frac[..digits_len];
        let mut padded = digits.to_string();
        while padded.len() < 3 {
            padded.push('0');
        }
        ms = padded[..3].parse().map_err(|_| err())?;
        rest = &frac[digits_len..];
    }

    let offset_min: i16 = if rest.is_empty() || rest == "Z" {
        0
    } else {
        let (sign, tail) = match rest.as_bytes()[0] {
            b'+' => (1i16, &rest[1..]),
            b'-' => (-1i16, &rest[1..]),
            _ => return Err(err()),
        };
        if tail.len() < 5 || tail.as_bytes()[2] != b':' {
            return Err(err());
        }
        let h: i16 = tail[0..2].parse().map_err(|_| err())?;
        let m: i16 = tail[3..5].parse().map_err(|_| err())?;
        sign * (h * 60 + m)
    };

    let month = Month::try_from(month).map_err(|_| err())?;
    let date = Date::from_calendar_date(year, month, day).map_err(|_| err())?;
    let time = Time::from_hms_milli(hour, minute, second, ms).map_err(|_| err())?;
    let naive = PrimitiveDateTime::new(date, time);
    let offset = UtcOffset::from_whole_seconds(offset_min as i32 * 60).map_err(|_| err())?;
    let instant = naive.assume_offset(offset);
    let epoch_msec = instant.unix_timestamp_nanos() / 1_000_000;
    let epoch_msec = i64::try_from(epoch_msec).map_err(|_| err())?;

    Ok(DateTime::new(epoch_msec, offset_min))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_utc() {
        let dt = DateTime::new(1_234_567_890_123, 0);
        let s = format(&dt).unwrap();
        assert_eq!(s, "2009-02-13T23:31:30.123Z");
        assert_eq!(parse(&s, 0).unwrap(), dt);
    }

    #[test]
    fn round_trips_with_offset() {
        let dt = DateTime::new(1_234_567_890_000, 120);
        let s = format(&dt).unwrap();
        assert_eq!(parse(&s, 0).unwrap(), dt);
        assert!(s.ends_with("+02:00"));
    }

    #[test]
    fn round_trips_pre_epoch() {
        let dt = DateTime::new(-60_000, 0);
        let s = format(&dt).unwrap();
        assert_eq!(parse(&s, 0).unwrap(), dt);
    }

    #[test]
    fn round_trips_negative_offset() {
        let dt = DateTime::new(1_600_000_000_000, -330);
        let s = format(&dt).unwrap();
        assert_eq!(parse(&s, 0).unwrap(), dt);
        assert!(s.contains("-05:30"));
    }
}
