//! C99-style hex-mantissa scientific notation for `f64`, e.g. `0x1.8p3`.
//!
//! Spec §4.2.2 mandates the CPON writer emit doubles in this form ("to
//! avoid float-to-decimal rounding loss"); the reader also accepts plain
//! decimal/scientific notation for interop with other CPON producers.

pub fn format(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    let bits = v.to_bits();
    let sign = if bits >> 63 == 1 { "-" } else { "" };
    let exp_bits = ((bits >> 52) & 0x7ff) as i64;
    let mantissa = bits & 0xf_ffff_ffff_ffff;

    if exp_bits == 0 && mantissa == 0 {
        return format!("{sign}0x0p0");
    }

    let (leading, exponent) = if exp_bits == 0 {
        (0u8, -1022i64)
    } else {
        (1u8, exp_bits - 1023)
    };
    let mantissa_hex = format!("{mantissa:013x}");
    let trimmed = mantissa_hex.trim_end_matches('0');
    if trimmed.is_empty() {
        format!("{sign}0x{leading}p{exponent}")
    } else {
        format!("{sign}0x{leading}.{trimmed}p{exponent}")
    }
}

/// Parses a hex-mantissa literal's body after the caller has already
/// recognised the `0x` prefix (case-insensitive); `start` points just
/// past it. Returns the parsed value and the number of bytes consumed
/// from `start`.
pub fn parse(s: &str) -> Option<f64> {
    let (sign, rest) = match s.strip_prefix('-') {
        Some(r) => (-1.0, r),
        None => (1.0, s.strip_prefix('+').unwrap_or(s)),
    };
    let rest = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X"))?;
    let p_pos = rest.find(|c| c == 'p' || c == 'P')?;
    let (mantissa_part, exp_part) = rest.split_at(p_pos);
    let exp_part = &exp_part[1..];
    let exponent: i64 = exp_part.parse().ok()?;

    let (int_part, frac_part) = match mantissa_part.split_once('.') {
        Some((i, f)) => (i, f),
        None => (mantissa_part, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let int_val: u64 = if int_part.is_empty() {
        0
    } else {
        u64::from_str_radix(int_part, 16).ok()?
    };
    let mut value = int_val as f64;
    let mut scale = 1.0f64 / 16.0;
    for c in frac_part.chars() {
        let digit = c.to_digit(16)? as f64;
        value += digit * scale;
        scale /= 16.0;
    }
    Some(sign * value * 2f64.powi(exponent as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: f64) {
        let s = format(v);
        let parsed = parse(&s).unwrap();
        assert_eq!(parsed.to_bits(), v.to_bits(), "{v} -> {s} -> {parsed}");
    }

    #[test]
    fn round_trips_common_values() {
        for v in [0.0, -0.0, 1.0, -1.0, 1.5, 0.1, -0.1, 3.14159265358979, 1e100, 1e-300] {
            round_trip(v);
        }
    }

    #[test]
    fn zero_formats_plainly() {
        assert_eq!(format(0.0), "0x0p0");
    }
}
