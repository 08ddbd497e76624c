//! Textual float encoding.
//!
//! A finite float is written as its `frexp` decomposition `m * 2^e` with
//! `0.5 <= |m| < 1`: a leading space, the signed mantissa with 54 fractional
//! digits, a space, and the exponent right-aligned in five columns. The 53-bit
//! mantissa has an exact decimal expansion, so the text round-trips exactly.
//! Non-finite values are spelled `Infinity`, `-Infinity` and `NaN`, and are
//! matched case-insensitively on read. Every encoding ends with `\n`.

use crate::compiled_file::errors::CompiledFileError;

const EXP_MASK: u64 = 0x7ff;
const MANTISSA_BITS: u32 = 52;
const EXP_BIAS: i32 = 0x3ff;

/// Splits `x` into a mantissa in `[0.5, 1)` (by magnitude) and a power of two.
///
/// Zero, infinities and NaN are returned unchanged with exponent 0.
pub fn frexp(x: f64) -> (f64, i32) {
    let bits = x.to_bits();
    let raw_exp = ((bits >> MANTISSA_BITS) & EXP_MASK) as i32;
    match raw_exp {
        0 if x == 0.0 => (x, 0),
        0 => {
            // Subnormal: normalize first.
            let (m, e) = frexp(x * f64::from_bits(((EXP_BIAS + 64) as u64) << MANTISSA_BITS));
            (m, e - 64)
        }
        0x7ff => (x, 0),
        _ => {
            let mantissa = (bits & 0x800f_ffff_ffff_ffff) | 0x3fe0_0000_0000_0000;
            (f64::from_bits(mantissa), raw_exp - (EXP_BIAS - 1))
        }
    }
}

/// Computes `x * 2^n` with a single rounding.
pub fn ldexp(x: f64, n: i32) -> f64 {
    let p2_1023 = pow2(1023);
    let p2_min_53 = pow2(-1022) * pow2(53);
    let mut y = x;
    let mut n = n;
    if n > 1023 {
        y *= p2_1023;
        n -= 1023;
        if n > 1023 {
            y *= p2_1023;
            n -= 1023;
            n = n.min(1023);
        }
    } else if n < -1022 {
        // Keep the final step below -53 so subnormal results round once.
        y *= p2_min_53;
        n += 1022 - 53;
        if n < -1022 {
            y *= p2_min_53;
            n += 1022 - 53;
            n = n.max(-1022);
        }
    }
    y * pow2(n)
}

/// `2^n` for `n` in the normal exponent range.
fn pow2(n: i32) -> f64 {
    f64::from_bits(((EXP_BIAS + n) as u64) << MANTISSA_BITS)
}

/// Appends the textual encoding of `value`, including the trailing newline.
pub fn write_float(out: &mut Vec<u8>, value: f64) {
    let text = if value.is_nan() {
        "NaN\n".to_string()
    } else if value.is_infinite() {
        if value < 0.0 { "-Infinity\n" } else { "Infinity\n" }.to_string()
    } else {
        let (mantissa, exponent) = frexp(value);
        format!(" {mantissa:+.54} {exponent:5}\n")
    };
    out.extend_from_slice(text.as_bytes());
}

/// Parses one float line, without its trailing newline.
pub fn parse_float(line: &[u8]) -> Result<f64, CompiledFileError> {
    let invalid = || CompiledFileError::InvalidFloat {
        text: String::from_utf8_lossy(line).into_owned(),
    };
    let text = std::str::from_utf8(line).map_err(|_| invalid())?;

    if let Some(numeric) = text.strip_prefix(' ') {
        let mut parts = numeric.split_whitespace();
        let (Some(mantissa), Some(exponent), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let mantissa: f64 = mantissa.parse().map_err(|_| invalid())?;
        let exponent: i32 = exponent.parse().map_err(|_| invalid())?;
        return Ok(ldexp(mantissa, exponent));
    }

    match text.to_ascii_lowercase().as_str() {
        "infinity" => Ok(f64::INFINITY),
        "-infinity" => Ok(f64::NEG_INFINITY),
        "nan" => Ok(f64::NAN),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: f64) -> String {
        let mut out = Vec::new();
        write_float(&mut out, value);
        String::from_utf8(out).unwrap()
    }

    fn round_trip(value: f64) -> f64 {
        let text = encoded(value);
        parse_float(text.trim_end_matches('\n').as_bytes()).unwrap()
    }

    #[test]
    fn frexp_known_values() {
        assert_eq!(frexp(1.0), (0.5, 1));
        assert_eq!(frexp(8.0), (0.5, 4));
        assert_eq!(frexp(-3.0), (-0.75, 2));
        assert_eq!(frexp(0.1).1, -3);
        assert_eq!(frexp(0.0), (0.0, 0));
        assert_eq!(frexp(f64::MAX).1, 1024);
        assert_eq!(frexp(f64::from_bits(1)), (0.5, -1073));
    }

    #[test]
    fn ldexp_inverts_frexp_at_extremes() {
        for value in [
            f64::MAX,
            f64::MIN_POSITIVE,
            f64::from_bits(1),
            f64::from_bits(0x000f_ffff_ffff_ffff),
            -1.5e-310,
            123.456,
        ] {
            let (m, e) = frexp(value);
            assert_eq!(ldexp(m, e).to_bits(), value.to_bits(), "{value:e}");
        }
        assert_eq!(ldexp(1.0, 2000), f64::INFINITY);
        assert_eq!(ldexp(1.0, -2000), 0.0);
    }

    #[test]
    fn finite_layout() {
        let text = encoded(1.0);
        assert_eq!(
            text,
            " +0.500000000000000000000000000000000000000000000000000000     1\n"
        );
        assert!(encoded(-0.0).starts_with(" -0.000"));
        assert!(encoded(0.1).ends_with("    -3\n"));
        assert!(encoded(f64::MAX).ends_with("  1024\n"));
    }

    #[test]
    fn non_finite_spellings() {
        assert_eq!(encoded(f64::INFINITY), "Infinity\n");
        assert_eq!(encoded(f64::NEG_INFINITY), "-Infinity\n");
        assert_eq!(encoded(f64::NAN), "NaN\n");
        assert_eq!(parse_float(b"INFINITY").unwrap(), f64::INFINITY);
        assert_eq!(parse_float(b"-infinity").unwrap(), f64::NEG_INFINITY);
        assert!(parse_float(b"nan").unwrap().is_nan());
    }

    #[test]
    fn round_trips_exactly() {
        for value in [0.0, -0.0, 1.0, -2.5, 0.1, 1e300, -1e-300, f64::MAX, f64::from_bits(1)] {
            assert_eq!(round_trip(value).to_bits(), value.to_bits(), "{value:e}");
        }
        assert!(round_trip(f64::NAN).is_nan());
    }

    #[test]
    fn rejects_malformed_lines() {
        for bad in [&b"1.5"[..], b" 0.5", b" 0.5 x", b" 0.5 1 2", b"inf", b"", b"\xff"] {
            assert!(
                matches!(parse_float(bad), Err(CompiledFileError::InvalidFloat { .. })),
                "{bad:?}"
            );
        }
    }
}
