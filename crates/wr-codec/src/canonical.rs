// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical JSON serialization (JCS-equivalent).
//!
//! Object keys are sorted lexicographically by UTF-16 code units (which for
//! the key material used here coincides with byte order), there is no
//! insignificant whitespace, and numbers are printed in their shortest
//! round-trip form. Integral doubles within the exact range of `f64` print
//! with no fractional part, so `10.0` and `10` canonicalize identically.

use crate::CodecError;
use serde_json::Value;

/// Serialize a JSON value to canonical bytes.
///
/// Equal values always produce byte-identical output, which makes the
/// result safe to hash, sign, and content-address.
///
/// # Errors
///
/// Returns [`CodecError::CanonicalNonFiniteNumber`] if a number slot holds
/// a NaN or infinity.
///
/// # Examples
///
/// ```
/// use serde_json::json;
///
/// let a = wr_codec::canonical_json(&json!({"b": 1, "a": 2})).unwrap();
/// let b = wr_codec::canonical_json(&json!({"a": 2, "b": 1})).unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a, br#"{"a":2,"b":1}"#);
/// ```
pub fn canonical_json(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(128);
    write_value(value, &mut out)?;
    Ok(out)
}

/// Serialize a JSON value to a canonical UTF-8 string.
///
/// Convenience wrapper around [`canonical_json`].
pub fn canonical_json_string(value: &Value) -> Result<String, CodecError> {
    let bytes = canonical_json(value)?;
    // write_value only emits valid UTF-8.
    Ok(String::from_utf8(bytes).unwrap_or_default())
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => write_number(n, out)?,
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push(b'{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(key, out);
                out.push(b':');
                write_value(&map[key], out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

/// Largest integer exactly representable in an `f64`.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

fn write_number(n: &serde_json::Number, out: &mut Vec<u8>) -> Result<(), CodecError> {
    if let Some(u) = n.as_u64() {
        out.extend_from_slice(u.to_string().as_bytes());
        return Ok(());
    }
    if let Some(i) = n.as_i64() {
        out.extend_from_slice(i.to_string().as_bytes());
        return Ok(());
    }
    let Some(f) = n.as_f64() else {
        return Err(CodecError::CanonicalNonFiniteNumber);
    };
    if !f.is_finite() {
        return Err(CodecError::CanonicalNonFiniteNumber);
    }
    if f == f.trunc() && f.abs() <= MAX_SAFE_INTEGER {
        // Integral double: no fractional part, and -0.0 collapses to 0.
        out.extend_from_slice((f as i64).to_string().as_bytes());
    } else {
        // Rust's float Display is shortest round-trip.
        out.extend_from_slice(f.to_string().as_bytes());
    }
    Ok(())
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\u{08}' => out.extend_from_slice(b"\\b"),
            '\u{09}' => out.extend_from_slice(b"\\t"),
            '\u{0a}' => out.extend_from_slice(b"\\n"),
            '\u{0c}' => out.extend_from_slice(b"\\f"),
            '\u{0d}' => out.extend_from_slice(b"\\r"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_keys_recursively() {
        let v = json!({"z": {"b": 1, "a": 2}, "a": [true, null]});
        let s = canonical_json_string(&v).unwrap();
        assert_eq!(s, r#"{"a":[true,null],"z":{"a":2,"b":1}}"#);
    }

    #[test]
    fn integral_double_prints_without_fraction() {
        let v = Value::Number(serde_json::Number::from_f64(10.0).unwrap());
        assert_eq!(canonical_json_string(&v).unwrap(), "10");
    }

    #[test]
    fn negative_zero_collapses() {
        let v = Value::Number(serde_json::Number::from_f64(-0.0).unwrap());
        assert_eq!(canonical_json_string(&v).unwrap(), "0");
    }

    #[test]
    fn fractional_double_round_trips_shortest() {
        let v = Value::Number(serde_json::Number::from_f64(0.1).unwrap());
        assert_eq!(canonical_json_string(&v).unwrap(), "0.1");
    }

    #[test]
    fn control_characters_escape() {
        let v = json!("a\u{01}b\nc");
        assert_eq!(canonical_json_string(&v).unwrap(), "\"a\\u0001b\\nc\"");
    }

    #[test]
    fn unicode_passes_through_unescaped() {
        let v = json!("héllo — ☃");
        assert_eq!(canonical_json_string(&v).unwrap(), "\"héllo — ☃\"");
    }

    #[test]
    fn reordered_keys_are_byte_identical() {
        let a = json!({"eventIndex": 0, "eventId": "evt_x", "kind": "session_created"});
        let b = json!({"kind": "session_created", "eventId": "evt_x", "eventIndex": 0});
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }
}
