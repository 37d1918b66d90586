//! Canonical, stable JSON serialization used to build the byte sequence hashed
//! before every signature in the system (wire handshakes, PoSe HTTP envelopes,
//! EIP-712 typed data). Two independent implementations that both start from
//! the same `serde_json::Value` must produce byte-identical output, or
//! signature verification breaks.
//!
//! Rules: object keys are sorted lexicographically, array order is preserved,
//! no key is omitted, and numbers that would lose precision in an IEEE-754
//! f64 (anything outside `±2^53`) are emitted as their decimal string form
//! rather than a JSON number literal.

use serde_json::Value;

const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991; // 2^53 - 1

/// Serializes `value` into its canonical byte form.
pub fn canonical_json_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Number(n) => write_number(n, out),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            out.push(b'{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(key, out);
                out.push(b':');
                write_canonical(&map[*key], out);
            }
            out.push(b'}');
        }
    }
}

fn write_number(n: &serde_json::Number, out: &mut Vec<u8>) {
    if let Some(i) = n.as_i64() {
        if i.abs() <= MAX_SAFE_INTEGER {
            out.extend_from_slice(i.to_string().as_bytes());
            return;
        }
    }
    if let Some(u) = n.as_u64() {
        if u <= MAX_SAFE_INTEGER as u64 {
            out.extend_from_slice(u.to_string().as_bytes());
            return;
        }
    }
    // Either fractional or out of the 53-bit safe-integer range: emit the
    // decimal string form so no precision is lost across re-parsing.
    write_string(&n.to_string(), out);
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
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
    fn sorts_object_keys() {
        let v = json!({"b": 1, "a": 2});
        assert_eq!(canonical_json_bytes(&v), br#"{"a":2,"b":1}"#);
    }

    #[test]
    fn preserves_array_order() {
        let v = json!([3, 1, 2]);
        assert_eq!(canonical_json_bytes(&v), b"[3,1,2]");
    }

    #[test]
    fn big_integers_become_strings() {
        let v = json!({"amount": 18_446_744_073_709_551_615u64});
        assert_eq!(
            canonical_json_bytes(&v),
            br#"{"amount":"18446744073709551615"}"#
        );
    }

    #[test]
    fn small_integers_stay_numbers() {
        let v = json!({"count": 42});
        assert_eq!(canonical_json_bytes(&v), br#"{"count":42}"#);
    }

    #[test]
    fn nested_objects_sort_recursively() {
        let v = json!({"z": {"y": 1, "x": 2}, "a": 1});
        assert_eq!(
            canonical_json_bytes(&v),
            br#"{"a":1,"z":{"x":2,"y":1}}"#
        );
    }

    #[test]
    fn round_trips_are_order_independent() {
        let a = json!({"a": 1, "b": [1, 2], "c": {"d": 1, "e": 2}});
        let b = json!({"c": {"e": 2, "d": 1}, "b": [1, 2], "a": 1});
        assert_eq!(canonical_json_bytes(&a), canonical_json_bytes(&b));
    }
}
