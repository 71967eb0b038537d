//! Inline SQL literals and identifiers
//!
//! Literals are rendered locale-free: dates always use
//! `yyyy-MM-dd HH:mm:ss` and decimals always use `.`.

use quarry_core::{Value, DATETIME_FORMAT};
use std::fmt::Write;

/// Quote an identifier as `[name]`, doubling any `]`.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Render a value as an inline T-SQL literal.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Long(l) => l.to_string(),
        Value::Decimal(d) => decimal_literal(*d),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::DateTime(dt) => format!("'{}'", dt.format(DATETIME_FORMAT)),
        Value::Bytes(bytes) => {
            let mut out = String::with_capacity(2 + bytes.len() * 2);
            out.push_str("0x");
            for b in bytes {
                let _ = write!(out, "{:02X}", b);
            }
            out
        }
    }
}

/// Fractional digits kept in decimal literals
const DECIMAL_SCALE: usize = 4;

// Fixed scale, never exponent form; trailing zeros trimmed.
fn decimal_literal(d: f64) -> String {
    if !d.is_finite() {
        return "NULL".to_string();
    }
    let fixed = format!("{:.*}", DECIMAL_SCALE, d);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
