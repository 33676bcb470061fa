use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn timestamp() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO)
}

/// Render one argument of a monitored command the way redis-cli shows it:
/// printable ASCII stays as-is inside double quotes, everything else is
/// escaped as \xHH (quotes and backslashes get a plain backslash).
pub fn quote_bytes(arg: &[u8]) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for &b in arg {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out.push('"');
    out
}

/// Strict integer parse for command arguments. Rejects empty input,
/// leading '+', whitespace and anything i64 cannot hold.
pub fn parse_i64(bytes: &[u8]) -> Option<i64> {
    let s = std::str::from_utf8(bytes).ok()?;
    if s.is_empty() || s.starts_with('+') {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_bytes_test() {
        assert_eq!(quote_bytes(b"get"), "\"get\"");
        assert_eq!(quote_bytes(b"a\"b"), "\"a\\\"b\"");
        assert_eq!(quote_bytes(b"\x01\xff"), "\"\\x01\\xff\"");
        assert_eq!(quote_bytes(b"a\r\n"), "\"a\\r\\n\"");
    }

    #[test]
    fn parse_i64_test() {
        assert_eq!(parse_i64(b"42"), Some(42));
        assert_eq!(parse_i64(b"-7"), Some(-7));
        assert_eq!(parse_i64(b"+7"), None);
        assert_eq!(parse_i64(b" 7"), None);
        assert_eq!(parse_i64(b"4.2"), None);
        assert_eq!(parse_i64(b""), None);
    }
}
