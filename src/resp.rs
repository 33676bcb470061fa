use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

///
/// RESP wire values and the codec turning byte streams into them.
///

/// max bytes in inline command
pub static MAX_SIZE_INLINE_CMD: usize = 1024 * 1024 * 256;
/// max payload of a single bulk string (512MB, same as the reference server)
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
/// max elements of a multi bulk request
const MAX_MULTI_BULK: i64 = 1024 * 1024;
/// arrays may nest on paper; nothing legitimate nests deeper than this
const MAX_DEPTH: usize = 32;

/// One RESP value. Strings are byte sequences, not UTF-8: keys, channel
/// names and stored values may contain any byte including NUL and CRLF.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(Bytes),
    /// `None` is the null bulk string `$-1\r\n`
    BulkString(Option<Bytes>),
    Integer(i64),
    Error { code: String, message: String },
    /// `None` is the null array `*-1\r\n`
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    pub fn ok() -> RespValue {
        RespValue::SimpleString(Bytes::from_static(b"OK"))
    }

    pub fn pong() -> RespValue {
        RespValue::SimpleString(Bytes::from_static(b"PONG"))
    }

    pub fn simple(s: &'static str) -> RespValue {
        RespValue::SimpleString(Bytes::from_static(s.as_bytes()))
    }

    pub fn bulk(bytes: impl Into<Bytes>) -> RespValue {
        RespValue::BulkString(Some(bytes.into()))
    }

    pub fn null_bulk() -> RespValue {
        RespValue::BulkString(None)
    }

    pub fn null_array() -> RespValue {
        RespValue::Array(None)
    }

    pub fn array(items: Vec<RespValue>) -> RespValue {
        RespValue::Array(Some(items))
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> RespValue {
        RespValue::Error { code: code.into(), message: message.into() }
    }

    /// Encode into `dst` using the exact byte forms of the protocol:
    /// `+OK\r\n`, `-ERR msg\r\n`, `:42\r\n`, `$5\r\nhello\r\n`, `*2\r\n...`,
    /// `$-1\r\n`, `*-1\r\n`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => {
                dst.extend_from_slice(b"+");
                dst.extend_from_slice(s);
                dst.extend_from_slice(b"\r\n");
            }
            RespValue::Error { code, message } => {
                dst.extend_from_slice(b"-");
                dst.extend_from_slice(code.as_bytes());
                if !message.is_empty() {
                    dst.extend_from_slice(b" ");
                    dst.extend_from_slice(message.as_bytes());
                }
                dst.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(n) => {
                dst.extend_from_slice(b":");
                dst.extend_from_slice(n.to_string().as_bytes());
                dst.extend_from_slice(b"\r\n");
            }
            RespValue::BulkString(None) => dst.extend_from_slice(b"$-1\r\n"),
            RespValue::BulkString(Some(b)) => {
                dst.extend_from_slice(b"$");
                dst.extend_from_slice(b.len().to_string().as_bytes());
                dst.extend_from_slice(b"\r\n");
                dst.extend_from_slice(b);
                dst.extend_from_slice(b"\r\n");
            }
            RespValue::Array(None) => dst.extend_from_slice(b"*-1\r\n"),
            RespValue::Array(Some(items)) => {
                dst.extend_from_slice(b"*");
                dst.extend_from_slice(items.len().to_string().as_bytes());
                dst.extend_from_slice(b"\r\n");
                for item in items {
                    item.write_to(dst);
                }
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RespError {
    #[error("Protocol error: invalid bulk length")]
    BadLength,
    #[error("Protocol error: invalid multibulk length")]
    BadMultiBulkLength,
    #[error("Protocol error: invalid integer")]
    BadInteger,
    #[error("Protocol error: {0}")]
    Protocol(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Stream codec for RESP frames.
///
/// Decoding is restartable: a partial frame yields `None` and the parse
/// starts over when more bytes arrive, so no parser state survives between
/// calls. A frame whose first byte is not one of `+ - : $ *` is read in
/// inline mode: one CRLF-terminated line, split on whitespace, surfaced as
/// an array of bulk strings as if the client had framed it properly.
#[derive(Debug, Default)]
pub struct RespCodec;

impl RespCodec {
    pub fn new() -> RespCodec {
        RespCodec
    }
}

impl Decoder for RespCodec {
    type Item = RespValue;
    type Error = RespError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        match parse_value(src, 0)? {
            Some((value, consumed)) => {
                src.advance(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<RespValue> for RespCodec {
    type Error = RespError;

    fn encode(&mut self, item: RespValue, dst: &mut BytesMut) -> Result<(), RespError> {
        item.write_to(dst);
        Ok(())
    }
}

/// Parse one value from the front of `src`. Returns the value and the
/// number of bytes it occupied, or `None` if the buffer holds only a
/// partial frame.
fn parse_value(src: &[u8], depth: usize) -> Result<Option<(RespValue, usize)>, RespError> {
    if depth > MAX_DEPTH {
        return Err(RespError::Protocol("multibulk nested too deeply"));
    }
    let Some(&kind) = src.first() else {
        return Ok(None);
    };
    match kind {
        b'+' => Ok(find_line(&src[1..])?.map(|(line, used)| {
            (RespValue::SimpleString(Bytes::copy_from_slice(line)), used + 1)
        })),
        b'-' => Ok(find_line(&src[1..])?.map(|(line, used)| {
            let (code, message) = split_error_line(line);
            (RespValue::Error { code, message }, used + 1)
        })),
        b':' => match find_line(&src[1..])? {
            None => Ok(None),
            Some((line, used)) => {
                let n = parse_int_line(line).ok_or(RespError::BadInteger)?;
                Ok(Some((RespValue::Integer(n), used + 1)))
            }
        },
        b'$' => parse_bulk(src),
        b'*' => parse_array(src, depth),
        _ => parse_inline(src),
    }
}

fn parse_bulk(src: &[u8]) -> Result<Option<(RespValue, usize)>, RespError> {
    let Some((line, used)) = find_line(&src[1..])? else {
        return Ok(None);
    };
    let header = used + 1;
    let len = parse_int_line(line).ok_or(RespError::BadLength)?;
    if len == -1 {
        return Ok(Some((RespValue::BulkString(None), header)));
    }
    if len < 0 || len > MAX_BULK_LEN {
        return Err(RespError::BadLength);
    }
    let len = len as usize;
    // payload plus its own CRLF
    if src.len() < header + len + 2 {
        return Ok(None);
    }
    if &src[header + len..header + len + 2] != b"\r\n" {
        return Err(RespError::BadLength);
    }
    let payload = Bytes::copy_from_slice(&src[header..header + len]);
    Ok(Some((RespValue::BulkString(Some(payload)), header + len + 2)))
}

fn parse_array(src: &[u8], depth: usize) -> Result<Option<(RespValue, usize)>, RespError> {
    let Some((line, used)) = find_line(&src[1..])? else {
        return Ok(None);
    };
    let header = used + 1;
    let len = parse_int_line(line).ok_or(RespError::BadMultiBulkLength)?;
    if len == -1 {
        return Ok(Some((RespValue::Array(None), header)));
    }
    if len < 0 || len > MAX_MULTI_BULK {
        return Err(RespError::BadMultiBulkLength);
    }
    let mut items = Vec::new();
    let mut at = header;
    for _ in 0..len {
        match parse_value(&src[at..], depth + 1)? {
            None => return Ok(None),
            Some((value, consumed)) => {
                items.push(value);
                at += consumed;
            }
        }
    }
    Ok(Some((RespValue::Array(Some(items)), at)))
}

/// Inline/telnet mode: a bare line becomes an array of bulk strings.
/// A line of pure whitespace decodes as an empty array the dispatch
/// layer skips over.
fn parse_inline(src: &[u8]) -> Result<Option<(RespValue, usize)>, RespError> {
    let Some(nl) = src.iter().position(|&b| b == b'\n') else {
        if src.len() >= MAX_SIZE_INLINE_CMD {
            return Err(RespError::Protocol("too big inline request"));
        }
        return Ok(None);
    };
    let mut line = &src[..nl];
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }
    let items: Vec<RespValue> = line
        .split(|&b| b == b' ' || b == b'\t')
        .filter(|token| !token.is_empty())
        .map(|token| RespValue::BulkString(Some(Bytes::copy_from_slice(token))))
        .collect();
    Ok(Some((RespValue::Array(Some(items)), nl + 1)))
}

/// Locate the CRLF terminator; returns the line body and the byte count
/// including the terminator.
fn find_line(src: &[u8]) -> Result<Option<(&[u8], usize)>, RespError> {
    match src.windows(2).position(|w| w == b"\r\n") {
        Some(at) => Ok(Some((&src[..at], at + 2))),
        None => Ok(None),
    }
}

fn parse_int_line(line: &[u8]) -> Option<i64> {
    if line.is_empty() {
        return None;
    }
    let (negative, digits) = match line[0] {
        b'-' => (true, &line[1..]),
        _ => (false, line),
    };
    if digits.is_empty() {
        return None;
    }
    let mut n: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        n = n.checked_mul(10)?.checked_add((b - b'0') as i64)?;
    }
    Some(if negative { -n } else { n })
}

fn split_error_line(line: &[u8]) -> (String, String) {
    let text = String::from_utf8_lossy(line);
    match text.split_once(' ') {
        Some((code, message)) => (code.to_string(), message.to_string()),
        None => (text.to_string(), String::new()),
    }
}
