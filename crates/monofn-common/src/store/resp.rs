//! RESP2 wire codec.
//!
//! Commands are sent as arrays of bulk strings:
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n
//! ```
//!
//! Replies are one of the five RESP2 types, parsed by [`read_reply`].

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::StoreError;

/// Upper bound on a single bulk string, matching the store's own limit.
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Upper bound on array length accepted from the wire.
const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// A decoded RESP2 value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Simple(String),
    Error(String),
    Integer(i64),
    /// `None` is the null bulk string (`$-1`).
    Bulk(Option<Vec<u8>>),
    /// `None` is the null array (`*-1`).
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Encodes the value in wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            RespValue::Simple(s) => {
                out.push(b'+');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Error(s) => {
                out.push(b'-');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(i) => {
                out.extend_from_slice(format!(":{}\r\n", i).as_bytes());
            }
            RespValue::Bulk(None) => out.extend_from_slice(b"$-1\r\n"),
            RespValue::Bulk(Some(bytes)) => {
                out.extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
                out.extend_from_slice(bytes);
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Array(None) => out.extend_from_slice(b"*-1\r\n"),
            RespValue::Array(Some(items)) => {
                out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.encode_into(out);
                }
            }
        }
    }

    /// Interprets a bulk or simple string reply as UTF-8 text.
    pub fn into_string(self) -> Result<Option<String>, StoreError> {
        match self {
            RespValue::Simple(s) => Ok(Some(s)),
            RespValue::Bulk(None) => Ok(None),
            RespValue::Bulk(Some(bytes)) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StoreError::Protocol(format!("value is not valid UTF-8: {}", e))),
            other => Err(StoreError::Protocol(format!(
                "expected a string reply, got {:?}",
                other
            ))),
        }
    }
}

/// Encodes a command as an array of bulk strings.
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    RespValue::Array(Some(
        args.iter()
            .map(|arg| RespValue::Bulk(Some(arg.to_vec())))
            .collect(),
    ))
    .encode()
}

/// Reads one complete reply from `reader`.
///
/// Error replies are returned as [`RespValue::Error`]; converting them into
/// [`StoreError::Server`] is left to the caller.
pub fn read_reply<'a, R>(
    reader: &'a mut R,
) -> Pin<Box<dyn Future<Output = Result<RespValue, StoreError>> + Send + 'a>>
where
    R: AsyncBufRead + Unpin + Send,
{
    Box::pin(async move {
        let line = read_line(reader).await?;
        let (tag, rest) = line
            .split_first()
            .ok_or_else(|| StoreError::Protocol("empty reply line".into()))?;
        let text = std::str::from_utf8(rest)
            .map_err(|_| StoreError::Protocol("reply header is not valid UTF-8".into()))?;

        match tag {
            b'+' => Ok(RespValue::Simple(text.to_string())),
            b'-' => Ok(RespValue::Error(text.to_string())),
            b':' => parse_int(text).map(RespValue::Integer),
            b'$' => {
                let len = parse_int(text)?;
                if len < 0 {
                    return Ok(RespValue::Bulk(None));
                }
                let len = checked_len(len, MAX_BULK_LEN, "bulk string")?;
                let mut buf = vec![0u8; len + 2];
                reader.read_exact(&mut buf).await?;
                if &buf[len..] != b"\r\n" {
                    return Err(StoreError::Protocol("bulk string missing terminator".into()));
                }
                buf.truncate(len);
                Ok(RespValue::Bulk(Some(buf)))
            }
            b'*' => {
                let len = parse_int(text)?;
                if len < 0 {
                    return Ok(RespValue::Array(None));
                }
                let len = checked_len(len, MAX_ARRAY_LEN, "array")?;
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(read_reply(reader).await?);
                }
                Ok(RespValue::Array(Some(items)))
            }
            other => Err(StoreError::Protocol(format!(
                "unknown reply type byte 0x{:02x}",
                other
            ))),
        }
    })
}

async fn read_line<R>(reader: &mut R) -> Result<Vec<u8>, StoreError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line).await?;
    if n == 0 {
        return Err(StoreError::Protocol("connection closed by store".into()));
    }
    if !line.ends_with(b"\r\n") {
        return Err(StoreError::Protocol("reply line missing CRLF".into()));
    }
    line.truncate(line.len() - 2);
    Ok(line)
}

fn parse_int(text: &str) -> Result<i64, StoreError> {
    text.parse()
        .map_err(|_| StoreError::Protocol(format!("invalid integer '{}'", text)))
}

fn checked_len(len: i64, max: usize, what: &str) -> Result<usize, StoreError> {
    let len = usize::try_from(len)
        .map_err(|_| StoreError::Protocol(format!("invalid {} length {}", what, len)))?;
    if len > max {
        return Err(StoreError::Protocol(format!(
            "{} length {} exceeds limit {}",
            what, len, max
        )));
    }
    Ok(len)
}
