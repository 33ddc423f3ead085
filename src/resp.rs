//! Incremental RESP framer: reads one frame at a time from a buffered async
//! stream, never buffering more than one frame, and retains the raw bytes
//! that produced each frame so callers can forward them verbatim.
//!
//! The minimum 16 KiB read buffer matches the buffered reader size the
//! original implementation uses ahead of its own line-oriented parser.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::errors::ProxyError;

pub const MIN_READ_BUFFER: usize = 16 * 1024;

/// A parsed RESP frame, carrying the raw bytes that produced it.
///
/// Inline commands (lines that start with neither `+`, `$`, nor `*`) are
/// represented as a single-argument `Array`, mirroring the upstream Go
/// implementation's unified `command []string` representation: whether a
/// command arrived as a true RESP array or as a bare inline line, downstream
/// logic only ever cares about the resulting token list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A bare line terminator (`\r\n` or `\n` alone).
    Empty { raw: Vec<u8> },
    /// A status line beginning with `+`, trimmed of its leading sigil and
    /// trailing CRLF.
    SimpleReply { value: String, raw: Vec<u8> },
    /// A `$<n>` header announcing `n` payload bytes not yet consumed. The
    /// caller decides how to read (or skip) the payload.
    BulkHeader { len: i64, raw: Vec<u8> },
    /// A fully materialized command: `*<k>` followed by `k` bulk strings,
    /// or a degenerate one-token inline command.
    Array { args: Vec<Vec<u8>>, raw: Vec<u8> },
}

impl Frame {
    /// The first argument, by convention the command name (`SET`, `PING`, ...).
    pub fn command_name(&self) -> Option<&[u8]> {
        match self {
            Frame::Array { args, .. } => args.first().map(Vec::as_slice),
            _ => None,
        }
    }

    /// The key argument, by convention the second array element (index 1).
    /// See the design's Open Question: multi-key commands are sharded by
    /// only this first key.
    pub fn key_arg(&self) -> Option<&[u8]> {
        match self {
            Frame::Array { args, .. } => args.get(1).map(Vec::as_slice),
            _ => None,
        }
    }

    pub fn raw(&self) -> &[u8] {
        match self {
            Frame::Empty { raw }
            | Frame::SimpleReply { raw, .. }
            | Frame::BulkHeader { raw, .. }
            | Frame::Array { raw, .. } => raw,
        }
    }
}

/// Reads one RESP frame from `reader`. Returns `Ok(None)` on a clean EOF at
/// a frame boundary (the peer closed the connection); any other failure,
/// including EOF in the middle of a frame, is a `FramingError`.
///
/// For a `BulkHeader`, the payload is intentionally left unconsumed — the
/// caller (the snapshot filter, for the one case this proxy uses it) reads
/// it directly off `reader`.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = reader
        .read_until(b'\n', &mut line)
        .await
        .map_err(ProxyError::from)?;
    if n == 0 {
        return Ok(None);
    }
    if !line.ends_with(b"\n") {
        return Err(ProxyError::framing("truncated frame: missing line terminator"));
    }

    if line == b"\r\n" || line == b"\n" {
        return Ok(Some(Frame::Empty { raw: line }));
    }

    match line[0] {
        b'+' => {
            let value = trim_crlf(&line[1..]);
            Ok(Some(Frame::SimpleReply {
                value: String::from_utf8_lossy(value).into_owned(),
                raw: line,
            }))
        }
        b'$' => {
            let len = parse_i64(&line[1..])?;
            Ok(Some(Frame::BulkHeader { len, raw: line }))
        }
        b'*' => {
            let k = parse_i64(&line[1..])?;
            if k < 0 {
                return Err(ProxyError::framing("negative array length"));
            }
            let mut raw = line;
            let mut args = Vec::with_capacity(k as usize);
            for _ in 0..k {
                let mut arg_header = Vec::new();
                let hn = reader
                    .read_until(b'\n', &mut arg_header)
                    .await
                    .map_err(ProxyError::from)?;
                if hn == 0 || arg_header.first() != Some(&b'$') {
                    return Err(ProxyError::framing(
                        "array element missing $ bulk header",
                    ));
                }
                let arg_len = parse_i64(&arg_header[1..])?;
                if arg_len < 0 {
                    return Err(ProxyError::framing("negative bulk length in array"));
                }
                raw.extend_from_slice(&arg_header);

                let mut arg = vec![0u8; arg_len as usize];
                reader
                    .read_exact(&mut arg)
                    .await
                    .map_err(|_| ProxyError::framing("truncated bulk argument"))?;
                raw.extend_from_slice(&arg);

                let mut trailer = [0u8; 2];
                reader
                    .read_exact(&mut trailer)
                    .await
                    .map_err(|_| ProxyError::framing("missing CRLF after bulk argument"))?;
                if &trailer != b"\r\n" {
                    return Err(ProxyError::framing("malformed CRLF after bulk argument"));
                }
                raw.extend_from_slice(&trailer);

                args.push(arg);
            }
            Ok(Some(Frame::Array { args, raw }))
        }
        _ => {
            let token = trim_crlf(&line).to_vec();
            Ok(Some(Frame::Array {
                args: vec![token],
                raw: line,
            }))
        }
    }
}

fn trim_crlf(bytes: &[u8]) -> &[u8] {
    let mut end = bytes.len();
    while end > 0 && (bytes[end - 1] == b'\n' || bytes[end - 1] == b'\r') {
        end -= 1;
    }
    let mut start = 0;
    while start < end && bytes[start].is_ascii_whitespace() {
        start += 1;
    }
    &bytes[start..end]
}

fn parse_i64(bytes: &[u8]) -> Result<i64, ProxyError> {
    let trimmed = trim_crlf(bytes);
    std::str::from_utf8(trimmed)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ProxyError::framing("malformed length header"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    async fn read_all(input: &[u8]) -> Vec<Frame> {
        let mut reader = BufReader::with_capacity(MIN_READ_BUFFER, Cursor::new(input.to_vec()));
        let mut out = Vec::new();
        while let Some(f) = read_frame(&mut reader).await.unwrap() {
            out.push(f);
        }
        out
    }

    #[tokio::test]
    async fn reads_simple_reply_empty_and_ping() {
        let frames = read_all(b"+OK\r\n\r\nPING\r\n").await;
        assert_eq!(
            frames,
            vec![
                Frame::SimpleReply {
                    value: "OK".to_string(),
                    raw: b"+OK\r\n".to_vec(),
                },
                Frame::Empty {
                    raw: b"\r\n".to_vec(),
                },
                Frame::Array {
                    args: vec![b"PING".to_vec()],
                    raw: b"PING\r\n".to_vec(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn reads_array_command_verbatim() {
        let input = b"*3\r\n$3\r\nSET\r\n$5\r\nkey_7\r\n$1\r\nx\r\n";
        let frames = read_all(input).await;
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            Frame::Array { args, raw } => {
                assert_eq!(args, &vec![b"SET".to_vec(), b"key_7".to_vec(), b"x".to_vec()]);
                assert_eq!(raw, input);
            }
            other => panic!("expected Array, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bulk_header_leaves_payload_unconsumed() {
        let mut reader =
            BufReader::with_capacity(MIN_READ_BUFFER, Cursor::new(b"$5\r\nhello".to_vec()));
        let frame = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(
            frame,
            Frame::BulkHeader {
                len: 5,
                raw: b"$5\r\n".to_vec()
            }
        );
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"hello");
    }

    #[tokio::test]
    async fn clean_eof_at_frame_boundary_returns_none() {
        let mut reader = BufReader::with_capacity(MIN_READ_BUFFER, Cursor::new(Vec::new()));
        assert_eq!(read_frame(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn truncated_array_element_is_a_framing_error() {
        let mut reader =
            BufReader::with_capacity(MIN_READ_BUFFER, Cursor::new(b"*1\r\n$4\r\nPI".to_vec()));
        assert!(read_frame(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn command_name_and_key_arg_accessors() {
        let frames = read_all(b"*3\r\n$3\r\nSET\r\n$5\r\nkey_7\r\n$1\r\nx\r\n").await;
        assert_eq!(frames[0].command_name(), Some(&b"SET"[..]));
        assert_eq!(frames[0].key_arg(), Some(&b"key_7"[..]));
    }
}
