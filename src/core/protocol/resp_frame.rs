// src/core/protocol/resp_frame.rs

//! Implements the RESP frame structure and the corresponding `Encoder` and
//! `Decoder` for client-facing network communication.
//!
//! The decoder accepts the two request forms redis clients produce: multibulk
//! arrays of bulk strings, and inline commands with shell-style quoting.

use crate::core::HustGateError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";

// Protocol-level limits to prevent denial-of-service from malformed frames.
const MAX_FRAME_ELEMENTS: usize = 1_024 * 1_024;
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024;
const MAX_INLINE_LENGTH: usize = 64 * 1024;

/// An enum representing a single frame in the RESP protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// A convenience method to encode a frame into a `Vec<u8>`.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, HustGateError> {
        let mut buf = BytesMut::new();
        RespFrameCodec.encode(self.clone(), &mut buf)?;
        Ok(buf.to_vec())
    }
}

/// A `tokio_util::codec` implementation for encoding and decoding `RespFrame`s.
#[derive(Debug, Default)]
pub struct RespFrameCodec;

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = HustGateError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            RespFrame::SimpleString(s) => {
                dst.extend_from_slice(b"+");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Error(s) => {
                dst.extend_from_slice(b"-");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Integer(i) => {
                dst.extend_from_slice(b":");
                dst.extend_from_slice(i.to_string().as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::BulkString(b) => {
                dst.extend_from_slice(b"$");
                dst.extend_from_slice(b.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                dst.extend_from_slice(&b);
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Null => {
                dst.extend_from_slice(b"$-1\r\n");
            }
            RespFrame::Array(arr) => {
                dst.extend_from_slice(b"*");
                dst.extend_from_slice(arr.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                for frame in arr {
                    self.encode(frame, dst)?;
                }
            }
        }
        Ok(())
    }
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = HustGateError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        if src[0] == b'*' {
            decode_multibulk(src)
        } else {
            decode_inline(src)
        }
    }
}

/// Reads one CRLF- (or bare LF-) terminated line starting at `*pos`, advancing
/// the cursor past the terminator. Returns `None` when the line is incomplete.
fn read_line<'a>(src: &'a BytesMut, pos: &mut usize) -> Option<&'a [u8]> {
    let start = *pos;
    let nl = src[start..].iter().position(|&b| b == b'\n')?;
    let mut end = start + nl;
    *pos = end + 1;
    if end > start && src[end - 1] == b'\r' {
        end -= 1;
    }
    Some(&src[start..end])
}

fn parse_decimal(line: &[u8]) -> Option<i64> {
    std::str::from_utf8(line).ok()?.parse::<i64>().ok()
}

/// Decodes a multibulk request: `*N` followed by N bulk strings. The buffer is
/// only consumed once the entire frame is available.
fn decode_multibulk(src: &mut BytesMut) -> Result<Option<RespFrame>, HustGateError> {
    let mut pos = 0usize;
    let Some(header) = read_line(src, &mut pos) else {
        return Ok(None);
    };
    let count = parse_decimal(&header[1..])
        .ok_or_else(|| HustGateError::Protocol("invalid multibulk length".into()))?;
    if count < 0 || count as usize > MAX_FRAME_ELEMENTS {
        return Err(HustGateError::Protocol("invalid multibulk length".into()));
    }

    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let Some(bulk_header) = read_line(src, &mut pos) else {
            return Ok(None);
        };
        if bulk_header.first() != Some(&b'$') {
            let got = bulk_header
                .first()
                .map(|&b| (b as char).to_string())
                .unwrap_or_default();
            return Err(HustGateError::Protocol(format!("expected '$', got '{got}'")));
        }
        let len = parse_decimal(&bulk_header[1..])
            .ok_or_else(|| HustGateError::Protocol("invalid bulk length".into()))?;
        if len < 0 || len as usize > MAX_BULK_STRING_SIZE {
            return Err(HustGateError::Protocol("invalid bulk length".into()));
        }
        let len = len as usize;
        if src.len() < pos + len + 2 {
            return Ok(None);
        }
        if &src[pos + len..pos + len + 2] != CRLF {
            return Err(HustGateError::Protocol("invalid bulk length".into()));
        }
        items.push(RespFrame::BulkString(Bytes::copy_from_slice(
            &src[pos..pos + len],
        )));
        pos += len + 2;
    }

    src.advance(pos);
    Ok(Some(RespFrame::Array(items)))
}

/// Decodes an inline command: a single line of whitespace-separated tokens
/// with single- or double-quote grouping. An empty line decodes to an empty
/// array, which the connection handler ignores.
fn decode_inline(src: &mut BytesMut) -> Result<Option<RespFrame>, HustGateError> {
    let mut pos = 0usize;
    let Some(line) = read_line(src, &mut pos) else {
        if src.len() > MAX_INLINE_LENGTH {
            return Err(HustGateError::Protocol("too big inline request".into()));
        }
        return Ok(None);
    };
    let args = split_inline(line)?;
    src.advance(pos);
    Ok(Some(RespFrame::Array(
        args.into_iter().map(RespFrame::BulkString).collect(),
    )))
}

fn split_inline(line: &[u8]) -> Result<Vec<Bytes>, HustGateError> {
    let unbalanced = || HustGateError::Protocol("unbalanced quotes in request".into());

    let mut args = Vec::new();
    let mut i = 0usize;
    while i < line.len() {
        while i < line.len() && line[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= line.len() {
            break;
        }
        let quote = match line[i] {
            q @ (b'"' | b'\'') => {
                i += 1;
                Some(q)
            }
            _ => None,
        };
        let mut token = Vec::new();
        let mut closed = quote.is_none();
        while i < line.len() {
            let b = line[i];
            match quote {
                Some(q) => {
                    if b == b'\\' && q == b'"' && i + 1 < line.len() {
                        token.push(line[i + 1]);
                        i += 2;
                        continue;
                    }
                    if b == q {
                        // A closing quote must end the token.
                        if i + 1 < line.len() && !line[i + 1].is_ascii_whitespace() {
                            return Err(unbalanced());
                        }
                        i += 1;
                        closed = true;
                        break;
                    }
                }
                None => {
                    if b.is_ascii_whitespace() {
                        break;
                    }
                }
            }
            token.push(b);
            i += 1;
        }
        if !closed {
            return Err(unbalanced());
        }
        args.push(Bytes::from(token));
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Result<Vec<RespFrame>, HustGateError> {
        let mut codec = RespFrameCodec;
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(frame) = codec.decode(&mut buf)? {
            out.push(frame);
        }
        Ok(out)
    }

    #[test]
    fn decodes_multibulk_command() {
        let frames = decode_all(b"*2\r\n$3\r\nget\r\n$3\r\nfoo\r\n").unwrap();
        assert_eq!(
            frames,
            vec![RespFrame::Array(vec![
                RespFrame::BulkString(Bytes::from_static(b"get")),
                RespFrame::BulkString(Bytes::from_static(b"foo")),
            ])]
        );
    }

    #[test]
    fn incomplete_frame_waits_for_more_data() {
        let mut codec = RespFrameCodec;
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nge"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        // Nothing may be consumed while the frame is incomplete.
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn inline_command_with_quotes() {
        let frames = decode_all(b"set foo \"bar baz\"\r\n").unwrap();
        let RespFrame::Array(items) = &frames[0] else {
            panic!("expected array");
        };
        assert_eq!(items[2], RespFrame::BulkString(Bytes::from_static(b"bar baz")));
    }

    #[test]
    fn unbalanced_quote_is_a_protocol_error() {
        let err = decode_all(b"set foo \"bar\r\n").unwrap_err();
        assert!(matches!(err, HustGateError::Protocol(msg) if msg.contains("unbalanced quotes")));
    }

    #[test]
    fn bad_bulk_length_is_a_protocol_error() {
        let err = decode_all(b"*1\r\n$abc\r\nx\r\n").unwrap_err();
        assert!(matches!(err, HustGateError::Protocol(msg) if msg.contains("invalid bulk length")));
    }

    #[test]
    fn encodes_reply_shapes() {
        assert_eq!(
            RespFrame::SimpleString("OK".into()).encode_to_vec().unwrap(),
            b"+OK\r\n"
        );
        assert_eq!(RespFrame::Null.encode_to_vec().unwrap(), b"$-1\r\n");
        assert_eq!(RespFrame::Integer(42).encode_to_vec().unwrap(), b":42\r\n");
        assert_eq!(
            RespFrame::BulkString(Bytes::from_static(b"bar"))
                .encode_to_vec()
                .unwrap(),
            b"$3\r\nbar\r\n"
        );
        assert_eq!(
            RespFrame::Array(vec![RespFrame::BulkString(Bytes::from_static(b"a"))])
                .encode_to_vec()
                .unwrap(),
            b"*1\r\n$1\r\na\r\n"
        );
    }
}
