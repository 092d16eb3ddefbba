//! STOMP frame codec.
//!
//! Wire layout: a command line, `name:value` header lines, a blank line,
//! the body and a NUL byte. A `content-length` header, when present, fixes
//! the body size; otherwise the body runs to the first NUL. Bare newlines
//! between frames are heart-beats and are skipped.

use crate::error::BindError;
use crate::types::{Command, Frame};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Default cap on a single frame, headers and body together.
pub const DEFAULT_MAX_FRAME: usize = 4 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct StompCodec {
    max_frame: usize,
}

impl StompCodec {
    pub fn new() -> Self {
        Self::with_max_frame(DEFAULT_MAX_FRAME)
    }

    pub fn with_max_frame(max_frame: usize) -> Self {
        Self { max_frame }
    }
}

impl Default for StompCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, BindError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(BindError::InvalidFrame(format!(
                    "bad header escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

/// Locate the end of the header block.
///
/// Returns the header lines (without line endings) and the offset of the
/// first body byte.
fn split_head(buf: &[u8]) -> Option<(Vec<&[u8]>, usize)> {
    let mut lines = Vec::new();
    let mut start = 0;
    while let Some(rel) = buf[start..].iter().position(|&b| b == b'\n') {
        let end = start + rel;
        let line = buf[start..end].strip_suffix(b"\r").unwrap_or(&buf[start..end]);
        start = end + 1;
        if line.is_empty() {
            return Some((lines, start));
        }
        lines.push(line);
    }
    None
}

impl Decoder for StompCodec {
    type Item = Frame;
    type Error = BindError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, BindError> {
        // Heart-beats.
        let skip = src
            .iter()
            .take_while(|&&b| b == b'\n' || b == b'\r')
            .count();
        src.advance(skip);
        if src.is_empty() {
            return Ok(None);
        }

        let Some((lines, body_start)) = split_head(src) else {
            if src.len() > self.max_frame {
                return Err(BindError::FrameTooLarge { max: self.max_frame });
            }
            return Ok(None);
        };

        let (command_line, header_lines) = lines
            .split_first()
            .ok_or_else(|| BindError::InvalidFrame("missing command".into()))?;
        let command: Command = std::str::from_utf8(command_line)
            .map_err(|_| BindError::InvalidFrame("command is not UTF-8".into()))?
            .parse()?;

        let mut headers = Vec::with_capacity(header_lines.len());
        for line in header_lines {
            let line = std::str::from_utf8(line)
                .map_err(|_| BindError::InvalidFrame("header is not UTF-8".into()))?;
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| BindError::InvalidFrame(format!("header without colon: {line}")))?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| BindError::InvalidFrame(format!("bad content-length: {v}")))
            })
            .transpose()?;

        let body_len = match content_length {
            Some(len) => {
                if len > self.max_frame.saturating_sub(body_start) {
                    return Err(BindError::FrameTooLarge { max: self.max_frame });
                }
                // Bounded by max_frame above.
                let frame_end = body_start + len + 1;
                if src.len() < frame_end {
                    src.reserve(frame_end - src.len());
                    return Ok(None);
                }
                if src[body_start + len] != 0 {
                    return Err(BindError::InvalidFrame("body not NUL-terminated".into()));
                }
                len
            }
            None => match src[body_start..].iter().position(|&b| b == 0) {
                Some(len) => len,
                None => {
                    if src.len() > self.max_frame {
                        return Err(BindError::FrameTooLarge { max: self.max_frame });
                    }
                    return Ok(None);
                }
            },
        };

        let body = src[body_start..body_start + body_len].to_vec();
        src.advance(body_start + body_len + 1);

        Ok(Some(Frame {
            command,
            headers,
            body,
        }))
    }
}

impl Encoder<Frame> for StompCodec {
    type Error = BindError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), BindError> {
        let escapes = frame.command.escapes_headers();
        dst.put_slice(frame.command.as_str().as_bytes());
        dst.put_u8(b'\n');

        for (name, value) in &frame.headers {
            if escapes {
                dst.put_slice(escape(name).as_bytes());
                dst.put_u8(b':');
                dst.put_slice(escape(value).as_bytes());
            } else {
                dst.put_slice(name.as_bytes());
                dst.put_u8(b':');
                dst.put_slice(value.as_bytes());
            }
            dst.put_u8(b'\n');
        }
        if !frame.body.is_empty() && frame.header("content-length").is_none() {
            dst.put_slice(format!("content-length:{}\n", frame.body.len()).as_bytes());
        }

        dst.put_u8(b'\n');
        dst.put_slice(&frame.body);
        dst.put_u8(0);
        Ok(())
    }
}
