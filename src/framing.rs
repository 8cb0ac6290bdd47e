//! Byte-level framing of envelopes on a shared stream
//!
//! Two interchangeable strategies are supported: newline-delimited JSON and the
//! legacy `Content-Length` header blocks. The strategy is picked once and the
//! same value drives both decoding and encoding.

use std::str::FromStr;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{trace, warn};

const CONTENT_LENGTH_HEADER: &str = "content-length";

/// Declared bodies above this size are discarded along with their header.
pub const MAX_FRAME_BODY_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    #[default]
    LineDelimited,
    LengthPrefixed,
}

#[derive(Debug, Error)]
#[error("unknown framing `{0}`, expected one of: line, length-prefixed")]
pub struct UnknownFraming(String);

impl FromStr for Framing {
    type Err = UnknownFraming;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "line" | "ndjson" | "line-delimited" => Ok(Self::LineDelimited),
            "length-prefixed" | "content-length" => Ok(Self::LengthPrefixed),
            other => Err(UnknownFraming(other.to_string())),
        }
    }
}

impl Framing {
    pub fn decoder(self) -> FrameDecoder {
        FrameDecoder {
            framing: self,
            buffer: Vec::new(),
        }
    }

    pub fn encode<T: Serialize>(self, message: &T) -> Result<Vec<u8>, serde_json::Error> {
        let body = serde_json::to_vec(message)?;
        let mut frame = match self {
            Self::LineDelimited => Vec::with_capacity(body.len() + 1),
            Self::LengthPrefixed => {
                let mut frame = Vec::with_capacity(body.len() + 32);
                frame.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
                frame
            }
        };
        frame.extend_from_slice(&body);
        if self == Self::LineDelimited {
            frame.push(b'\n');
        }
        Ok(frame)
    }
}

/// Incremental decoder holding bytes that do not yet form a complete frame.
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Feeds a chunk and returns every message completed by it.
    ///
    /// Frames that fail to parse are logged and dropped; no `id` can be
    /// recovered from them so there is nothing to answer.
    pub fn decode<T: DeserializeOwned>(&mut self, chunk: &[u8]) -> Vec<T> {
        self.buffer.extend_from_slice(chunk);
        let mut messages = Vec::new();

        match self.framing {
            Framing::LineDelimited => {
                while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
                    let line: Vec<u8> = self.buffer.drain(..=newline).collect();
                    if let Some(message) = parse_line(&line) {
                        messages.push(message);
                    }
                }
            }
            Framing::LengthPrefixed => {
                while let Some(frame) = self.next_length_prefixed_frame() {
                    if let Some(message) = parse_frame(&frame) {
                        messages.push(message);
                    }
                }
            }
        }

        messages
    }

    /// Flushes a trailing unterminated line once the input is closed.
    pub fn finish<T: DeserializeOwned>(&mut self) -> Option<T> {
        let remainder = std::mem::take(&mut self.buffer);
        match self.framing {
            Framing::LineDelimited => parse_line(&remainder),
            Framing::LengthPrefixed => {
                if !remainder.iter().all(u8::is_ascii_whitespace) {
                    warn!(
                        pending_bytes = remainder.len(),
                        "input closed with an incomplete length-prefixed frame"
                    );
                }
                None
            }
        }
    }

    fn next_length_prefixed_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            let (header_end, separator_len) = find_header_end(&self.buffer)?;
            let header = String::from_utf8_lossy(&self.buffer[..header_end]).into_owned();

            let Some(body_len) = parse_content_length(&header) else {
                warn!(header = %header.trim(), "discarding frame header without a valid Content-Length");
                self.buffer.drain(..header_end + separator_len);
                continue;
            };

            let body_start = header_end + separator_len;
            let frame_end = match body_start.checked_add(body_len) {
                Some(frame_end) if body_len <= MAX_FRAME_BODY_LEN => frame_end,
                _ => {
                    warn!(
                        content_length = body_len,
                        max = MAX_FRAME_BODY_LEN,
                        "discarding frame header with an oversized Content-Length"
                    );
                    self.buffer.drain(..body_start);
                    continue;
                }
            };
            if self.buffer.len() < frame_end {
                return None;
            }

            let frame: Vec<u8> = self.buffer.drain(..frame_end).skip(body_start).collect();
            return Some(frame);
        }
    }
}

fn parse_line<T: DeserializeOwned>(line: &[u8]) -> Option<T> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }

    trace!(len = trimmed.len(), "read message");
    match serde_json::from_slice(trimmed) {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(error = %err, len = trimmed.len(), "dropping unparseable message");
            None
        }
    }
}

fn parse_frame<T: DeserializeOwned>(body: &[u8]) -> Option<T> {
    trace!(len = body.len(), "read message");
    match serde_json::from_slice(body) {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(error = %err, len = body.len(), "dropping unparseable message");
            None
        }
    }
}

/// Position of the blank line ending a header block and the separator width.
fn find_header_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let crlf = buffer.windows(4).position(|window| window == b"\r\n\r\n");
    let lf = buffer.windows(2).position(|window| window == b"\n\n");

    match (crlf, lf) {
        (Some(crlf), Some(lf)) if lf < crlf => Some((lf, 2)),
        (Some(crlf), _) => Some((crlf, 4)),
        (None, Some(lf)) => Some((lf, 2)),
        (None, None) => None,
    }
}

fn parse_content_length(header: &str) -> Option<usize> {
    header.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH_HEADER) {
            value.trim().parse::<usize>().ok()
        } else {
            None
        }
    })
}
