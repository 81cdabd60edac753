//! Message framing for JSON-RPC over byte streams
//!
//! Two conventions are supported:
//!
//! - **Newline**: one JSON object per line, terminated by `\n` (tool servers).
//! - **Content-Length**: HTTP-style header block, same as LSP:
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <message-body>
//! ```
//!
//! Decoding never blocks and never fails: an incomplete frame simply stays
//! buffered until more bytes arrive.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Wire framing used on a connection. Fixed for the connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FramingMode {
    /// Newline-delimited JSON
    Newline,
    /// `Content-Length` header-prefixed JSON
    ContentLength,
}

impl fmt::Display for FramingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Newline => write!(f, "newline"),
            Self::ContentLength => write!(f, "content-length"),
        }
    }
}

impl FromStr for FramingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newline" | "ndjson" | "line" => Ok(Self::Newline),
            "content-length" | "content_length" | "lsp" => Ok(Self::ContentLength),
            other => Err(format!(
                "unknown framing '{}', expected 'newline' or 'content-length'",
                other
            )),
        }
    }
}

/// Frame a serialized JSON payload for the wire.
///
/// The Content-Length header counts UTF-8 bytes, not characters.
pub fn encode_frame(mode: FramingMode, payload: &str) -> Vec<u8> {
    let body = payload.as_bytes();
    match mode {
        FramingMode::Newline => {
            let mut frame = Vec::with_capacity(body.len() + 1);
            frame.extend_from_slice(body);
            frame.push(b'\n');
            frame
        }
        FramingMode::ContentLength => {
            let header = format!("Content-Length: {}\r\n\r\n", body.len());
            let mut frame = Vec::with_capacity(header.len() + body.len());
            frame.extend_from_slice(header.as_bytes());
            frame.extend_from_slice(body);
            frame
        }
    }
}

/// Extract every complete payload from `buffer`.
///
/// Returns the payloads in stream order and the number of leading bytes
/// they consumed. Bytes past that offset are an incomplete frame.
pub fn decode_frames(mode: FramingMode, buffer: &[u8]) -> (Vec<Vec<u8>>, usize) {
    match mode {
        FramingMode::Newline => decode_lines(buffer),
        FramingMode::ContentLength => decode_content_length(buffer),
    }
}

fn decode_lines(buffer: &[u8]) -> (Vec<Vec<u8>>, usize) {
    let mut payloads = Vec::new();
    let mut consumed = 0;

    while let Some(offset) = buffer[consumed..].iter().position(|&b| b == b'\n') {
        let line = buffer[consumed..consumed + offset].trim_ascii();
        if !line.is_empty() {
            payloads.push(line.to_vec());
        }
        consumed += offset + 1;
    }

    (payloads, consumed)
}

fn decode_content_length(buffer: &[u8]) -> (Vec<Vec<u8>>, usize) {
    let mut payloads = Vec::new();
    let mut consumed = 0;

    loop {
        let rest = &buffer[consumed..];
        let Some(header_end) = find_subslice(rest, HEADER_TERMINATOR) else {
            break;
        };
        // A header block without a usable length is treated as not yet complete.
        let Some(content_length) = parse_content_length(&rest[..header_end]) else {
            break;
        };
        let body_start = header_end + HEADER_TERMINATOR.len();
        let frame_end = body_start + content_length;
        if rest.len() < frame_end {
            break;
        }

        payloads.push(rest[body_start..frame_end].to_vec());
        consumed += frame_end;
    }

    (payloads, consumed)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse `Content-Length` from a header block (case-insensitive per HTTP).
/// Other headers such as `Content-Type` are ignored.
fn parse_content_length(header_block: &[u8]) -> Option<usize> {
    let headers = std::str::from_utf8(header_block).ok()?;
    headers.split("\r\n").find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case("Content-Length") {
            value.trim().parse::<usize>().ok()
        } else {
            None
        }
    })
}

/// Incremental decoder holding the accumulation buffer for one stream.
///
/// Owned by a single reader; chunks may be split at any byte, including
/// inside a header or a multi-byte UTF-8 sequence.
#[derive(Debug)]
pub struct FrameDecoder {
    mode: FramingMode,
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder for the given framing
    pub fn new(mode: FramingMode) -> Self {
        Self {
            mode,
            buffer: Vec::new(),
        }
    }

    /// Framing this decoder was created with
    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    /// Append a chunk and return every payload it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let (payloads, consumed) = decode_frames(self.mode, &self.buffer);
        self.buffer.drain(..consumed);
        payloads
    }

    /// Bytes held back as an incomplete frame
    pub fn remainder(&self) -> &[u8] {
        &self.buffer
    }
}
