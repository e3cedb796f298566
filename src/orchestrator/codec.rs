//! Line codec for child-process output.
//!
//! Scripts print arbitrary text, so unlike a strict
//! [`tokio_util::codec::LinesCodec`] this decoder never fails on content:
//!
//! - invalid UTF-8 is replaced lossily,
//! - a trailing `\r` is stripped,
//! - a line longer than [`MAX_LINE_BYTES`] is emitted in
//!   [`MAX_LINE_BYTES`]-sized pieces instead of being buffered without bound,
//! - an unterminated final line is emitted at EOF.
//!
//! Only I/O errors on the underlying stream surface as [`AppError::Io`].

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::{AppError, Result};

/// Maximum bytes buffered for a single output line: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Lossy newline-delimited decoder for script output.
#[derive(Debug, Default)]
pub struct LogLineCodec {
    /// Bytes of the buffer already searched for a newline.
    next_index: usize,
}

impl LogLineCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LogLineCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let newline = src[self.next_index..].iter().position(|b| *b == b'\n');

        match newline {
            Some(offset) if self.next_index + offset <= MAX_LINE_BYTES => {
                let end = self.next_index + offset;
                self.next_index = 0;
                let line = src.split_to(end + 1);
                Ok(Some(to_text(&line[..end])))
            }
            _ if src.len() >= MAX_LINE_BYTES => {
                warn!(limit = MAX_LINE_BYTES, "output line exceeds limit, splitting");
                self.next_index = 0;
                let piece = src.split_to(MAX_LINE_BYTES);
                Ok(Some(to_text(&piece)))
            }
            _ => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split_to(src.len());
        Ok(Some(to_text(&rest)))
    }
}

fn to_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
