//! JSON message framing over a byte stream.
//!
//! Every message is written as one line of JSON followed by `\n`. The reader does not
//! rely on that terminator for objects: a frame that starts with `{` ends where the
//! object ends, so pretty-printed messages and peers that never send a terminator both
//! work. A terminator right after the object is consumed with it.
//!
//! Anything else is cut at `\n` (a trailing `\r` is stripped too). A line holding
//! nothing but a terminator comes out as an empty frame and it is up to the caller to
//! skip it.
//!
//! Incoming frames are bounded by `max_length`. A longer message is an error, never a
//! truncated frame.

use bytes::{Buf, Bytes, BytesMut};
use serde::de::IgnoredAny;
use std::cmp;
use tokio_util::codec::{Decoder, Encoder};

/// Default upper bound for a single message (64 KiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Message exceeds maximum size of {limit} bytes")]
    TooLarge { limit: usize },
}

#[derive(Debug, Clone)]
pub struct JsonLineCodec {
    max_length: usize,
    /// Bytes before this index are known not to contain a newline.
    next_index: usize,
}

impl JsonLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn too_large(&self) -> FrameError {
        FrameError::TooLarge {
            limit: self.max_length,
        }
    }
}

impl Default for JsonLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// What a scan for a JSON object at the start of a buffer found.
#[derive(Debug, PartialEq, Eq)]
enum Document {
    /// A complete object ending at this offset.
    Complete(usize),
    /// The object is not finished yet.
    Partial,
    /// The bytes can never become a valid object.
    Invalid,
}

/// Whether the buffer starts with an object, ignoring leading spaces and tabs.
fn starts_object(buf: &[u8]) -> bool {
    buf.iter()
        .find(|b| **b != b' ' && **b != b'\t')
        .is_some_and(|b| *b == b'{')
}

fn scan_document(buf: &[u8]) -> Document {
    let mut documents = serde_json::Deserializer::from_slice(buf).into_iter::<IgnoredAny>();
    match documents.next() {
        Some(Ok(_)) => Document::Complete(documents.byte_offset()),
        Some(Err(e)) if e.is_eof() => Document::Partial,
        Some(Err(_)) => Document::Invalid,
        None => Document::Partial,
    }
}

/// Length of a `[ \t]*\r?\n` terminator at the start of `buf`, if a whole one is there.
fn terminator_len(buf: &[u8]) -> Option<usize> {
    let mut i = buf.iter().take_while(|b| **b == b' ' || **b == b'\t').count();
    if buf.get(i) == Some(&b'\r') {
        i += 1;
    }
    (buf.get(i) == Some(&b'\n')).then_some(i + 1)
}

impl Decoder for JsonLineCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        let read_to = cmp::min(self.max_length.saturating_add(1), buf.len());

        let mut invalid_object = false;
        if starts_object(buf) {
            match scan_document(&buf[..read_to]) {
                Document::Complete(len) if len > self.max_length => return Err(self.too_large()),
                Document::Complete(len) => {
                    self.next_index = 0;
                    let frame = buf.split_to(len).freeze();
                    if let Some(terminator) = terminator_len(buf) {
                        buf.advance(terminator);
                    }
                    return Ok(Some(frame));
                }
                Document::Partial if buf.len() > self.max_length => return Err(self.too_large()),
                Document::Partial => return Ok(None),
                // Cut it at the newline like any other line so the caller can report it.
                Document::Invalid => invalid_object = true,
            }
        }

        if let Some(offset) = buf[self.next_index..read_to]
            .iter()
            .position(|b| *b == b'\n')
        {
            let end = self.next_index + offset;
            self.next_index = 0;

            let mut line = buf.split_to(end + 1);
            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(end - 1);
            }
            return Ok(Some(line.freeze()));
        }

        if buf.len() > self.max_length {
            return Err(self.too_large());
        }

        if invalid_object {
            self.next_index = 0;
            tracing::trace!("Handing over {} bytes of malformed object", buf.len());
            return Ok(Some(buf.split().freeze()));
        }

        self.next_index = read_to;
        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }

        self.next_index = 0;
        if buf.iter().all(u8::is_ascii_whitespace) {
            buf.clear();
            return Ok(None);
        }
        Ok(Some(buf.split().freeze()))
    }
}

impl<T: AsRef<[u8]>> Encoder<T> for JsonLineCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), std::io::Error> {
        let item = item.as_ref();
        dst.reserve(item.len() + 1);
        dst.extend_from_slice(item);
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}
