//! Inbound decode transform.
//!
//! Each inbound byte block becomes one [`DecodedChunk`]. The UTF-8 decoder is
//! streaming: a multi-byte sequence split across two blocks is held back and
//! completed by the next block of the same transform. A transform is
//! single-use; the read loop builds a fresh one (and with it a fresh decoder)
//! for every pipeline.

use serde::{Deserialize, Serialize};

/// Replacement emitted for invalid or truncated UTF-8 sequences.
const REPLACEMENT: char = '\u{FFFD}';

/// One emission of the decode transform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedChunk {
    /// Text decoded from the block (may be empty when the block only carried
    /// the start of a multi-byte sequence).
    pub value: Option<String>,
    /// The bytes exactly as they arrived.
    pub raw: Option<Vec<u8>>,
}

impl DecodedChunk {
    /// The decoded text, or `""` when the chunk carries none.
    pub fn text(&self) -> &str {
        self.value.as_deref().unwrap_or_default()
    }
}

/// Streaming UTF-8 decoder that carries incomplete sequences across blocks.
#[derive(Debug, Default, Clone)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `block`, prefixed by whatever the previous block left pending.
    ///
    /// Invalid sequences become U+FFFD. An incomplete sequence at the very
    /// end is kept for the next call instead.
    pub fn decode(&mut self, block: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(block);

        let mut text = String::with_capacity(input.len());
        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    // `valid_up_to` marks a verified prefix, this cannot fail.
                    text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(len) => {
                            text.push(REPLACEMENT);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        text
    }

    /// Whether bytes of an incomplete sequence are being held back.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// End the stream: an incomplete trailing sequence becomes U+FFFD.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        self.pending.clear();
        Some(REPLACEMENT.to_string())
    }
}

/// Single-use transform from inbound byte blocks to decoded chunks.
#[derive(Debug, Default)]
pub struct DecodeTransform {
    decoder: Utf8StreamDecoder,
}

impl DecodeTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one block, keeping the raw bytes alongside the text.
    pub fn transform(&mut self, block: &[u8]) -> DecodedChunk {
        DecodedChunk {
            value: Some(self.decoder.decode(block)),
            raw: Some(block.to_vec()),
        }
    }

    /// Called once at end-of-stream. Emits a final chunk only when a
    /// truncated sequence was pending; its raw bytes were already reported
    /// with the blocks they arrived in.
    pub fn flush(&mut self) -> Option<DecodedChunk> {
        self.decoder.finish().map(|tail| DecodedChunk {
            value: Some(tail),
            raw: None,
        })
    }
}
