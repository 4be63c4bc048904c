//! Streaming decoders for shard bodies
//!
//! Both decoders are push-based: feed them chunks as they arrive and they hand
//! back whatever output is complete, keeping partial state between calls.

use crate::error::{Result, SyncError};
use flate2::write::GzDecoder;
use std::io::Write;

/// Incremental gzip decompression.
pub struct GzipChunkDecoder {
    inner: GzDecoder<Vec<u8>>,
}

impl GzipChunkDecoder {
    pub fn new() -> Self {
        Self {
            inner: GzDecoder::new(Vec::new()),
        }
    }

    /// Feed compressed bytes, get back the bytes decompressed so far.
    pub fn push(&mut self, compressed: &[u8]) -> Result<Vec<u8>> {
        self.inner
            .write_all(compressed)
            .map_err(|e| SyncError::parse("gzip stream", e))?;
        Ok(std::mem::take(self.inner.get_mut()))
    }

    /// Flush the decoder at end of input.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.inner
            .try_finish()
            .map_err(|e| SyncError::parse("gzip stream", e))?;
        Ok(std::mem::take(self.inner.get_mut()))
    }
}

impl Default for GzipChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

const BOM: char = '\u{FEFF}';

/// Incremental UTF-8 decoding.
///
/// A multi-byte sequence split across chunks is held back until its remaining
/// bytes arrive. Invalid sequences become U+FFFD and a leading byte order mark
/// is dropped.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
    started: bool,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    break;
                },
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));

                    match e.error_len() {
                        // truncated sequence at the end, wait for more bytes
                        None => {
                            self.pending.drain(..valid_up_to);
                            break;
                        },
                        Some(invalid_len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + invalid_len);
                        },
                    }
                },
            }
        }

        self.strip_bom(text)
    }

    /// End of input. Leftover bytes of an unfinished sequence become U+FFFD.
    pub fn finish(mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        self.strip_bom(char::REPLACEMENT_CHARACTER.to_string())
    }

    fn strip_bom(&mut self, text: String) -> String {
        if self.started || text.is_empty() {
            return text;
        }
        self.started = true;
        match text.strip_prefix(BOM) {
            Some(rest) => rest.to_string(),
            None => text,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn gzip(content: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_gzip_in_small_chunks() {
        let original = "id,code\n1,A\n2,B\n".repeat(200);
        let compressed = gzip(original.as_bytes());

        let mut decoder = GzipChunkDecoder::new();
        let mut output = Vec::new();
        for chunk in compressed.chunks(7) {
            output.extend(decoder.push(chunk).unwrap());
        }
        output.extend(decoder.finish().unwrap());

        assert_eq!(output, original.as_bytes());
    }

    #[test]
    fn test_gzip_rejects_plain_text() {
        let mut decoder = GzipChunkDecoder::new();
        let result = decoder.push(b"this is definitely not a gzip member header");
        assert!(matches!(result, Err(SyncError::Parse { .. })));
    }

    #[test]
    fn test_utf8_split_multibyte() {
        // "Ärztlich" starts with a two-byte sequence; split it across chunks
        let bytes = "Ärztlich, Größe".as_bytes();
        let mut decoder = Utf8ChunkDecoder::new();

        let mut text = decoder.push(&bytes[..1]);
        assert_eq!(text, "");
        for byte in &bytes[1..] {
            text.push_str(&decoder.push(std::slice::from_ref(byte)));
        }
        text.push_str(&decoder.finish());

        assert_eq!(text, "Ärztlich, Größe");
    }

    #[test]
    fn test_utf8_invalid_bytes_replaced() {
        let mut decoder = Utf8ChunkDecoder::new();
        let text = decoder.push(b"ab\xffcd");
        assert_eq!(text, "ab\u{FFFD}cd");
    }

    #[test]
    fn test_utf8_truncated_tail_at_end() {
        let mut decoder = Utf8ChunkDecoder::new();
        assert_eq!(decoder.push(b"ok\xc3"), "ok");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn test_utf8_strips_leading_bom_only() {
        let mut decoder = Utf8ChunkDecoder::new();
        let bom = "\u{FEFF}".as_bytes();

        assert_eq!(decoder.push(&bom[..2]), "");
        assert_eq!(decoder.push(&bom[2..]), "");
        assert_eq!(decoder.push(b"id"), "id");
        assert_eq!(decoder.push("\u{FEFF}x".as_bytes()), "\u{FEFF}x");
    }
}
