//! Fixed-window overlapping text chunker.
//!
//! Splits extracted document text into [`Chunk`]s of `chunk_size` characters
//! where each window starts `chunk_size − overlap` characters after the
//! previous one, so consecutive chunks share exactly `overlap` characters.
//! The final chunk may be shorter. All arithmetic is in characters, never
//! bytes; windows always fall on UTF-8 boundaries.
//!
//! Each chunk carries a SHA-256 hash of its text for citation identity.

use sha2::{Digest, Sha256};

use crate::error::PipelineError;
use crate::models::Chunk;

/// Lazy window iterator over `text`. Borrows the input; restart by calling
/// [`windows`] again. Callers must ensure `overlap < chunk_size`; [`split`]
/// validates this before constructing one.
pub struct Windows<'a> {
    text: &'a str,
    start: usize,
    chunk_size: usize,
    stride: usize,
}

/// Iterate fixed-size character windows over `text`.
pub fn windows(text: &str, chunk_size: usize, overlap: usize) -> Windows<'_> {
    debug_assert!(chunk_size > 0 && overlap < chunk_size);
    Windows {
        text,
        start: 0,
        chunk_size,
        stride: chunk_size - overlap,
    }
}

/// Byte offset of the `n`-th character of `s`, or `s.len()` past the end.
fn byte_offset_at(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

impl<'a> Iterator for Windows<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.start >= self.text.len() {
            return None;
        }
        let tail = &self.text[self.start..];
        let end = byte_offset_at(tail, self.chunk_size);
        let window = &tail[..end];
        if end == tail.len() {
            // Final window reaches the end of the text.
            self.start = self.text.len();
        } else {
            self.start += byte_offset_at(tail, self.stride);
        }
        Some(window)
    }
}

/// Split `text` into overlapping chunks tagged with `source_id`.
///
/// Empty text yields an empty sequence, not an error. `overlap >= chunk_size`
/// or `chunk_size == 0` fail with [`PipelineError::Config`].
pub fn split(
    source_id: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, PipelineError> {
    if chunk_size == 0 {
        return Err(PipelineError::Config("chunk_size must be > 0".to_string()));
    }
    if overlap >= chunk_size {
        return Err(PipelineError::Config(format!(
            "overlap ({}) must be smaller than chunk_size ({})",
            overlap, chunk_size
        )));
    }

    Ok(windows(text, chunk_size, overlap)
        .enumerate()
        .map(|(index, window)| Chunk {
            source_id: source_id.to_string(),
            sequence_index: index,
            overlap_with_previous: if index == 0 { 0 } else { overlap },
            hash: hash_text(window),
            text: window.to_string(),
        })
        .collect())
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Undo the overlap: first chunk whole, later chunks minus their shared
    /// prefix, concatenated, must equal the input.
    fn reconstruct(chunks: &[Chunk]) -> String {
        let mut out = String::new();
        for chunk in chunks {
            out.extend(chunk.text.chars().skip(chunk.overlap_with_previous));
        }
        out
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunks = split("doc1", "", 100, 20).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split("doc1", "Hello, world!", 100, 20).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].sequence_index, 0);
        assert_eq!(chunks[0].overlap_with_previous, 0);
    }

    #[test]
    fn overlap_equal_to_size_is_config_error() {
        let err = split("doc1", "some text", 10, 10).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn overlap_above_size_is_config_error() {
        let err = split("doc1", "some text", 10, 25).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn zero_chunk_size_is_config_error() {
        let err = split("doc1", "some text", 0, 0).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn consecutive_chunks_share_overlap_verbatim() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = split("doc1", text, 10, 4).unwrap();
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let prev_tail: String = pair[0]
                .text
                .chars()
                .skip(pair[0].text.chars().count() - 4)
                .collect();
            let next_head: String = pair[1].text.chars().take(4).collect();
            assert_eq!(prev_tail, next_head);
        }
    }

    #[test]
    fn roundtrip_reconstructs_original_text() {
        let text = "The quick brown fox jumps over the lazy dog, again and again and again.";
        for (size, overlap) in [(10, 3), (16, 8), (7, 0), (100, 10)] {
            let chunks = split("doc1", text, size, overlap).unwrap();
            assert_eq!(reconstruct(&chunks), text, "size={} overlap={}", size, overlap);
        }
    }

    #[test]
    fn roundtrip_with_multibyte_characters() {
        let text = "żółć jaźń überstraße 北京欢迎你 ¡hola señor! ";
        let chunks = split("doc1", text, 5, 2).unwrap();
        assert_eq!(reconstruct(&chunks), text);
        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(chunk.text.chars().count(), 5);
        }
    }

    #[test]
    fn indices_are_contiguous_from_zero() {
        let text = "x".repeat(95);
        let chunks = split("doc1", &text, 10, 5).unwrap();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence_index, i);
        }
    }

    #[test]
    fn window_iterator_is_restartable() {
        let text = "abcdefghij";
        let first: Vec<&str> = windows(text, 4, 1).collect();
        let second: Vec<&str> = windows(text, 4, 1).collect();
        assert_eq!(first, second);
        assert_eq!(first[0], "abcd");
    }

    #[test]
    fn chunks_are_deterministic() {
        let text = "Alpha beta gamma delta epsilon zeta eta theta.";
        let a = split("doc1", text, 12, 4).unwrap();
        let b = split("doc1", text, 12, 4).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].hash, b[0].hash);
    }
}
