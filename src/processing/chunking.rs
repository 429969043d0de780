//! Length-bounded slicing of extracted text.
//!
//! Chunks are measured in characters (Unicode scalar values), never split a code point, and
//! partition the input exactly: concatenating them in order reproduces the source. There is
//! no sentence or paragraph awareness; the map prompt tolerates cuts mid-sentence.

use super::types::{Chunk, ChunkingError};

/// Split `text` into consecutive, non-overlapping chunks of at most `max_chars` characters.
///
/// Only the final chunk may be shorter. Empty input yields an empty vector; callers treat
/// that as an input error before reaching this point.
pub fn chunk_text(text: &str, max_chars: usize) -> Result<Vec<Chunk>, ChunkingError> {
    if max_chars == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }

    let mut chunks = Vec::with_capacity(text.len() / max_chars + 1);
    let mut start_byte = 0;
    let mut start_char = 0;
    let mut chars_in_chunk = 0;

    for (byte_index, _) in text.char_indices() {
        if chars_in_chunk == max_chars {
            chunks.push(Chunk {
                index: chunks.len(),
                char_offset: start_char,
                text: text[start_byte..byte_index].to_string(),
            });
            start_byte = byte_index;
            start_char += chars_in_chunk;
            chars_in_chunk = 0;
        }
        chars_in_chunk += 1;
    }

    if start_byte < text.len() {
        chunks.push(Chunk {
            index: chunks.len(),
            char_offset: start_char,
            text: text[start_byte..].to_string(),
        });
    }

    Ok(chunks)
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Character count of `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
