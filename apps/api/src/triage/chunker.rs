//! Fixed-offset chunking for size-limited extraction calls.

use crate::triage::models::Chunk;

/// Default chunk size, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 2500;

/// Slices `text` into contiguous, non-overlapping chunks of at most `chunk_size` chars.
///
/// Chunk `i` covers chars `[i * chunk_size, (i + 1) * chunk_size)`. Slicing counts chars,
/// not bytes, so a chunk never splits a UTF-8 sequence. Joining the chunks in order
/// reproduces `text` exactly. A `chunk_size` of zero is treated as one.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start_byte = 0;
    let mut chars_in_chunk = 0;
    let mut char_offset = 0;

    for (byte_idx, _) in text.char_indices() {
        if chars_in_chunk == chunk_size {
            chunks.push(Chunk {
                index: chunks.len(),
                char_offset,
                text: text[start_byte..byte_idx].to_string(),
            });
            char_offset += chars_in_chunk;
            start_byte = byte_idx;
            chars_in_chunk = 0;
        }
        chars_in_chunk += 1;
    }

    if chars_in_chunk > 0 {
        chunks.push(Chunk {
            index: chunks.len(),
            char_offset,
            text: text[start_byte..].to_string(),
        });
    }

    chunks
}
