//! Fixed-size overlapping text chunker

use crate::error::{CasefileError, Result};

/// Split `text` into windows of `chunk_size` characters, each starting
/// `chunk_size - overlap` characters after the previous one.
///
/// Sizes are counted in `char`s so multi-byte text is never split inside a
/// code point. The final chunk may be shorter than `chunk_size`, and empty
/// text produces no chunks at all.
///
/// # Errors
/// `InvalidChunking` unless `chunk_size > overlap`.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    validate_params(chunk_size, overlap)?;

    // Byte offset of every char, plus the end of the string
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;
    let step = chunk_size - overlap;

    let mut chunks = Vec::with_capacity(char_count.div_ceil(step));
    let mut start = 0;
    while start < char_count {
        let end = (start + chunk_size).min(char_count);
        chunks.push(text[boundaries[start]..boundaries[end]].to_string());
        start += step;
    }

    Ok(chunks)
}

/// Check that a chunk window always advances
pub fn validate_params(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(CasefileError::InvalidChunking {
            chunk_size,
            overlap,
        });
    }
    Ok(())
}
