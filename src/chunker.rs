//! Word-window chunker.
//!
//! Splits extracted text into overlapping windows of whitespace-separated
//! words. Punctuation stays attached to the word it was written against.

/// Split `text` into windows of `chunk_size` words, each starting
/// `max(1, chunk_size - overlap)` words after the previous one.
///
/// The last window may be shorter than `chunk_size`. Blank input yields no
/// chunks. A `chunk_size` of zero is treated as one.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let chunk_size = chunk_size.max(1);
    let step = chunk_size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::with_capacity(expected_chunks(words.len(), chunk_size, step));
    let mut start = 0;
    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        // The window already reached the end; later starts would only repeat its tail.
        if end == words.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn expected_chunks(word_count: usize, chunk_size: usize, step: usize) -> usize {
    if word_count <= chunk_size {
        1
    } else {
        (word_count - chunk_size).div_ceil(step) + 1
    }
}
