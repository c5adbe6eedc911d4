use super::types::Chunk;
use crate::config::DEFAULT_CHUNK_CHARS;

/// Fixed-window chunker for cleaned report text.
///
/// Windows are cut every `max_chars` characters (never inside a UTF-8 sequence),
/// so concatenating the chunks in order gives back the input exactly.
pub struct WindowChunker {
    max_chars: usize,
}

impl WindowChunker {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn chunk<'a>(&self, text: &'a str) -> Vec<Chunk<'a>> {
        chunk_text(text, self.max_chars)
    }
}

impl Default for WindowChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_CHARS)
    }
}

/// Split `text` into `ceil(chars / max_chars)` ordered windows, each borrowing
/// its neighbours' text for context. Empty text yields no chunks.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<Chunk<'_>> {
    if text.is_empty() {
        return Vec::new();
    }
    let max_chars = max_chars.max(1);

    let mut bounds = vec![0];
    for (n, (byte_idx, _)) in text.char_indices().enumerate() {
        if n > 0 && n % max_chars == 0 {
            bounds.push(byte_idx);
        }
    }
    bounds.push(text.len());

    let spans: Vec<&str> = bounds.windows(2).map(|w| &text[w[0]..w[1]]).collect();

    spans
        .iter()
        .enumerate()
        .map(|(index, span)| Chunk {
            index,
            text: span,
            previous: index.checked_sub(1).map(|p| spans[p]),
            next: spans.get(index + 1).copied(),
        })
        .collect()
}
