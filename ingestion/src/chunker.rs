use regex::Regex;
use once_cell::sync::Lazy;
use thiserror::Error;

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").unwrap());

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("chunk size must be > 0")]
    InvalidSize,
    #[error("overlap must be >= 0 and < size")]
    InvalidWindow,
}

/// A single chunk with its character offsets into the normalized source
/// text, before any encryption or embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Splits `text` into fixed-size character windows with trailing overlap.
/// Each window after the first starts `size - overlap` characters past the
/// previous window's start, so consecutive chunks repeat the tail of their
/// predecessor.
pub fn fixed_char_chunks(text: &str, size: usize, overlap: usize) -> Result<Vec<TextChunk>, ChunkError> {
    if size == 0 {
        return Err(ChunkError::InvalidSize);
    }
    if overlap >= size {
        return Err(ChunkError::InvalidWindow);
    }

    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut result = Vec::new();
    let mut start = 0usize;

    while start < n {
        let end = (start + size).min(n);
        let chunk_text: String = chars[start..end].iter().collect();
        result.push(TextChunk {
            start,
            end,
            text: chunk_text,
        });
        if end == n {
            break;
        }
        start = end - overlap;
    }

    Ok(result)
}

/// Splits `text` into windows of whitespace-delimited tokens with token
/// overlap. If the final window falls below `min_tokens` and a prior
/// window exists, it is merged into that prior window rather than kept as
/// an undersized tail.
pub fn token_window_chunks(
    text: &str,
    target_tokens: usize,
    min_tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<TextChunk>, ChunkError> {
    if target_tokens == 0 {
        return Err(ChunkError::InvalidSize);
    }
    if overlap_tokens >= target_tokens {
        return Err(ChunkError::InvalidWindow);
    }

    if text.is_empty() {
        return Ok(Vec::new());
    }

    let tokens: Vec<(usize, usize)> = TOKEN_PATTERN
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();
    let n_tokens = tokens.len();
    if n_tokens == 0 {
        return Ok(Vec::new());
    }

    let step = (target_tokens - overlap_tokens).max(1);
    let mut chunks: Vec<TextChunk> = Vec::new();
    let mut i = 0usize;

    loop {
        let j = (i + target_tokens).min(n_tokens);
        let start_char = tokens[i].0;
        let end_char = tokens[j - 1].1;
        chunks.push(TextChunk {
            start: start_char,
            end: end_char,
            text: text[start_char..end_char].to_string(),
        });
        if j >= n_tokens {
            break;
        }
        i += step;
    }

    if chunks.len() >= 2 {
        let last_tokens = TOKEN_PATTERN.find_iter(&chunks[chunks.len() - 1].text).count();
        if last_tokens < min_tokens.max(1) {
            let prev_start = chunks[chunks.len() - 2].start;
            let last_end = chunks[chunks.len() - 1].end;
            let merged = TextChunk {
                start: prev_start,
                end: last_end,
                text: text[prev_start..last_end].to_string(),
            };
            let merge_index = chunks.len() - 2;
            chunks.truncate(merge_index);
            chunks.push(merged);
        }
    }

    Ok(chunks)
}
