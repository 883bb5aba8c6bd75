//! Line-oriented splitting of long documents into token-bounded chunks.

use crate::tokens;
use nbpipe_core::{Error, Result};

/// Smallest accepted per-chunk token limit.
pub const MIN_TOKEN_LIMIT: usize = 1;

/// Split `text` into chunks whose estimated size stays within `token_limit`.
///
/// Lines are kept whole and in order. Each line after the first in a chunk costs one extra
/// token for its terminator. A line that alone exceeds the limit flushes the current chunk and
/// is cut into `floor(limit * 0.9 * 4)`-character pieces, each emitted as its own chunk. Joining
/// the result with `\n` reproduces `text` whenever no line had to be cut.
pub fn chunk(text: &str, token_limit: usize) -> Result<Vec<String>> {
    if token_limit < MIN_TOKEN_LIMIT {
        return Err(Error::InvalidInput(format!(
            "token limit must be at least {MIN_TOKEN_LIMIT}, got {token_limit}"
        )));
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let piece_chars = piece_chars(token_limit);
    let mut chunks = Vec::new();
    let mut current: Option<String> = None;
    let mut current_tokens = 0usize;

    for line in text.split('\n') {
        let line_tokens = tokens::estimate(line);
        if line_tokens > token_limit {
            chunks.extend(current.take());
            current_tokens = 0;
            chunks.extend(split_chars(line, piece_chars));
            continue;
        }
        current = Some(match current.take() {
            Some(mut c) if current_tokens + line_tokens + 1 <= token_limit => {
                c.push('\n');
                c.push_str(line);
                current_tokens += line_tokens + 1;
                c
            }
            Some(full) => {
                chunks.push(full);
                current_tokens = line_tokens;
                line.to_string()
            }
            None => {
                current_tokens = line_tokens;
                line.to_string()
            }
        });
    }
    chunks.extend(current);
    Ok(chunks)
}

/// Piece width for oversized lines: 90% of the limit, in characters. Never zero.
pub fn piece_chars(token_limit: usize) -> usize {
    (token_limit.saturating_mul(tokens::CHARS_PER_TOKEN * 9) / 10).max(1)
}

fn split_chars(line: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    chars.chunks(width).map(|c| c.iter().collect()).collect()
}

/// Prefix each chunk with its `--- PART i OF n ---` header (1-based).
pub fn with_part_headers(chunks: &[String]) -> Vec<String> {
    let n = chunks.len();
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("--- PART {} OF {n} ---\n\n{c}", i + 1))
        .collect()
}
