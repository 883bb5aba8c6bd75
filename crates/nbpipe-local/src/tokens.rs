//! Token estimation.
//!
//! This is an approximation (about four characters per token for English text), not a
//! tokenizer. Use it for sizing decisions, never as an exact count.

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// `ceil(chars / 4)`; zero for empty text.
pub fn estimate(text: &str) -> usize {
    estimate_chars(text.chars().count())
}

pub fn estimate_chars(chars: usize) -> usize {
    chars.div_ceil(CHARS_PER_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate(""), 0);
        assert_eq!(estimate("a"), 1);
        assert_eq!(estimate("abcd"), 1);
        assert_eq!(estimate("abcde"), 2);
    }

    #[test]
    fn estimate_counts_chars_not_bytes() {
        // Four multi-byte chars are still one token.
        assert_eq!(estimate("ααββ"), 1);
    }
}
