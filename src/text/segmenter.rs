//! Splits long text into bounded chunks, preferring sentence boundaries.

use serde::{Deserialize, Serialize};

/// Characters that end a sentence: Latin, Urdu (`۔ ؟`) and Devanagari (`।`).
pub const SENTENCE_TERMINATORS: [char; 6] = ['.', '!', '?', '۔', '؟', '।'];

/// A bounded, ordered piece of a request's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    /// Position in the original text, starting at 0.
    pub index: usize,
}

fn is_terminator(c: char) -> bool {
    SENTENCE_TERMINATORS.contains(&c)
}

/// Split `text` into chunks of at most `max_chunk_chars` characters.
///
/// Each window is cut after the last sentence terminator inside it; failing
/// that, at the last whitespace; failing that, hard at the window size.
/// Chunks are trimmed and whitespace-only chunks are dropped, so the
/// concatenation of all chunks plus the trimmed whitespace is the input.
///
/// ```rust
/// use voice_clone::text::segment;
///
/// let chunks = segment("One. Two. Three.", 10);
/// let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
/// assert_eq!(texts, ["One. Two.", "Three."]);
/// ```
pub fn segment(text: &str, max_chunk_chars: usize) -> Vec<TextChunk> {
    let max = max_chunk_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let end = (pos + max).min(chars.len());
        let cut = if end == chars.len() {
            end
        } else {
            find_cut(&chars, pos, end)
        };

        let piece: String = chars[pos..cut].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            chunks.push(TextChunk {
                text: trimmed.to_string(),
                index: chunks.len(),
            });
        }
        pos = cut;
    }
    chunks
}

/// Cut position for the window `chars[start..end]`, with `end < chars.len()`.
fn find_cut(chars: &[char], start: usize, end: usize) -> usize {
    // A terminator at the window start would cut a lone punctuation chunk.
    if let Some(i) = (start + 1..end).rev().find(|&i| is_terminator(chars[i])) {
        return i + 1;
    }
    // A space right after the window lets the whole window through.
    if let Some(i) = (start + 1..=end).rev().find(|&i| chars[i].is_whitespace()) {
        return i;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(chunks: &[TextChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    fn squash(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = segment("  Hello world.  ", 200);
        assert_eq!(texts(&chunks), ["Hello world."]);
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn prefers_sentence_boundaries() {
        let chunks = segment("The cat sat. The dog ran far away. End.", 25);
        assert_eq!(texts(&chunks), ["The cat sat.", "The dog ran far away.", "End."]);
        let idx: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(idx, [0, 1, 2]);
    }

    #[test]
    fn urdu_and_hindi_terminators() {
        let chunks = segment("یہ پہلا جملہ ہے۔ یہ دوسرا ہے؟", 20);
        assert_eq!(chunks[0].text, "یہ پہلا جملہ ہے۔");

        let chunks = segment("यह पहला वाक्य है। दूसरा", 20);
        assert_eq!(chunks[0].text, "यह पहला वाक्य है।");
    }

    #[test]
    fn falls_back_to_whitespace_then_hard_cut() {
        let chunks = segment("alpha beta gamma", 12);
        assert_eq!(texts(&chunks), ["alpha beta", "gamma"]);

        let chunks = segment("abcdefghij", 4);
        assert_eq!(texts(&chunks), ["abcd", "efgh", "ij"]);
    }

    #[test]
    fn leading_terminator_does_not_become_its_own_chunk() {
        let chunks = segment("?abcdefg", 4);
        assert_eq!(texts(&chunks), ["?abc", "defg"]);

        let chunks = segment("Hi.!Wow there", 6);
        assert_eq!(texts(&chunks), ["Hi.!", "Wow", "there"]);
    }

    #[test]
    fn whitespace_only_input_yields_nothing() {
        assert!(segment("   \n\t ", 5).is_empty());
        assert!(segment("", 5).is_empty());
    }

    #[test]
    fn chunks_respect_size_and_preserve_content() {
        let text = "Rust is fast. It is also safe! Is it fun? Yes. \
                    Averyveryverylongwordwithoutanybreaksatall and more words here.";
        for max in [5, 8, 13, 21, 40, 500] {
            let chunks = segment(text, max);
            for c in &chunks {
                assert!(c.text.chars().count() <= max, "{max}: {:?}", c.text);
            }
            let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
            assert_eq!(squash(&joined), squash(text), "max {max}");
        }
    }

    #[test]
    fn multibyte_sizes_count_characters() {
        let text = "ہہہہہہ";
        let chunks = segment(text, 3);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.text.chars().count() == 3));
    }
}
