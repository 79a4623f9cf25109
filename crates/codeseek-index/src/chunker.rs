//! Fixed-size overlapping character windows.

/// Chunk sizing, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    #[must_use]
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> ChunkerConfig {
        self.config
    }

    #[must_use]
    pub fn split(&self, text: &str) -> Vec<String> {
        split(text, self.config.chunk_size, self.config.overlap)
    }
}

/// Split `text` into windows of `chunk_size` characters, each starting
/// `chunk_size - overlap` characters after the previous one.
///
/// The walk stops at the first window that reaches the end of the text, so the
/// last chunk may be shorter and no chunk is fully contained in its predecessor.
#[must_use]
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let chunk_size = chunk_size.max(1);
    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rebuild the source from chunk 0 plus the non-overlapping tail of every later chunk.
    fn reconstruct(chunks: &[String], chunk_size: usize, overlap: usize) -> String {
        let chunk_size = chunk_size.max(1);
        let shared = chunk_size - chunk_size.saturating_sub(overlap).max(1);
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(chunk);
            } else {
                out.extend(chunk.chars().skip(shared));
            }
        }
        out
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split("", 1000, 200).is_empty());
    }

    #[test]
    fn short_input_is_single_chunk() {
        assert_eq!(split("hello", 1000, 200), vec!["hello"]);
    }

    #[test]
    fn exactly_chunk_size_is_single_chunk() {
        let text = "a".repeat(1000);
        assert_eq!(split(&text, 1000, 200).len(), 1);
    }

    #[test]
    fn twenty_five_hundred_chars_make_three_chunks() {
        let text: String = (0..2500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = split(&text, 1000, 200);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 1000);
        assert_eq!(chunks[1].chars().count(), 1000);
        assert_eq!(chunks[2].chars().count(), 900);
        assert_eq!(&chunks[0][800..], &chunks[1][..200]);
        assert_eq!(&chunks[1][800..], &chunks[2][..200]);
    }

    #[test]
    fn overlap_without_trailing_duplicate() {
        assert_eq!(split("abcdefghij", 5, 0), vec!["abcde", "fghij"]);
        assert_eq!(split("abcdefg", 4, 2), vec!["abcd", "cdef", "efg"]);
    }

    #[test]
    fn overlap_not_smaller_than_size_still_progresses() {
        let chunks = split("abcde", 3, 3);
        assert_eq!(chunks, vec!["abc", "bcd", "cde"]);
    }

    #[test]
    fn multibyte_chars_are_counted_as_chars() {
        let chunks = split("ééééé", 2, 1);
        assert_eq!(chunks, vec!["éé", "éé", "éé", "éé"]);
    }

    #[test]
    fn chunker_uses_config() {
        let chunker = Chunker::new(ChunkerConfig {
            chunk_size: 4,
            overlap: 1,
        });
        assert_eq!(chunker.split("abcdefg"), vec!["abcd", "defg"]);
        assert_eq!(Chunker::default().config(), ChunkerConfig::default());
    }

    mod proptest_chunker {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(500))]

            #[test]
            fn reconstructs_input(
                text in "\\PC{0,3000}",
                chunk_size in 1usize..400,
                overlap in 0usize..500,
            ) {
                let chunks = split(&text, chunk_size, overlap);
                prop_assert_eq!(reconstruct(&chunks, chunk_size, overlap), text);
            }

            #[test]
            fn deterministic(
                text in "[a-z \\n]{0,2000}",
                chunk_size in 1usize..300,
                overlap in 0usize..300,
            ) {
                prop_assert_eq!(
                    split(&text, chunk_size, overlap),
                    split(&text, chunk_size, overlap)
                );
            }

            #[test]
            fn chunks_bounded_and_non_empty(
                text in "[a-z]{1,2000}",
                chunk_size in 1usize..300,
                overlap in 0usize..300,
            ) {
                for chunk in split(&text, chunk_size, overlap) {
                    let n = chunk.chars().count();
                    prop_assert!(n > 0 && n <= chunk_size);
                }
            }
        }
    }
}
