use text_splitter::{Characters, ChunkConfig, TextSplitter};

/// Splits documents into chunks of at most `max_characters`, preferring
/// semantic boundaries (paragraphs, sentences, words).
pub(crate) struct Chunker {
    splitter: TextSplitter<Characters>,
}

impl Chunker {
    pub fn new(max_characters: usize) -> Self {
        let config = ChunkConfig::new(max_characters.max(1)).with_trim(true);
        Self {
            splitter: TextSplitter::new(config),
        }
    }

    pub fn chunks(&self, text: &str) -> Vec<String> {
        self.splitter
            .chunks(text)
            .filter(|chunk| !chunk.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_sizes() {
        let chunker = Chunker::new(40);
        let text = "Boil the pasta for nine minutes.\n\n\
                    Meanwhile, fry the garlic in olive oil until golden.\n\n\
                    Toss everything with parmesan.";
        let chunks = chunker.chunks(text);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        assert_eq!(chunks[0], "Boil the pasta for nine minutes.");
    }

    #[test]
    fn test_blank_text() {
        assert!(Chunker::new(100).chunks("  \n\n  ").is_empty());
    }
}
