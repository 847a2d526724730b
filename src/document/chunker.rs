use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("chunk size must be greater than zero")]
    ZeroSize,
    #[error("overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Splits text into overlapping windows of at most `chunk_size` characters.
///
/// Each window ends at the last paragraph break inside it, else the last
/// sentence boundary, else the last word boundary, else a hard cut. The next
/// window starts exactly `overlap` characters before the previous one ended.
/// Lengths count `char`s, not bytes.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::ZeroSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkerError::OverlapTooLarge { chunk_size, overlap });
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        // offsets[i] is the byte offset of char i; the last element is text.len().
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = offsets.len() - 1;

        if total == 0 {
            return Vec::new();
        }
        if total <= self.chunk_size {
            return vec![text.to_string()];
        }

        let breakpoints = Breakpoints::new(text, &offsets);
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            if total - start <= self.chunk_size {
                chunks.push(text[offsets[start]..].to_string());
                break;
            }

            let window_end = start + self.chunk_size;
            // Never accept a cut that leaves the chunk no longer than the overlap
            // (no progress) or shorter than half a window.
            let min_end = start + (self.overlap + 1).max(self.chunk_size / 2);
            let end = breakpoints.best(min_end, window_end).unwrap_or(window_end);

            chunks.push(text[offsets[start]..offsets[end]].to_string());
            start = end - self.overlap;
        }

        chunks
    }
}

/// Candidate cut positions (char indices), finest level last.
struct Breakpoints {
    levels: [Vec<usize>; 3],
}

impl Breakpoints {
    fn new(text: &str, offsets: &[usize]) -> Self {
        let to_char = |byte: usize| offsets.binary_search(&byte).ok();

        let paragraphs = text
            .match_indices("\n\n")
            .filter_map(|(i, sep)| to_char(i + sep.len()))
            .collect();
        let sentences = text
            .split_sentence_bound_indices()
            .filter_map(|(i, _)| to_char(i))
            .collect();
        let words = text
            .split_word_bound_indices()
            .filter_map(|(i, _)| to_char(i))
            .collect();

        Self { levels: [paragraphs, sentences, words] }
    }

    /// The last cut in `min..=max` from the coarsest level that has one.
    fn best(&self, min: usize, max: usize) -> Option<usize> {
        self.levels.iter().find_map(|level| {
            let upper = level.partition_point(|&p| p <= max);
            level[..upper].last().copied().filter(|&p| p >= min)
        })
    }
}
