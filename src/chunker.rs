//! Chunking utilities for splitting long documents into overlapping segments.
//!
//! Documents longer than the configured chunk size are split into windows
//! that each get embedded separately. Within the tail of every window the
//! splitter looks for a natural boundary, preferring paragraph breaks over
//! sentence ends over line breaks over plain spaces, and only cuts
//! mid-word when no boundary exists at all.

/// Default maximum chunk size in characters (~500 tokens of English text).
pub const DEFAULT_CHUNK_SIZE: usize = 2000;

/// Default overlap between adjacent chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Fraction of the window (from the end) searched for a break point.
const BREAK_SEARCH_FRACTION: f64 = 0.3;

/// Sentence-ending sequences, all treated with equal priority.
const SENTENCE_ENDS: &[&str] = &[". ", ".\n", "? ", "?\n", "! ", "!\n"];

/// Chunking parameters.
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    /// Maximum chunk size in characters.
    pub max_chars: usize,
    /// Overlap between adjacent chunks in characters.
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// A chunk of text from a larger document.
///
/// Each chunk is an exact slice of the original text: `pos` is the starting
/// character offset and `seq` the zero-based index within the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based chunk index within the document.
    pub seq: usize,
    /// Character offset where this chunk starts in the original text.
    pub pos: usize,
    /// The chunk text content.
    pub text: String,
}

/// Splits text into bounded, overlapping chunks at natural boundaries.
///
/// # Examples
///
/// ```
/// use docfuse::chunker::{Chunker, ChunkerConfig};
///
/// let chunker = Chunker::new(ChunkerConfig::default());
/// let chunks = chunker.chunk_text("Hello, world!");
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].text, "Hello, world!");
/// assert_eq!((chunks[0].seq, chunks[0].pos), (0, 0));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> ChunkerConfig {
        self.config
    }

    /// Return a lazy iterator over the chunks of `text`.
    ///
    /// The sequence is finite and deterministic for identical input and
    /// parameters; calling this again restarts from the beginning.
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        // Char index -> byte index map, with a sentinel for the end.
        let char_to_byte: Vec<usize> = text
            .char_indices()
            .map(|(byte_idx, _)| byte_idx)
            .chain(std::iter::once(text.len()))
            .collect();

        Chunks {
            text,
            char_to_byte,
            max_chars: self.config.max_chars.max(1),
            overlap: self.config.overlap,
            offset: 0,
            seq: 0,
            done: text.is_empty(),
        }
    }

    /// Split `text` eagerly, collecting every chunk.
    pub fn chunk_text(&self, text: &str) -> Vec<Chunk> {
        self.chunks(text).collect()
    }
}

/// Lazy chunk iterator produced by [`Chunker::chunks`].
#[derive(Debug)]
pub struct Chunks<'a> {
    text: &'a str,
    char_to_byte: Vec<usize>,
    max_chars: usize,
    overlap: usize,
    offset: usize,
    seq: usize,
    done: bool,
}

impl Chunks<'_> {
    fn char_count(&self) -> usize {
        self.char_to_byte.len() - 1
    }

    fn slice(&self, start_char: usize, end_char: usize) -> &str {
        &self.text[self.char_to_byte[start_char]..self.char_to_byte[end_char]]
    }

    /// Find the best break point inside the last ~30% of the window
    /// `[start, end)`, in strict priority order: paragraph break, sentence
    /// end, line break, space. Returns the char index just past the
    /// boundary, or `None` when the window has no boundary at all.
    fn find_break(&self, start_char: usize, end_char: usize) -> Option<usize> {
        let window = end_char - start_char;
        let search_span =
            ((window as f64 * BREAK_SEARCH_FRACTION) as usize).max(1);
        let search_start_char = end_char - search_span.min(window);

        let lo = self.char_to_byte[search_start_char];
        let hi = self.char_to_byte[end_char];
        let region = &self.text[lo..hi];

        let tiers: [&[&str]; 4] =
            [&["\n\n"], SENTENCE_ENDS, &["\n"], &[" "]];

        for patterns in tiers {
            let mut best: Option<usize> = None;
            for pattern in patterns {
                if let Some(idx) = region.rfind(pattern) {
                    let after = idx + pattern.len();
                    best = Some(best.map_or(after, |b| b.max(after)));
                }
            }
            if let Some(after_byte) = best {
                return Some(self.byte_to_char(lo + after_byte));
            }
        }

        None
    }

    fn byte_to_char(&self, byte: usize) -> usize {
        // Break patterns are ASCII, so `byte` always lands on a boundary.
        self.char_to_byte
            .binary_search(&byte)
            .unwrap_or_else(|next| next)
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        let char_count = self.char_count();
        let remaining = char_count - self.offset;

        // Whatever is left fits in one final chunk.
        if remaining <= self.max_chars {
            let chunk = Chunk {
                seq: self.seq,
                pos: self.offset,
                text: self.slice(self.offset, char_count).to_string(),
            };
            self.done = true;
            return Some(chunk);
        }

        let window_end = self.offset + self.max_chars;
        let break_char = self
            .find_break(self.offset, window_end)
            .unwrap_or(window_end);

        let chunk = Chunk {
            seq: self.seq,
            pos: self.offset,
            text: self.slice(self.offset, break_char).to_string(),
        };

        // Overlap backward from the break point, but always make progress.
        self.offset = break_char
            .saturating_sub(self.overlap)
            .max(self.offset + 1);
        self.seq += 1;

        Some(chunk)
    }
}
