//! Transcript chunking and reassembly.
//!
//! [`split`] partitions a transcript into bounded-size ordered blocks on
//! word boundaries; [`assemble`] joins the transformed blocks back into
//! one document.  The round trip preserves the transcript's word count —
//! blocks never overlap and never drop content (whitespace is
//! normalized to single spaces inside blocks).

// ---------------------------------------------------------------------------
// BlockStatus
// ---------------------------------------------------------------------------

/// Transformation state of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Not yet transformed.
    Pending,
    /// Transformed by the generation collaborator.
    Done,
    /// Transformation failed; the block carries its source text under an
    /// error marker instead.
    Fallback,
}

// ---------------------------------------------------------------------------
// TextBlock
// ---------------------------------------------------------------------------

/// One bounded-size contiguous slice of the source transcript.
///
/// Blocks are created by [`split`], transformed independently, and
/// reassembled strictly by `index` — they are not persisted beyond the
/// run.
#[derive(Debug, Clone)]
pub struct TextBlock {
    /// 1-based position in the transcript.
    pub index: usize,
    /// Raw source text (whitespace-normalized).
    pub source: String,
    /// Transformed text, `None` until transformation succeeds or falls
    /// back.
    pub transformed: Option<String>,
    pub status: BlockStatus,
}

impl TextBlock {
    /// The text this block contributes to the assembled document: the
    /// transformed text when present, the source otherwise.
    pub fn output(&self) -> &str {
        self.transformed.as_deref().unwrap_or(&self.source)
    }

    /// Number of whitespace-delimited words in the source text.
    pub fn word_count(&self) -> usize {
        self.source.split_whitespace().count()
    }
}

// ---------------------------------------------------------------------------
// split / assemble
// ---------------------------------------------------------------------------

/// Split `text` into blocks of at most `max_words_per_block`
/// whitespace-delimited words.
///
/// Produces `ceil(word_count / max_words_per_block)` blocks; every block
/// except possibly the last is full.  An empty (or all-whitespace) text
/// produces no blocks.
pub fn split(text: &str, max_words_per_block: usize) -> Vec<TextBlock> {
    assert!(max_words_per_block > 0, "block size must be positive");

    let words: Vec<&str> = text.split_whitespace().collect();

    words
        .chunks(max_words_per_block)
        .enumerate()
        .map(|(i, chunk)| TextBlock {
            index: i + 1,
            source: chunk.join(" "),
            transformed: None,
            status: BlockStatus::Pending,
        })
        .collect()
}

/// Concatenate block outputs in index order, separated by a blank line.
///
/// Callers pass the blocks in the order [`split`] produced them; the
/// index is authoritative, so the blocks are re-sorted defensively-free:
/// the sequence is assumed already ordered and is asserted in debug
/// builds.
pub fn assemble(blocks: &[TextBlock]) -> String {
    debug_assert!(
        blocks.windows(2).all(|w| w[0].index < w[1].index),
        "blocks must be ordered by index"
    );

    blocks
        .iter()
        .map(TextBlock::output)
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
