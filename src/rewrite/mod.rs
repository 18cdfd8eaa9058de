//! Per-block transcript transformation.
//!
//! [`BlockRewriter`] turns one raw transcript block into book-style prose
//! through the text-generation collaborator.  A block transformation that
//! fails for any reason substitutes the original block text under an
//! error-marker heading — content is never lost, and a single bad block
//! never aborts the run.
//!
//! The output contract asks the model for Markdown with `##`/`###`
//! headings only; the structural extractor downstream relies on those
//! markers when they are present.

use std::sync::Arc;

use crate::generate::{ChatMessage, TextGenerator};
use crate::retry::{with_retry, RetryPolicy};
use crate::text::{BlockStatus, TextBlock};

// ---------------------------------------------------------------------------
// Rewrite instructions
// ---------------------------------------------------------------------------

/// System instruction for the rewrite model.  The key constraint is
/// exhaustiveness: rewrite, never summarize.
const REWRITE_INSTRUCTION: &str = "\
You are an expert academic writer and technical editor.  Your task is to
transform a university lecture transcript into text with the style of a
professional textbook, exhaustively preserving all relevant content of
the original without summarizing or omitting details.

Rules:
1. DO NOT summarize, shorten, or merge ideas that were separate.
2. Rewrite everything with better prose, keeping every explanation,
   example, clarification, technical datum, and relevant sentence.
3. Do not add personal interpretation or external information.
4. Write formulas as editable text (Unicode, `_` subscripts, `^`
   superscripts) — never as images.
5. Write in the third person, with technical, fluent, formal language.
6. Convert enumerations into bulleted or numbered lists without dropping
   items; bold the category word before a colon.
7. Bold the most important parts of each paragraph.
8. This fragment belongs to a larger document: no introductions,
   conclusions, or closing phrases — keep textual continuity.

Heading format (strict):
- Use `##` only for main sections of the content.
- Use `###` only for subtopics within a section.
- Never use `####` or lower levels.";

/// Builds the chat messages for one block's rewrite request.
pub struct RewritePrompt;

impl RewritePrompt {
    /// `(system, user)` messages for rewriting `block` of `total_blocks`.
    pub fn build(block: &TextBlock, total_blocks: usize) -> Vec<ChatMessage> {
        let user = format!(
            "Process BLOCK {index} of {total_blocks}.\n\n\
             OUTPUT INSTRUCTIONS:\n\
             - Return ONLY the transformed text in Markdown.\n\
             - Use `##` for main sections and `###` for subtopics, exclusively.\n\
             - Bold the key parts.\n\
             - Do not add extra titles such as \"Introduction\" or \"Conclusion\".\n\
             - Preserve the informative extension: DO NOT summarize, DO NOT omit.\n\n\
             Original text to process (delimited by <<< >>>):\n\n\
             <<<\n{source}\n>>>\n\n\
             Respond with the processed text in Markdown, nothing else.",
            index = block.index,
            source = block.source,
        );

        vec![
            ChatMessage::system(REWRITE_INSTRUCTION),
            ChatMessage::user(user),
        ]
    }
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

/// Fallback output for a block whose transformation failed: the original
/// text under an error-marker heading.
fn fallback_text(block: &TextBlock) -> String {
    format!(
        "## Automatic rewrite failed for block {index}\n\n\
         The original content is included below unchanged.\n\n\
         {source}",
        index = block.index,
        source = block.source,
    )
}

// ---------------------------------------------------------------------------
// BlockRewriter
// ---------------------------------------------------------------------------

/// Transforms transcript blocks one at a time, with retry around the
/// generation call and a lossless fallback when it ultimately fails.
pub struct BlockRewriter {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
}

impl BlockRewriter {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: RetryPolicy) -> Self {
        Self { generator, policy }
    }

    /// Transform `block` in place.
    ///
    /// On success the block is marked [`BlockStatus::Done`] with the
    /// model's output; on failure it is marked [`BlockStatus::Fallback`]
    /// and carries [`fallback_text`] instead.  This method never fails.
    pub async fn rewrite(&self, block: &mut TextBlock, total_blocks: usize) {
        let messages = RewritePrompt::build(block, total_blocks);
        let label = format!("rewrite block {}/{}", block.index, total_blocks);

        match with_retry(&self.policy, &label, || self.generator.complete(&messages)).await {
            Ok(text) => {
                log::debug!("{label}: transformed ({} chars)", text.len());
                block.transformed = Some(text);
                block.status = BlockStatus::Done;
            }
            Err(e) => {
                log::warn!("{label}: failed ({e}) — substituting original text with error marker");
                block.transformed = Some(fallback_text(block));
                block.status = BlockStatus::Fallback;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::GenerationError;
    use async_trait::async_trait;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Generator that always succeeds with a fixed string.
    struct OkGenerator(String);

    #[async_trait]
    impl TextGenerator for OkGenerator {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, GenerationError> {
            Ok(self.0.clone())
        }
    }

    /// Generator that always fails permanently.
    struct FailGenerator;

    #[async_trait]
    impl TextGenerator for FailGenerator {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, GenerationError> {
            Err(GenerationError::Auth("no key".into()))
        }
    }

    fn make_block(index: usize, source: &str) -> TextBlock {
        TextBlock {
            index,
            source: source.into(),
            transformed: None,
            status: BlockStatus::Pending,
        }
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn successful_rewrite_marks_block_done() {
        let rewriter = BlockRewriter::new(
            Arc::new(OkGenerator("## Section\n\nRewritten prose.".into())),
            RetryPolicy::none(),
        );
        let mut block = make_block(1, "raw lecture words");

        rewriter.rewrite(&mut block, 3).await;

        assert_eq!(block.status, BlockStatus::Done);
        assert_eq!(block.output(), "## Section\n\nRewritten prose.");
    }

    #[tokio::test]
    async fn failed_rewrite_falls_back_to_marked_original() {
        let rewriter = BlockRewriter::new(Arc::new(FailGenerator), RetryPolicy::none());
        let mut block = make_block(2, "irreplaceable lecture content");

        rewriter.rewrite(&mut block, 3).await;

        assert_eq!(block.status, BlockStatus::Fallback);
        let output = block.output();
        assert!(output.contains("Automatic rewrite failed for block 2"));
        assert!(output.contains("irreplaceable lecture content"));
    }

    #[test]
    fn prompt_carries_block_index_and_source() {
        let block = make_block(2, "the source words");
        let messages = RewritePrompt::build(&block, 5);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("DO NOT summarize"));
        assert_eq!(messages[1].role, "user");
        assert!(messages[1].content.contains("BLOCK 2 of 5"));
        assert!(messages[1].content.contains("the source words"));
    }

    #[test]
    fn prompt_demands_markdown_heading_markers() {
        let block = make_block(1, "text");
        let messages = RewritePrompt::build(&block, 1);
        assert!(messages[1].content.contains("`##`"));
        assert!(messages[1].content.contains("`###`"));
    }
}
