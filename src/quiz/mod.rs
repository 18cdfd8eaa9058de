//! Per-section quiz generation.
//!
//! For each detected [`Section`], [`QuizBuilder`] asks the
//! text-generation collaborator for a fixed number of multiple-choice
//! items (five options A–E, one correct, short justification), requested
//! as a JSON array for robust parsing.  When the collaborator is
//! unavailable or returns unusable items, deterministic placeholder
//! items keep the quiz document structurally valid — placeholders are
//! flagged and visibly marked as non-authoritative.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::generate::{ChatMessage, TextGenerator};
use crate::retry::{with_retry, RetryPolicy};
use crate::structure::Section;

// ---------------------------------------------------------------------------
// QuizItem
// ---------------------------------------------------------------------------

/// Option labels, in option order.
pub const OPTION_LABELS: [char; 5] = ['A', 'B', 'C', 'D', 'E'];

/// One multiple-choice assessment item belonging to exactly one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizItem {
    pub question: String,
    /// Exactly five option texts, labeled A–E by position.
    pub options: Vec<String>,
    /// The correct option's label (`'A'`–`'E'`).
    pub answer: char,
    /// Short justification of the correct answer.
    pub justification: String,
    /// `true` for deterministic stand-ins produced without the
    /// question-authoring collaborator.
    #[serde(default)]
    pub placeholder: bool,
}

impl QuizItem {
    /// An item is well-formed when it has exactly five distinct options
    /// and its answer is one of the five labels.
    pub fn is_well_formed(&self) -> bool {
        if self.options.len() != OPTION_LABELS.len() {
            return false;
        }
        let mut seen: Vec<&str> = self.options.iter().map(|o| o.trim()).collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len() == OPTION_LABELS.len() && OPTION_LABELS.contains(&self.answer)
    }
}

/// Quiz for a whole document: page number → items for that section.
pub type QuizByPage = BTreeMap<u32, Vec<QuizItem>>;

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

const QUIZ_INSTRUCTION: &str = "\
You write high-difficulty multiple-choice exam questions in the style of
a professional licensing exam.  Every question has exactly five options
and exactly one correct answer with a brief justification.";

fn quiz_prompt(section: &Section, count: usize) -> Vec<ChatMessage> {
    let topic = match &section.subtitle {
        Some(subtitle) => format!("{} — {}", section.title, subtitle),
        None => section.title.clone(),
    };

    let user = format!(
        "Write exactly {count} difficult multiple-choice questions about:\n\
         {topic}\n\n\
         Respond ONLY with a JSON array, no prose, where each element is:\n\
         {{\"question\": \"…\", \"options\": [\"…\", \"…\", \"…\", \"…\", \"…\"], \
         \"answer\": \"A\", \"justification\": \"…\"}}\n\n\
         Rules:\n\
         - `options` holds exactly five distinct option texts without letter prefixes.\n\
         - `answer` is the correct option's letter, A through E.\n\
         - `justification` is one or two sentences."
    );

    vec![
        ChatMessage::system(QUIZ_INSTRUCTION),
        ChatMessage::user(user),
    ]
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Strip a Markdown code fence if the model wrapped its JSON in one.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") up to the first newline, and the
    // closing fence.
    let inner = inner.split_once('\n').map(|(_, rest)| rest).unwrap_or(inner);
    inner.trim_end_matches('`').trim()
}

fn parse_items(response: &str) -> Result<Vec<QuizItem>, serde_json::Error> {
    serde_json::from_str(strip_code_fence(response))
}

// ---------------------------------------------------------------------------
// Placeholder items
// ---------------------------------------------------------------------------

/// Deterministic stand-in items for a section, visibly marked as
/// non-authoritative.
fn placeholder_items(section: &Section, count: usize) -> Vec<QuizItem> {
    (1..=count)
        .map(|n| QuizItem {
            question: format!(
                "[PLACEHOLDER] Review question {n} on \u{ab}{}\u{bb} — automatic generation unavailable",
                section.title
            ),
            options: OPTION_LABELS
                .iter()
                .map(|label| format!("Placeholder option {label}"))
                .collect(),
            answer: 'A',
            justification: "Placeholder item produced without the question-authoring service; \
                            review manually."
                .into(),
            placeholder: true,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// QuizBuilder
// ---------------------------------------------------------------------------

/// Generates the per-section quiz through the text-generation
/// collaborator, one independent request per section.
pub struct QuizBuilder {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
    per_section: usize,
}

impl QuizBuilder {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: RetryPolicy, per_section: usize) -> Self {
        Self {
            generator,
            policy,
            per_section,
        }
    }

    /// Produce exactly `per_section` items for every section, keyed by
    /// the section's page.  Never fails: sections whose generation or
    /// validation fails receive placeholder items.
    pub async fn generate(&self, sections: &[Section]) -> QuizByPage {
        let mut quiz = QuizByPage::new();

        for section in sections {
            let items = self.items_for_section(section).await;
            quiz.insert(section.page, items);
        }

        quiz
    }

    async fn items_for_section(&self, section: &Section) -> Vec<QuizItem> {
        let messages = quiz_prompt(section, self.per_section);
        let label = format!("quiz page {} ({})", section.page, section.title);

        let response =
            match with_retry(&self.policy, &label, || self.generator.complete(&messages)).await {
                Ok(response) => response,
                Err(e) => {
                    log::warn!("{label}: generation failed ({e}) — using placeholder items");
                    return placeholder_items(section, self.per_section);
                }
            };

        let mut items: Vec<QuizItem> = match parse_items(&response) {
            Ok(items) => items.into_iter().filter(QuizItem::is_well_formed).collect(),
            Err(e) => {
                log::warn!("{label}: unparseable response ({e}) — using placeholder items");
                return placeholder_items(section, self.per_section);
            }
        };

        // Enforce the exact per-section count: trim surplus, pad shortfall
        // with marked placeholders.
        items.truncate(self.per_section);
        if items.len() < self.per_section {
            log::warn!(
                "{label}: got {} well-formed items, padding to {}",
                items.len(),
                self.per_section
            );
            let missing = self.per_section - items.len();
            items.extend(placeholder_items(section, missing));
        }

        items
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
