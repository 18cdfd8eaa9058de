//! Heading/section extraction and per-section image lookup.
//!
//! The rewrite stage's output contract guarantees `##`/`###` markers, so
//! extraction uses them when they are present.  Documents without
//! markers (e.g. fallback blocks mixed with legacy content) fall back to
//! a line-shape heuristic: a short line that starts with an uppercase
//! letter and has few words is taken as a heading, and a short following
//! line as its subtitle.
//!
//! Each detected heading is assigned a page equal to its 1-based rank
//! among detected headings.  This is a uniform estimate, not a layout
//! page count — a documented limitation, not a defect.

use async_trait::async_trait;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Heuristic thresholds
// ---------------------------------------------------------------------------

/// A heading candidate must be shorter than this many characters.
const MAX_HEADING_CHARS: usize = 120;
/// A heading candidate must have fewer than this many words.
const MAX_HEADING_WORDS: usize = 8;
/// A subtitle line must have fewer than this many words.
const MAX_SUBTITLE_WORDS: usize = 12;

// ---------------------------------------------------------------------------
// Section
// ---------------------------------------------------------------------------

/// A detected heading/subheading pair with an estimated page.
///
/// Sections anchor per-page images and quiz items; they are not
/// persisted beyond the artifacts they inform.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub subtitle: Option<String>,
    /// 1-based rank among detected headings (uniform page estimate).
    pub page: u32,
    /// Illustrative image URL, attached by [`attach_images`].
    pub image: Option<String>,
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Extract the section hierarchy from an assembled document.
///
/// Page numbers are strictly increasing in document order and equal in
/// count to the detected headings.  Returns an empty vector when no
/// heading is detected.
pub fn extract_sections(text: &str) -> Vec<Section> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let pairs = if lines.iter().any(|l| l.starts_with("## ")) {
        extract_from_markers(&lines)
    } else {
        extract_heuristically(&lines)
    };

    pairs
        .into_iter()
        .enumerate()
        .map(|(i, (title, subtitle))| Section {
            title,
            subtitle,
            page: (i + 1) as u32,
            image: None,
        })
        .collect()
}

/// Marker pass: `## ` opens a section; an immediately following `### `
/// line becomes its subtitle.
fn extract_from_markers(lines: &[&str]) -> Vec<(String, Option<String>)> {
    let mut pairs = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let Some(title) = line.strip_prefix("## ") else {
            continue;
        };

        let subtitle = lines
            .get(i + 1)
            .and_then(|next| next.strip_prefix("### "))
            .map(|s| s.trim().to_string());

        pairs.push((title.trim().to_string(), subtitle));
    }

    pairs
}

/// Line-shape pass: short line, uppercase start, few words.
fn extract_heuristically(lines: &[&str]) -> Vec<(String, Option<String>)> {
    let mut pairs = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !is_heading_candidate(line) {
            continue;
        }

        let subtitle = lines
            .get(i + 1)
            .filter(|next| next.split_whitespace().count() < MAX_SUBTITLE_WORDS)
            .map(|next| next.to_string());

        pairs.push((line.to_string(), subtitle));
    }

    pairs
}

fn is_heading_candidate(line: &str) -> bool {
    let starts_upper = line.chars().next().is_some_and(char::is_uppercase);
    starts_upper
        && line.chars().count() < MAX_HEADING_CHARS
        && line.split_whitespace().count() < MAX_HEADING_WORDS
}

// ---------------------------------------------------------------------------
// ImageError / ImageFinder
// ---------------------------------------------------------------------------

/// Image lookup failure.  Always degraded to a placeholder, never fatal.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image lookup failed: {0}")]
    Lookup(String),
}

/// External image-lookup collaborator, keyed by title + subtitle.
#[async_trait]
pub trait ImageFinder: Send + Sync {
    /// Return a publicly fetchable URL of one illustrative image.
    async fn find(&self, title: &str, subtitle: Option<&str>) -> Result<String, ImageError>;
}

/// Deterministic placeholder URL for a topic — used both as the default
/// finder and as the degraded result when a real lookup fails.
pub fn placeholder_url(title: &str, subtitle: Option<&str>) -> String {
    let query = match subtitle {
        Some(sub) if !sub.is_empty() => format!("{title} {sub}"),
        _ => title.to_string(),
    };
    format!(
        "https://via.placeholder.com/1200x800.png?text={}",
        query.replace(' ', "+")
    )
}

/// [`ImageFinder`] that always answers with [`placeholder_url`].
pub struct PlaceholderImageFinder;

#[async_trait]
impl ImageFinder for PlaceholderImageFinder {
    async fn find(&self, title: &str, subtitle: Option<&str>) -> Result<String, ImageError> {
        Ok(placeholder_url(title, subtitle))
    }
}

// ---------------------------------------------------------------------------
// attach_images
// ---------------------------------------------------------------------------

/// Request one image per section from `finder`.
///
/// A lookup failure degrades that section to a placeholder reference;
/// it never aborts extraction.
pub async fn attach_images(sections: &mut [Section], finder: &dyn ImageFinder) {
    for section in sections.iter_mut() {
        let url = match finder.find(&section.title, section.subtitle.as_deref()).await {
            Ok(url) => url,
            Err(e) => {
                log::warn!(
                    "image lookup failed for \"{}\" (page {}): {e} — using placeholder",
                    section.title,
                    section.page
                );
                placeholder_url(&section.title, section.subtitle.as_deref())
            }
        };
        section.image = Some(url);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MARKED_DOC: &str = "\
## Cell Biology

### The structure of the membrane

The membrane consists of a lipid bilayer with embedded proteins that
regulate transport between the cell and its environment.

## Metabolism

Long explanatory paragraph about catabolic and anabolic pathways that
clearly is not a heading because it runs on well past the thresholds and
keeps going for quite a while longer than any heading reasonably would.

## Genetics

### Mendelian inheritance

More prose here.";

    // ---- marker extraction ---

    #[test]
    fn marker_extraction_finds_all_sections() {
        let sections = extract_sections(MARKED_DOC);

        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Cell Biology", "Metabolism", "Genetics"]);
    }

    #[test]
    fn marker_extraction_pairs_subtitles() {
        let sections = extract_sections(MARKED_DOC);

        assert_eq!(
            sections[0].subtitle.as_deref(),
            Some("The structure of the membrane")
        );
        assert_eq!(sections[1].subtitle, None);
        assert_eq!(sections[2].subtitle.as_deref(), Some("Mendelian inheritance"));
    }

    /// Page numbers are strictly increasing and equal in count to the
    /// detected headings.
    #[test]
    fn pages_are_strictly_increasing_ranks() {
        let sections = extract_sections(MARKED_DOC);

        assert_eq!(sections.len(), 3);
        let pages: Vec<u32> = sections.iter().map(|s| s.page).collect();
        assert_eq!(pages, vec![1, 2, 3]);
    }

    // ---- heuristic extraction ---

    #[test]
    fn heuristic_detects_short_uppercase_lines() {
        let doc = "\
Thermodynamics

An extended paragraph that describes the first law in detail and keeps
adding words so that it cannot possibly be mistaken for a heading line.

Entropy and disorder
A short subtitle line";

        let sections = extract_sections(doc);
        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert!(titles.contains(&"Thermodynamics"));
        assert!(titles.contains(&"Entropy and disorder"));
    }

    #[test]
    fn heuristic_takes_short_following_line_as_subtitle() {
        let doc = "Thermodynamics\nHeat and work in systems\n\nLong paragraph follows with many words one two three four five six seven eight nine ten eleven twelve thirteen.";
        let sections = extract_sections(doc);

        assert_eq!(sections[0].title, "Thermodynamics");
        assert_eq!(sections[0].subtitle.as_deref(), Some("Heat and work in systems"));
    }

    #[test]
    fn heuristic_rejects_lowercase_and_long_lines() {
        let doc = "\
lowercase opener that is short

A sentence which has rather more than eight whitespace separated words in it overall.";

        assert!(extract_sections(doc).is_empty());
    }

    #[test]
    fn empty_document_yields_no_sections() {
        assert!(extract_sections("").is_empty());
        assert!(extract_sections("\n\n  \n").is_empty());
    }

    // ---- images ---

    struct FailFinder;

    #[async_trait]
    impl ImageFinder for FailFinder {
        async fn find(&self, _t: &str, _s: Option<&str>) -> Result<String, ImageError> {
            Err(ImageError::Lookup("upstream 500".into()))
        }
    }

    #[tokio::test]
    async fn attach_images_uses_finder_result() {
        struct FixedFinder;

        #[async_trait]
        impl ImageFinder for FixedFinder {
            async fn find(&self, _t: &str, _s: Option<&str>) -> Result<String, ImageError> {
                Ok("https://img.example/cell.png".into())
            }
        }

        let mut sections = extract_sections(MARKED_DOC);
        attach_images(&mut sections, &FixedFinder).await;

        assert!(sections
            .iter()
            .all(|s| s.image.as_deref() == Some("https://img.example/cell.png")));
    }

    /// Lookup failures degrade to placeholders and never abort.
    #[tokio::test]
    async fn attach_images_degrades_to_placeholder_on_failure() {
        let mut sections = extract_sections(MARKED_DOC);
        attach_images(&mut sections, &FailFinder).await;

        for section in &sections {
            let image = section.image.as_deref().unwrap();
            assert!(image.starts_with("https://via.placeholder.com/"));
        }
    }

    #[test]
    fn placeholder_url_encodes_the_topic() {
        let url = placeholder_url("Cell Biology", Some("The membrane"));
        assert_eq!(
            url,
            "https://via.placeholder.com/1200x800.png?text=Cell+Biology+The+membrane"
        );
    }
}
