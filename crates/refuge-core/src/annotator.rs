//! Line classification and document-link extraction for agent replies
//!
//! Agent replies arrive as plain text. The assistant marks urgent sections with
//! `**...**`, timed phases with "HOURS" and an en-dash, and list items with a
//! leading dash or bullet. This module turns that text into display hints
//! without any knowledge of how they are rendered.

use regex::Regex;
use std::sync::OnceLock;

/// Document links: absolute http(s) URLs ending in `.pdf`.
///
/// Only one extension is recognized and only the first link in a message is
/// honored; further links stay in the body text.
static DOCUMENT_LINK_REGEX: OnceLock<Regex> = OnceLock::new();

fn document_link_regex() -> &'static Regex {
    DOCUMENT_LINK_REGEX.get_or_init(|| {
        Regex::new(r"(?i)https?://\S+\.pdf").expect("Failed to compile document link regex")
    })
}

/// Semantic kind of a single line in an agent reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Urgent header such as `**FIRST 2 HOURS**`
    SectionBanner,
    /// Timed phase such as `NEXT 12 HOURS – find food`
    PhaseBanner,
    ListItem,
    Paragraph,
    /// Vertical gap, not an empty paragraph
    Blank,
}

/// One classified line with its markup stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedLine {
    pub kind: LineKind,
    pub text: String,
}

impl AnnotatedLine {
    fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Split a raw agent payload into its display body and an optional document link.
///
/// The returned content never contains the extracted link.
pub fn extract_document_link(raw: &str) -> (String, Option<String>) {
    let text = raw.trim();

    match document_link_regex().find(text) {
        Some(m) => {
            let mut content = String::with_capacity(text.len() - m.len());
            content.push_str(&text[..m.start()]);
            content.push_str(&text[m.end()..]);
            (content.trim().to_string(), Some(m.as_str().to_string()))
        }
        None => (text.to_string(), None),
    }
}

type Matcher = fn(&str) -> bool;
type Builder = fn(&str) -> AnnotatedLine;

/// Classification rules in precedence order. Every predicate receives the
/// trimmed line; the first one that matches decides the kind.
const RULES: [(Matcher, Builder); 5] = [
    (is_section_banner, section_banner),
    (is_phase_banner, phase_banner),
    (is_list_item, list_item),
    (is_text, paragraph),
    (always, blank),
];

const LIST_MARKERS: [&str; 2] = ["- ", "• "];

fn is_section_banner(line: &str) -> bool {
    line.starts_with("**") && line.ends_with("**")
}

fn is_phase_banner(line: &str) -> bool {
    line.contains("HOURS") && line.contains('\u{2013}')
}

fn is_list_item(line: &str) -> bool {
    LIST_MARKERS.iter().any(|marker| line.starts_with(marker))
}

fn is_text(line: &str) -> bool {
    !line.is_empty()
}

fn always(_: &str) -> bool {
    true
}

fn section_banner(line: &str) -> AnnotatedLine {
    AnnotatedLine::new(LineKind::SectionBanner, strip_emphasis(line))
}

// Stripped the same way as section banners; phase lines often carry `**` too.
fn phase_banner(line: &str) -> AnnotatedLine {
    AnnotatedLine::new(LineKind::PhaseBanner, strip_emphasis(line))
}

fn list_item(line: &str) -> AnnotatedLine {
    let text = LIST_MARKERS
        .iter()
        .find_map(|marker| line.strip_prefix(marker))
        .unwrap_or(line);
    AnnotatedLine::new(LineKind::ListItem, text)
}

fn paragraph(line: &str) -> AnnotatedLine {
    AnnotatedLine::new(LineKind::Paragraph, line)
}

fn blank(_: &str) -> AnnotatedLine {
    AnnotatedLine::new(LineKind::Blank, "")
}

fn strip_emphasis(line: &str) -> String {
    line.replace("**", "")
}

/// Classify one line. Stateless: neighbouring lines are never consulted.
pub fn classify_line(line: &str) -> AnnotatedLine {
    let trimmed = line.trim();

    RULES
        .iter()
        .find(|(matches, _)| matches(trimmed))
        .map(|(_, build)| build(trimmed))
        .unwrap_or_else(|| blank(trimmed))
}

/// Classify every line of a cleaned message body, in order.
///
/// `\r\n` is normalized to `\n` first; empty lines are kept as `Blank`.
pub fn annotate(content: &str) -> Vec<AnnotatedLine> {
    content
        .replace("\r\n", "\n")
        .split('\n')
        .map(classify_line)
        .collect()
}
