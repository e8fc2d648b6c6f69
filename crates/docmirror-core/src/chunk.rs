//! Heading-aware document chunker.
//!
//! Splits a version's content into [`ChunkDraft`]s scoped by Markdown
//! headings. Each chunk carries a breadcrumb of its enclosing headings
//! (`"Guide > Install > Linux"`) and an approximate token count.
//!
//! # Algorithm
//!
//! 1. Parse the content into heading-delimited sections ([`parser::parse`]).
//! 2. Maintain a heading stack: a heading at level `L` pops every entry at
//!    level `>= L` and pushes itself. The stack joined with `" > "` is the
//!    section's breadcrumb.
//! 3. Content before the first heading becomes chunk 0 with no breadcrumb.
//! 4. Sections larger than `max_tokens` are split further on paragraph
//!    boundaries (`\n\n`), hard-splitting single oversized paragraphs at the
//!    nearest newline or space. Every piece keeps the section's breadcrumb.
//!
//! The output is a pure function of `(content, max_tokens)`: chunking the
//! same input twice yields identical ordered sequences.
//!
//! ```rust
//! use docmirror_core::chunk::chunk_document;
//!
//! let chunks = chunk_document("intro\n# A\ntext\n## B\nmore", 512);
//! assert_eq!(chunks.len(), 3);
//! assert_eq!(chunks[0].heading_path, None);
//! assert_eq!(chunks[2].heading_path.as_deref(), Some("A > B"));
//! ```

use crate::models::ChunkDraft;
use crate::parser;

/// Approximate characters-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Separator between breadcrumb levels.
pub const BREADCRUMB_SEPARATOR: &str = " > ";

/// Approximate token count of `text` (ceil of chars / [`CHARS_PER_TOKEN`]).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Split content into heading-scoped chunks with contiguous indices from 0.
///
/// Empty or whitespace-only content yields no chunks.
pub fn chunk_document(content: &str, max_tokens: usize) -> Vec<ChunkDraft> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let parsed = parser::parse(content);

    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut chunks = Vec::new();

    for section in parsed.sections {
        let heading_path = match &section.heading {
            Some(h) => {
                while stack.last().is_some_and(|(level, _)| *level >= h.level) {
                    stack.pop();
                }
                stack.push((h.level, h.text.clone()));
                Some(
                    stack
                        .iter()
                        .map(|(_, text)| text.as_str())
                        .collect::<Vec<_>>()
                        .join(BREADCRUMB_SEPARATOR),
                )
            }
            None => None,
        };

        let body = section.content.trim();
        if body.is_empty() {
            continue;
        }

        for piece in split_paragraphs(body, max_chars) {
            let index = chunks.len() as i64;
            chunks.push(ChunkDraft {
                chunk_index: index,
                heading_path: heading_path.clone(),
                token_count: estimate_tokens(&piece) as i64,
                content: piece,
            });
        }
    }

    chunks
}

/// Pack paragraphs into pieces of at most `max_chars` characters.
fn split_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let para_chars = trimmed.chars().count();
        let would_be = if current_buf.is_empty() {
            para_chars
        } else {
            current_buf.chars().count() + 2 + para_chars
        };

        if would_be > max_chars && !current_buf.is_empty() {
            pieces.push(std::mem::take(&mut current_buf));
        }

        if para_chars > max_chars {
            hard_split(trimmed, max_chars, &mut pieces);
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        pieces.push(current_buf);
    }

    pieces
}

/// Split one oversized paragraph at newline/space boundaries.
fn hard_split(paragraph: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        let limit = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(byte, _)| byte)
            .unwrap_or(remaining.len());

        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind('\n')
                .or_else(|| remaining[..limit].rfind(' '))
                .filter(|pos| *pos > 0)
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };

        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[split_at..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_has_no_chunks() {
        assert!(chunk_document("", 512).is_empty());
        assert!(chunk_document("  \n\n ", 512).is_empty());
    }

    #[test]
    fn preamble_is_chunk_zero_without_heading_path() {
        let chunks = chunk_document("before any heading\n# Title\nbody", 512);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].heading_path, None);
        assert_eq!(chunks[0].content, "before any heading");
        assert_eq!(chunks[1].heading_path.as_deref(), Some("Title"));
        assert_eq!(chunks[1].content, "# Title\nbody");
    }

    #[test]
    fn breadcrumbs_track_heading_levels() {
        let content = "# Guide\nintro\n## Install\nsteps\n### Linux\napt\n## Usage\nrun\n# Appendix\nmisc";
        let paths: Vec<Option<String>> = chunk_document(content, 512)
            .into_iter()
            .map(|c| c.heading_path)
            .collect();
        assert_eq!(
            paths,
            vec![
                Some("Guide".to_string()),
                Some("Guide > Install".to_string()),
                Some("Guide > Install > Linux".to_string()),
                Some("Guide > Usage".to_string()),
                Some("Appendix".to_string()),
            ]
        );
    }

    #[test]
    fn skipped_levels_still_nest() {
        let chunks = chunk_document("# A\n### Deep\nx\n## B\ny", 512);
        assert_eq!(chunks[1].heading_path.as_deref(), Some("A > Deep"));
        assert_eq!(chunks[2].heading_path.as_deref(), Some("A > B"));
    }

    #[test]
    fn oversized_section_splits_and_keeps_breadcrumb() {
        let body = (0..40)
            .map(|i| format!("Paragraph number {i} with some words."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let content = format!("# Big\n{body}");
        let chunks = chunk_document(&content, 20);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.heading_path.as_deref(), Some("Big"));
            assert!(c.content.chars().count() <= 20 * CHARS_PER_TOKEN);
        }
    }

    #[test]
    fn hard_split_handles_multibyte_text() {
        let para = "é".repeat(50);
        let chunks = chunk_document(&para, 5);
        let joined: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(joined, para);
    }

    #[test]
    fn token_count_is_approximate() {
        let chunks = chunk_document("abcdefgh", 512);
        assert_eq!(chunks[0].token_count, 2);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn deterministic() {
        let text = "pre\n# A\nalpha\n\nbeta\n## B\ngamma\n# C\ndelta";
        let c1 = chunk_document(text, 3);
        let c2 = chunk_document(text, 3);
        assert_eq!(c1, c2);
    }
}
