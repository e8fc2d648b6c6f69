//! Markdown structure extraction.
//!
//! [`parse`] derives a title, the ordered ATX heading list, and
//! heading-delimited sections from raw document text. Lines inside fenced
//! code blocks (```` ``` ```` or `~~~`) are never treated as headings.
//!
//! [`extract_links`] finds Markdown links (`[text](target)`) and wiki links
//! (`[[Target]]`) and classifies them with [`classify_link`].

use std::sync::OnceLock;

use regex::Regex;

use crate::models::LinkType;

/// Maximum length, in characters, of a title taken from a body line.
pub const MAX_TITLE_CHARS: usize = 100;

pub const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    /// 1 for `#`, up to 6 for `######`.
    pub level: usize,
    pub text: String,
    /// 1-based line number.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// `None` for content preceding the first heading.
    pub heading: Option<Heading>,
    /// 1-based line where the section starts (the heading line itself).
    pub start_line: usize,
    /// Section text, including its heading line.
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub title: String,
    pub headings: Vec<Heading>,
    pub sections: Vec<Section>,
}

/// Parse a document into title, headings, and sections.
///
/// Title resolution: the first H1 heading; otherwise the first non-blank,
/// non-heading line truncated to [`MAX_TITLE_CHARS`]; otherwise
/// [`UNTITLED`].
pub fn parse(content: &str) -> ParsedDocument {
    let mut headings = Vec::new();
    let mut sections: Vec<Section> = Vec::new();
    let mut first_body_line: Option<&str> = None;

    let mut current = Section {
        heading: None,
        start_line: 1,
        content: String::new(),
    };
    let mut fence: Option<char> = None;

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim_start();

        if let Some(marker) = fence_marker(trimmed) {
            match fence {
                Some(open) if open == marker => fence = None,
                None => fence = Some(marker),
                _ => {}
            }
        }

        let heading = if fence.is_none() {
            parse_heading(line, line_no)
        } else {
            None
        };

        match heading {
            Some(h) => {
                if current.heading.is_some() || !current.content.trim().is_empty() {
                    sections.push(current);
                }
                current = Section {
                    heading: Some(h.clone()),
                    start_line: line_no,
                    content: String::new(),
                };
                current.content.push_str(line);
                headings.push(h);
            }
            None => {
                if !current.content.is_empty() || current.heading.is_some() {
                    current.content.push('\n');
                }
                current.content.push_str(line);
                if first_body_line.is_none() && !trimmed.is_empty() {
                    first_body_line = Some(line.trim());
                }
            }
        }
    }

    if current.heading.is_some() || !current.content.trim().is_empty() {
        sections.push(current);
    }

    for section in &mut sections {
        let kept = section.content.trim_end().len();
        section.content.truncate(kept);
    }

    let title = headings
        .iter()
        .find(|h| h.level == 1)
        .map(|h| h.text.clone())
        .or_else(|| first_body_line.map(|l| l.chars().take(MAX_TITLE_CHARS).collect()))
        .unwrap_or_else(|| UNTITLED.to_string());

    ParsedDocument {
        title,
        headings,
        sections,
    }
}

fn fence_marker(trimmed: &str) -> Option<char> {
    if trimmed.starts_with("```") {
        Some('`')
    } else if trimmed.starts_with("~~~") {
        Some('~')
    } else {
        None
    }
}

/// Recognize an ATX heading (`# Title`, up to three leading spaces).
fn parse_heading(line: &str, line_no: usize) -> Option<Heading> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let level = rest.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let after = &rest[level..];
    if !after.is_empty() && !after.starts_with(' ') && !after.starts_with('\t') {
        return None;
    }
    let raw = after.trim();
    let closed = raw.trim_end_matches('#');
    let text = if closed.is_empty() || closed.ends_with(' ') {
        closed.trim_end()
    } else {
        raw
    };
    if text.is_empty() {
        return None;
    }
    Some(Heading {
        level,
        text: text.to_string(),
        line: line_no,
    })
}

/// A link as written in document content, before target resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLink {
    pub text: String,
    pub target: String,
    pub link_type: LinkType,
}

fn markdown_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"!?\[([^\]\[]*)\]\(\s*<?([^)\s>]+)>?(?:\s+"[^"]*")?\s*\)"#)
            .expect("link pattern is valid")
    })
}

fn wiki_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[\[([^\]|]+)(?:\|([^\]]*))?\]\]")
            .expect("wiki link pattern is valid")
    })
}

/// Extract links in order of appearance. Images and links inside fenced
/// code blocks are skipped.
pub fn extract_links(content: &str) -> Vec<RawLink> {
    let mut links = Vec::new();
    let mut fence: Option<char> = None;

    for line in content.lines() {
        let trimmed = line.trim_start();
        if let Some(marker) = fence_marker(trimmed) {
            match fence {
                Some(open) if open == marker => fence = None,
                None => fence = Some(marker),
                _ => {}
            }
            continue;
        }
        if fence.is_some() {
            continue;
        }

        let mut found: Vec<(usize, RawLink)> = Vec::new();
        for cap in wiki_link_re().captures_iter(line) {
            let start = cap.get(0).map(|m| m.start()).unwrap_or(0);
            let target = cap[1].trim().to_string();
            let text = cap
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_else(|| target.clone());
            found.push((
                start,
                RawLink {
                    text,
                    target,
                    link_type: LinkType::Wiki,
                },
            ));
        }
        for cap in markdown_link_re().captures_iter(line) {
            let whole = match cap.get(0) {
                Some(m) => m,
                None => continue,
            };
            if whole.as_str().starts_with('!') {
                continue;
            }
            let target = cap[2].to_string();
            found.push((
                whole.start(),
                RawLink {
                    text: cap[1].to_string(),
                    link_type: classify_link(&target),
                    target,
                },
            ));
        }
        found.sort_by_key(|(start, _)| *start);
        links.extend(found.into_iter().map(|(_, l)| l));
    }

    links
}

/// Classify a Markdown link target.
pub fn classify_link(target: &str) -> LinkType {
    let lower = target.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("mailto:")
    {
        LinkType::External
    } else if target.starts_with('#') {
        LinkType::Anchor
    } else {
        LinkType::Internal
    }
}

/// Resolve an internal link target relative to the linking document.
///
/// Strips any `#fragment` or `?query`, resolves `.`/`..` segments, and
/// treats a leading `/` as repository-root relative. Returns `None` when
/// the target escapes the repository root.
pub fn resolve_relative(source_path: &str, target: &str) -> Option<String> {
    let target = target.split(['#', '?']).next().unwrap_or("");
    if target.is_empty() {
        return None;
    }

    let mut segments: Vec<&str> = if let Some(abs) = target.strip_prefix('/') {
        return normalize_segments(Vec::new(), abs);
    } else {
        source_path.split('/').collect()
    };
    segments.pop();
    normalize_segments(segments, target)
}

fn normalize_segments<'a>(mut base: Vec<&'a str>, target: &'a str) -> Option<String> {
    for part in target.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                base.pop()?;
            }
            other => base.push(other),
        }
    }
    if base.is_empty() {
        None
    } else {
        Some(base.join("/"))
    }
}
