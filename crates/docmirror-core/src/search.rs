//! Search primitives shared by every retrieval strategy.
//!
//! The functions here are pure: snippet construction for keyword and
//! semantic hits, the distance-to-similarity conversion, and the
//! Reciprocal Rank Fusion used by hybrid search.
//!
//! # Reciprocal Rank Fusion
//!
//! For each source list, a result at 0-based rank `r` contributes
//! `1 / (k + r + 1)`. Contributions are summed per identity
//! ([`SearchResult::identity`]); a result absent from a source gets
//! nothing from it. The fused list is sorted by descending score with ties
//! kept in first-encounter order (sources are visited in the order given),
//! then truncated.
//!
//! ```rust
//! use docmirror_core::search::rrf_contribution;
//!
//! assert!((rrf_contribution(60, 0) - 1.0 / 61.0).abs() < 1e-12);
//! ```

use std::collections::HashMap;

use crate::models::SearchResult;

/// Default RRF constant.
pub const DEFAULT_RRF_K: u32 = 60;

/// Characters kept before the first keyword match.
pub const SNIPPET_PAD_BEFORE: usize = 30;
/// Characters kept after the end of the first keyword match.
pub const SNIPPET_PAD_AFTER: usize = 50;
/// Length of the content prefix used as a semantic/graph snippet.
pub const CONTENT_SNIPPET_CHARS: usize = 300;

const ELLIPSIS: &str = "...";

/// Placeholder relevance for keyword hits; fusion decides final weighting.
pub const KEYWORD_PLACEHOLDER_SCORE: f64 = 1.0;

/// Snippet around the first case-insensitive occurrence of `query`.
///
/// Returns `None` when the query does not occur. Both sides are folded
/// with full lowercase mapping, and padding is counted in characters of
/// the original content so multi-byte text never splits inside a code
/// point.
pub fn keyword_snippet(content: &str, query: &str) -> Option<String> {
    let needle: Vec<char> = query.trim().chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return None;
    }

    let chars: Vec<char> = content.chars().collect();
    // One entry per folded char, pointing back at its source char.
    let (lowered, origin): (Vec<char>, Vec<usize>) = chars
        .iter()
        .enumerate()
        .flat_map(|(idx, c)| c.to_lowercase().map(move |l| (l, idx)))
        .unzip();
    if lowered.len() < needle.len() {
        return None;
    }

    let hit = (0..=lowered.len() - needle.len())
        .find(|&i| lowered[i..i + needle.len()] == needle[..])?;
    let start = origin[hit];
    let end = origin[hit + needle.len() - 1] + 1;

    let from = start.saturating_sub(SNIPPET_PAD_BEFORE);
    let to = (end + SNIPPET_PAD_AFTER).min(chars.len());

    let mut snippet = String::new();
    if from > 0 {
        snippet.push_str(ELLIPSIS);
    }
    snippet.extend(&chars[from..to]);
    if to < chars.len() {
        snippet.push_str(ELLIPSIS);
    }
    Some(snippet)
}

/// First [`CONTENT_SNIPPET_CHARS`] characters of `content`.
pub fn content_snippet(content: &str) -> String {
    content.chars().take(CONTENT_SNIPPET_CHARS).collect()
}

/// Convert a cosine distance in `[0, 2]` to a similarity in `[0, 1]`.
pub fn similarity_from_distance(distance: f64) -> f64 {
    1.0 - distance / 2.0
}

/// RRF contribution of a single 0-based rank.
pub fn rrf_contribution(k: u32, rank: usize) -> f64 {
    1.0 / (k as f64 + rank as f64 + 1.0)
}

/// Fuse ranked lists with Reciprocal Rank Fusion.
///
/// The first occurrence of an identity supplies the returned result's
/// fields; its `score` is replaced by the fused score.
pub fn reciprocal_rank_fusion(
    sources: &[Vec<SearchResult>],
    k: u32,
    top_k: usize,
) -> Vec<SearchResult> {
    let mut order: Vec<SearchResult> = Vec::new();
    let mut slot: HashMap<String, usize> = HashMap::new();

    for list in sources {
        for (rank, result) in list.iter().enumerate() {
            let contribution = rrf_contribution(k, rank);
            match slot.get(result.identity()) {
                Some(&idx) => order[idx].score += contribution,
                None => {
                    slot.insert(result.identity().to_string(), order.len());
                    let mut fused = result.clone();
                    fused.score = contribution;
                    order.push(fused);
                }
            }
        }
    }

    // Stable sort keeps encounter order among equal scores.
    order.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(top_k);
    order
}

/// Format a Unix timestamp as ISO 8601.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
