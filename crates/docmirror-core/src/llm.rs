//! LLM completion provider trait.
//!
//! Entity extraction and graph query synthesis both send a single prompt
//! and read back text. Concrete providers live in the app crate.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn model_name(&self) -> &str;
    /// Complete `prompt`, returning the raw model output.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````).
///
/// Text without a fence is returned trimmed. An unterminated fence still has
/// its opening line removed.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}
