//! AI trait for LLM-backed extraction.
//!
//! The AI trait abstracts the single capability the crawling/extraction
//! stack needs from a language model: turn page content plus an extraction
//! prompt into a JSON payload matching a caller-supplied schema. Callers
//! (the aiMiner extractor, Scout's optional AI-assisted classification)
//! own the schema and the interpretation of the result.

use async_trait::async_trait;

use crate::error::Result;

/// AI trait for LLM operations.
///
/// Implementations wrap specific LLM providers (OpenAI, Anthropic, etc.)
/// and handle the specifics of prompting and response parsing.
#[async_trait]
pub trait AI: Send + Sync {
    /// Plain chat completion: system + user prompt, freeform text response.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Structured extraction: page content plus instructions, constrained to
    /// a JSON schema. Returns the raw JSON value; the caller validates shape.
    async fn extract_structured(
        &self,
        system: &str,
        content: &str,
        schema: serde_json::Value,
    ) -> Result<serde_json::Value>;
}
