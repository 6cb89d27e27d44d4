//! Text-generation capability and provider clients.

use anyhow::Result;

pub mod gemini;
pub mod openai;

pub use gemini::GeminiGenerator;
pub use openai::OpenAiGenerator;

/// Opaque text-generation capability (the external LLM).
///
/// No output format is guaranteed; structured replies go through the result
/// extractor, which degrades to a documented default when the model ignores
/// the requested shape.
pub trait TextGenerator: Send + Sync {
    /// Produces free-form text for `request`.
    fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Request envelope shared by the provider clients.
pub struct GenerationRequest<'a> {
    /// Fully assembled prompt.
    pub prompt: &'a str,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: usize,
}
