//! Inference trait for generative-AI calls.
//!
//! The normalizer treats the backend as a black box: text in, text out.
//! Prompting and response parsing live in [`crate::normalizer`].

use async_trait::async_trait;

use crate::error::InferenceError;

/// A text-completion backend.
///
/// Implementations wrap specific providers (OpenAI, Gemini, etc.) and
/// return the raw model output.
#[async_trait]
pub trait Inference: Send + Sync {
    /// Complete a single prompt.
    async fn complete(&self, prompt: &str) -> Result<String, InferenceError>;

    /// Provider/model label for logging.
    fn name(&self) -> &str {
        "inference"
    }
}
