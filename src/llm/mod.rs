//! Remote text generation: the backend trait, the HTTP client, and the
//! retry policy wrapped around both.

pub mod client;
pub mod retry;

use async_trait::async_trait;

use crate::error::LlmError;

/// Sampling parameters for one generation request.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl GenerationParams {
    pub fn from_api(api: &crate::config::ApiConfig) -> Self {
        Self {
            model: api.model.clone(),
            temperature: api.temperature,
            top_p: api.top_p,
            max_tokens: api.max_tokens,
        }
    }
}

/// A text generation backend.
///
/// The generation loop, summarizer, and retry policy only see this trait,
/// so tests drive them with scripted mocks instead of a live endpoint.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a continuation for `prompt`. Returns the raw, unsanitized
    /// response text.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError>;

    /// Cheap liveness probe, used before resuming a paused job. Backends
    /// with nothing to check may return `true` unconditionally.
    async fn is_alive(&self) -> bool {
        true
    }
}
