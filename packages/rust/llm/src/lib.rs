//! Completion service interface, the OpenAI-compatible adapter, and prompts.

pub mod openai;
pub mod prompts;

use async_trait::async_trait;
use lingoflow_shared::Result;

pub use openai::OpenAiClient;
pub use prompts::{SeoMeta, parse_segments, parse_seo_meta, segment_translation_prompt, seo_meta_prompt};

/// One completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    /// Ask the service for a single JSON object as the answer.
    pub json_mode: bool,
    pub model: String,
}

impl CompletionRequest {
    /// A JSON-mode request with no system message.
    pub fn json(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            json_mode: true,
            model: model.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// A text completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Return the model's answer text.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}
