//! Test doubles shared by this crate's unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lingoflow_llm::{CompletionClient, CompletionRequest};
use lingoflow_shared::{LingoflowError, Result};

type Responder = dyn Fn(&CompletionRequest) -> Result<String> + Send + Sync;
type Delay = dyn Fn(&CompletionRequest) -> Duration + Send + Sync;

/// Completion client answering from a closure and recording every request.
pub struct ScriptedCompletion {
    respond: Box<Responder>,
    delay: Box<Delay>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new(respond: impl Fn(&CompletionRequest) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            delay: Box::new(|_| Duration::ZERO),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Translates every segment as `EN:<segment>` and answers SEO prompts with fixed metadata.
    pub fn prefixing() -> Self {
        Self::new(|req| {
            if let Some(segments) = input_segments(&req.prompt) {
                let out: Vec<String> = segments.iter().map(|s| format!("EN:{s}")).collect();
                return Ok(serde_json::json!({ "segments": out }).to_string());
            }
            Ok(serde_json::json!({
                "meta_title": "Meta",
                "description": "Desc",
                "keywords": ["k1", "k2"],
                "tags": ["Investment"],
                "translated_tags": {"touzi": "Investing"}
            })
            .to_string())
        })
    }

    /// Always fails.
    pub fn failing() -> Self {
        Self::new(|_| Err(LingoflowError::Completion("service unavailable".into())))
    }

    pub fn with_delay(
        mut self,
        delay: impl Fn(&CompletionRequest) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Box::new(delay);
        self
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.calls.lock().unwrap().push(request.clone());
        let delay = (self.delay)(&request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(&request)
    }
}

/// Segments embedded in a translation prompt, if it is one.
pub fn input_segments(prompt: &str) -> Option<Vec<String>> {
    let (_, json) = prompt.split_once("[INPUT JSON]")?;
    serde_json::from_str(json.trim()).ok()
}
