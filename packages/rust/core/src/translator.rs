//! Batch translator: fan text segments out to the completion service in
//! fixed-size chunks and reassemble the answers in input order.
//!
//! A chunk whose answer cannot be used (request error, bad JSON, wrong
//! number of segments, panicked task) falls back to its original strings.
//! The whole call never fails.

use std::sync::Arc;

use lingoflow_llm::{
    CompletionClient, CompletionRequest, parse_segments, prompts::TRANSLATOR_SYSTEM,
    segment_translation_prompt,
};
use lingoflow_shared::LanguageCode;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Translates ordered lists of segments.
#[derive(Clone)]
pub struct Translator {
    client: Arc<dyn CompletionClient>,
    model: String,
    batch_size: usize,
}

impl Translator {
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>, batch_size: usize) -> Self {
        Self {
            client,
            model: model.into(),
            batch_size: batch_size.max(1),
        }
    }

    /// Translate `texts`, returning exactly one string per input, in order.
    #[instrument(skip_all, fields(segments = texts.len(), target = %target))]
    pub async fn translate_texts(&self, texts: &[String], target: &LanguageCode) -> Vec<String> {
        if texts.is_empty() {
            return Vec::new();
        }

        let chunks: Vec<Vec<String>> = texts.chunks(self.batch_size).map(<[String]>::to_vec).collect();
        info!(chunks = chunks.len(), "translating segments");

        let mut set = JoinSet::new();
        for (index, chunk) in chunks.iter().enumerate() {
            let client = Arc::clone(&self.client);
            let model = self.model.clone();
            let target = target.clone();
            let chunk = chunk.clone();
            set.spawn(async move {
                let out = translate_chunk(client.as_ref(), &model, &target, &chunk, index).await;
                (index, out)
            });
        }

        let mut results: Vec<Option<Vec<String>>> = vec![None; chunks.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, out)) => {
                    debug!(chunk = index, "chunk settled");
                    results[index] = Some(out);
                }
                Err(e) => warn!(error = %e, "translation task aborted, keeping originals"),
            }
        }

        results
            .into_iter()
            .zip(chunks)
            .flat_map(|(translated, original)| translated.unwrap_or(original))
            .collect()
    }
}

async fn translate_chunk(
    client: &dyn CompletionClient,
    model: &str,
    target: &LanguageCode,
    chunk: &[String],
    index: usize,
) -> Vec<String> {
    let request = CompletionRequest::json(model, segment_translation_prompt(target, chunk))
        .with_system(TRANSLATOR_SYSTEM);

    let answer = match client.complete(request).await {
        Ok(answer) => answer,
        Err(e) => {
            warn!(chunk = index, error = %e, "chunk translation failed, keeping originals");
            return chunk.to_vec();
        }
    };

    match parse_segments(&answer) {
        Ok(segments) if segments.len() == chunk.len() => segments,
        Ok(segments) => {
            warn!(
                chunk = index,
                sent = chunk.len(),
                received = segments.len(),
                "segment count mismatch, keeping originals"
            );
            chunk.to_vec()
        }
        Err(e) => {
            warn!(chunk = index, error = %e, "unreadable translation, keeping originals");
            chunk.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{ScriptedCompletion, input_segments};
    use lingoflow_shared::LingoflowError;
    use serde_json::json;

    fn items(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("s{i}")).collect()
    }

    fn translator(client: Arc<ScriptedCompletion>, batch_size: usize) -> Translator {
        Translator::new(client, "test-model", batch_size)
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let client = Arc::new(ScriptedCompletion::prefixing());
        let out = translator(client.clone(), 30)
            .translate_texts(&[], &LanguageCode::new("en"))
            .await;
        assert!(out.is_empty());
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn short_answer_falls_back_to_originals() {
        let client = Arc::new(ScriptedCompletion::new(|req| {
            let mut segments = input_segments(&req.prompt).unwrap();
            segments.pop();
            Ok(json!({ "segments": segments }).to_string())
        }));
        let input = items(30);
        let out = translator(client, 30)
            .translate_texts(&input, &LanguageCode::new("en"))
            .await;
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn chunks_are_reassembled_in_input_order() {
        // First chunk settles last.
        let client = Arc::new(
            ScriptedCompletion::prefixing().with_delay(|req| {
                if input_segments(&req.prompt).is_some_and(|s| s[0] == "s0") {
                    Duration::from_millis(80)
                } else {
                    Duration::ZERO
                }
            }),
        );
        let input = items(61);
        let out = translator(client.clone(), 30)
            .translate_texts(&input, &LanguageCode::new("en"))
            .await;

        let expected: Vec<String> = input.iter().map(|s| format!("EN:{s}")).collect();
        assert_eq!(out, expected);
        assert_eq!(client.calls().len(), 3);
        assert!(client.calls().iter().all(|c| c.json_mode && c.model == "test-model"));
    }

    #[tokio::test]
    async fn failed_chunk_keeps_originals_without_affecting_others() {
        let client = Arc::new(ScriptedCompletion::new(|req| {
            let segments = input_segments(&req.prompt).unwrap();
            if segments[0] == "s2" {
                return Err(LingoflowError::Completion("timeout".into()));
            }
            let out: Vec<String> = segments.iter().map(|s| s.to_uppercase()).collect();
            Ok(json!({ "segments": out }).to_string())
        }));
        let out = translator(client, 2)
            .translate_texts(&items(5), &LanguageCode::new("en"))
            .await;
        assert_eq!(out, ["S0", "S1", "s2", "s3", "S4"]);
    }

    #[tokio::test]
    async fn malformed_answer_keeps_originals() {
        let client = Arc::new(ScriptedCompletion::new(|_| Ok("Sure! Here you go".into())));
        let input = items(3);
        let out = translator(client, 30)
            .translate_texts(&input, &LanguageCode::new("zh-hant"))
            .await;
        assert_eq!(out, input);
    }
}
