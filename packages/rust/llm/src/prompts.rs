//! Prompt templates and parsers for their JSON answers.

use std::collections::BTreeMap;

use lingoflow_shared::{LanguageCode, LingoflowError, Result};
use serde::Deserialize;

/// System message used for segment translation.
pub const TRANSLATOR_SYSTEM: &str = "You are a professional translator for a personal finance and lifestyle blog.";

/// Instructions for translating one chunk of segments.
pub fn segment_translation_prompt(target: &LanguageCode, segments: &[String]) -> String {
    // Serializing a string slice cannot fail.
    let input = serde_json::to_string(segments).unwrap_or_else(|_| "[]".into());
    format!(
        r#"Target Language: {lang}.

[TASK]
Translate the provided array of text segments.

[RULES]
1. Output strictly a JSON object with a "segments" key containing the array of translations.
2. The output array MUST have exactly {count} items.
3. Do not merge or split segments. Keep a 1-to-1 mapping and the same order.
4. Keep leading and trailing spaces of each segment.
5. Branding: "摸鱼" -> "slow productivity", "Playfish" -> "Playfish".

[INPUT JSON]
{input}"#,
        lang = target.display_name(),
        count = segments.len(),
    )
}

#[derive(Deserialize)]
struct SegmentsAnswer {
    segments: Vec<String>,
}

/// Parse a `{"segments": [...]}` answer. Cardinality is left to the caller.
pub fn parse_segments(raw: &str) -> Result<Vec<String>> {
    let answer: SegmentsAnswer = serde_json::from_str(raw.trim())
        .map_err(|e| LingoflowError::parse(format!("segments answer: {e}")))?;
    Ok(answer.segments)
}

/// Instructions for destination-language SEO metadata.
pub fn seo_meta_prompt(
    target: &LanguageCode,
    title: &str,
    preview: &str,
    original_tags: &[String],
) -> String {
    format!(
        r#"You are an SEO expert.

[OBJECTIVE]
Generate SEO metadata for the provided article in the TARGET LANGUAGE: {lang}

[INPUTS]
Title: {title}
Content Snippet: {preview}
Original Tags: {tags} (translate these)

[REQUIREMENTS]
1. meta_title: SEO optimized, under 60 chars.
2. description: engaging summary, under 160 chars.
3. keywords: 3-5 comma separated keywords.
4. tags: the original tags translated to {lang}.
5. translated_tags: map each original tag slug to its translated name.

[OUTPUT JSON]
{{"meta_title": "...", "description": "...", "keywords": "...", "tags": ["..."], "translated_tags": {{"slug": "Name"}}}}"#,
        lang = target.display_name(),
        tags = original_tags.join(", "),
    )
}

/// SEO fields generated for a destination document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SeoMeta {
    #[serde(default)]
    pub meta_title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "keywords_as_string")]
    pub keywords: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub translated_tags: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Keywords {
    Text(String),
    List(Vec<String>),
}

fn keywords_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Keywords::deserialize(deserializer)? {
        Keywords::Text(s) => s,
        Keywords::List(items) => items.join(", "),
    })
}

/// Parse the SEO answer.
pub fn parse_seo_meta(raw: &str) -> Result<SeoMeta> {
    serde_json::from_str(raw.trim()).map_err(|e| LingoflowError::parse(format!("seo answer: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_prompt_names_language_count_and_input() {
        let prompt = segment_translation_prompt(
            &LanguageCode::new("zh-hant"),
            &["你好".to_string(), "世界".to_string()],
        );
        assert!(prompt.contains("Traditional Chinese"));
        assert!(prompt.contains("exactly 2 items"));
        assert!(prompt.contains(r#"["你好","世界"]"#));
    }

    #[test]
    fn parses_segments_answer() {
        assert_eq!(
            parse_segments(r#" {"segments": ["a", "b"]} "#).unwrap(),
            ["a", "b"]
        );
        assert!(parse_segments(r#"{"translations": ["a"]}"#).is_err());
        assert!(parse_segments(r#"{"segments": ["a", 1]}"#).is_err());
        assert!(parse_segments("not json").is_err());
    }

    #[test]
    fn seo_keywords_accept_string_or_list() {
        let meta = parse_seo_meta(
            r#"{"meta_title": "T", "description": "D", "keywords": ["a", "b"],
                "tags": ["Investing"], "translated_tags": {"touzi": "Investing"}}"#,
        )
        .unwrap();
        assert_eq!(meta.keywords, "a, b");
        assert_eq!(meta.translated_tags["touzi"], "Investing");

        let meta = parse_seo_meta(r#"{"meta_title": "T", "keywords": "x, y"}"#).unwrap();
        assert_eq!(meta.keywords, "x, y");
        assert!(meta.tags.is_empty());
    }

    #[test]
    fn seo_prompt_lists_tags() {
        let prompt = seo_meta_prompt(
            &LanguageCode::new("en"),
            "Title",
            "preview",
            &["investing".into(), "fire".into()],
        );
        assert!(prompt.contains("investing, fire"));
        assert!(prompt.contains("TARGET LANGUAGE: English"));
    }
}
