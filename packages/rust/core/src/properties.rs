//! Source property snapshot and destination property construction.

use lingoflow_llm::SeoMeta;
use lingoflow_shared::{CategoryConfig, LanguageCode, LingoflowError, Result};
use lingoflow_store::{Properties, PropertyValue, text_of};
use serde::{Deserialize, Serialize};

/// Property names used by the blog collections.
pub mod names {
    pub const TITLE: &str = "Title";
    pub const LANG: &str = "Lang";
    pub const SOURCE_ID: &str = "SourceID";
    pub const DRAFT_ID: &str = "DraftID";
    pub const SLUG: &str = "Slug";
    pub const META_TITLE: &str = "meta-title";
    pub const DESCRIPTION: &str = "Description";
    pub const KEYWORDS: &str = "Keywords";
    pub const TAG: &str = "Tag";
    pub const TAG_SLUG: &str = "tag-slug";
    pub const SECTION: &str = "Section";
    pub const COVER: &str = "Cover";
    pub const PUBLISHED: &str = "Published";
}

/// Fields a translated document inherits from its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub title: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub tag_slugs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub source_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<String>,
}

impl SourceSnapshot {
    /// Read the inherited fields. The stable source key is required.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let source_key = text_of(props, names::SOURCE_ID).ok_or_else(|| {
            LingoflowError::validation("source document has no SourceID")
        })?;

        Ok(Self {
            title: text_of(props, names::TITLE).unwrap_or_default(),
            slug: text_of(props, names::SLUG).unwrap_or_default(),
            cover_url: text_of(props, names::COVER),
            tag_slugs: props
                .get(names::TAG_SLUG)
                .map(|v| v.names().to_vec())
                .unwrap_or_default(),
            section: text_of(props, names::SECTION),
            source_key,
            draft_id: text_of(props, names::DRAFT_ID),
        })
    }
}

/// Properties for a newly created translation. It starts unpublished.
pub fn destination_properties(
    snapshot: &SourceSnapshot,
    translated_title: &str,
    target: &LanguageCode,
    category: &CategoryConfig,
) -> Properties {
    let mut props = Properties::new();
    props.insert(names::TITLE.into(), PropertyValue::title(translated_title));
    props.insert(names::LANG.into(), PropertyValue::select(target.as_str()));
    props.insert(names::SOURCE_ID.into(), PropertyValue::text(&snapshot.source_key));
    props.insert(names::SLUG.into(), PropertyValue::text(&snapshot.slug));
    props.insert(
        names::TAG_SLUG.into(),
        PropertyValue::multi_select(snapshot.tag_slugs.iter().cloned()),
    );
    props.insert(
        names::SECTION.into(),
        PropertyValue::select(
            snapshot
                .section
                .clone()
                .unwrap_or_else(|| category.section()),
        ),
    );
    if let Some(draft_id) = &snapshot.draft_id {
        props.insert(names::DRAFT_ID.into(), PropertyValue::text(draft_id));
    }
    if let Some(cover) = &snapshot.cover_url {
        props.insert(names::COVER.into(), PropertyValue::Url(Some(cover.clone())));
    }
    props.insert(names::PUBLISHED.into(), PropertyValue::Checkbox(false));
    props
}

/// Properties written when a translation is finalized.
///
/// Tag names follow the source's tag slugs, each looked up in the answer's
/// `translated_tags`. When none of the slugs is mapped the plain `tags`
/// list is used instead.
pub fn seo_properties(meta: &SeoMeta, tag_slugs: &[String]) -> Properties {
    let mut props = Properties::new();
    props.insert(names::META_TITLE.into(), PropertyValue::text(&meta.meta_title));
    props.insert(names::DESCRIPTION.into(), PropertyValue::text(&meta.description));
    props.insert(names::KEYWORDS.into(), PropertyValue::text(&meta.keywords));

    let mapped: Vec<String> = tag_slugs
        .iter()
        .filter_map(|slug| meta.translated_tags.get(slug).cloned())
        .collect();
    let tags = if mapped.is_empty() { meta.tags.clone() } else { mapped };
    if !tags.is_empty() {
        props.insert(names::TAG.into(), PropertyValue::multi_select(tags));
    }
    props
}
