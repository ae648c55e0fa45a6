//! Internal link localization.
//!
//! Links of the form `https://<site>/<section>/<slug>` are rewritten to point
//! at the sibling document in the target language. The index is built once
//! per process by [`LinkCache::warm`] and must be ready before use.

use std::collections::HashMap;

use lingoflow_blocks::{ContentNode, SpanKind};
use lingoflow_shared::{CategoryConfig, LanguageCode, LingoflowError, Result};
use lingoflow_store::{CollectionQuery, DocumentStore, text_of};
use regex::Regex;
use tracing::{debug, info, instrument};

use crate::properties::names;

/// Lifecycle of a [`LinkCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Warming,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SlugEntry {
    source_key: String,
    language: LanguageCode,
    section: String,
}

/// Slug index of every published document.
#[derive(Debug)]
pub struct LinkCache {
    state: CacheState,
    site_domain: String,
    pattern: Regex,
    by_slug: HashMap<String, SlugEntry>,
    by_source: HashMap<String, HashMap<LanguageCode, String>>,
}

impl LinkCache {
    pub fn new(site_domain: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(
            r"^https?://(?:www\.)?{}/([^/?#]+)/([^/?#]+)(.*)$",
            regex::escape(site_domain)
        ))
        .map_err(|e| LingoflowError::config(format!("invalid site domain {site_domain}: {e}")))?;

        Ok(Self {
            state: CacheState::Empty,
            site_domain: site_domain.to_string(),
            pattern,
            by_slug: HashMap::new(),
            by_source: HashMap::new(),
        })
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Number of indexed slugs.
    pub fn len(&self) -> usize {
        self.by_slug.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slug.is_empty()
    }

    /// Index every published document of every category. No-op once ready.
    ///
    /// On failure the cache returns to `Empty` and can be warmed again.
    #[instrument(skip_all, fields(categories = categories.len()))]
    pub async fn warm(
        &mut self,
        store: &dyn DocumentStore,
        categories: &[CategoryConfig],
    ) -> Result<()> {
        if self.state == CacheState::Ready {
            return Ok(());
        }

        self.state = CacheState::Warming;
        self.by_slug.clear();
        self.by_source.clear();

        match self.index_categories(store, categories).await {
            Ok(()) => {
                self.state = CacheState::Ready;
                info!(slugs = self.by_slug.len(), "link cache ready");
                Ok(())
            }
            Err(e) => {
                self.state = CacheState::Empty;
                Err(e)
            }
        }
    }

    async fn index_categories(
        &mut self,
        store: &dyn DocumentStore,
        categories: &[CategoryConfig],
    ) -> Result<()> {
        let query = CollectionQuery::checked(names::PUBLISHED);
        for category in categories {
            let section = category.section();
            let mut cursor: Option<String> = None;
            loop {
                let page = store
                    .query_collection(&category.collection_id, &query, cursor.as_deref())
                    .await?;
                for doc in &page.items {
                    let (Some(slug), Some(source_key), Some(lang)) = (
                        text_of(&doc.properties, names::SLUG),
                        text_of(&doc.properties, names::SOURCE_ID),
                        text_of(&doc.properties, names::LANG),
                    ) else {
                        continue;
                    };
                    self.insert(slug, source_key, LanguageCode::new(lang), section.clone());
                }
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, slug: String, source_key: String, language: LanguageCode, section: String) {
        self.by_source
            .entry(source_key.clone())
            .or_default()
            .insert(language.clone(), slug.clone());
        self.by_slug.insert(
            slug,
            SlugEntry {
                source_key,
                language,
                section,
            },
        );
    }

    /// The target-language URL for `url`, if it is an internal link with a known sibling.
    pub fn localize_url(&self, url: &str, target: &LanguageCode) -> Option<String> {
        let caps = self.pattern.captures(url)?;
        let slug = caps.get(2)?.as_str();
        let suffix = caps.get(3).map_or("", |m| m.as_str());

        let entry = self.by_slug.get(slug)?;
        if &entry.language == target {
            return None;
        }
        let target_slug = self.by_source.get(&entry.source_key)?.get(target)?;
        Some(format!(
            "https://{}/{}/{}{}",
            self.site_domain, entry.section, target_slug, suffix
        ))
    }

    /// Copy of `nodes` with internal links rewritten for `target`.
    ///
    /// Only link targets change, so text extraction yields the same strings.
    pub fn localize(&self, nodes: &[ContentNode], target: &LanguageCode) -> Result<Vec<ContentNode>> {
        if self.state != CacheState::Ready {
            return Err(LingoflowError::validation(
                "link cache used before it was warmed",
            ));
        }
        let mut out = nodes.to_vec();
        let rewritten = self.rewrite_nodes(&mut out, target);
        if rewritten > 0 {
            info!(rewritten, target = %target, "localized internal links");
        }
        Ok(out)
    }

    fn rewrite_nodes(&self, nodes: &mut [ContentNode], target: &LanguageCode) -> usize {
        let mut count = 0;
        for node in nodes {
            for spans in node.kind.spans_mut() {
                for span in spans.iter_mut() {
                    if !matches!(span.kind, SpanKind::Text) {
                        continue;
                    }
                    let Some(link) = &span.link else { continue };
                    if let Some(localized) = self.localize_url(link, target) {
                        debug!(from = %link, to = %localized, "rewrote link");
                        span.link = Some(localized);
                        count += 1;
                    }
                }
            }
            count += self.rewrite_nodes(&mut node.children, target);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingoflow_blocks::{NodeKind, TextBlock, TextSpan, extract_texts};
    use lingoflow_store::{InMemoryStore, Properties, PropertyValue};

    fn doc(slug: &str, source: &str, lang: &str, published: bool) -> Properties {
        let mut p = Properties::new();
        p.insert(names::SLUG.into(), PropertyValue::text(slug));
        p.insert(names::SOURCE_ID.into(), PropertyValue::text(source));
        p.insert(names::LANG.into(), PropertyValue::select(lang));
        p.insert(names::PUBLISHED.into(), PropertyValue::Checkbox(published));
        p
    }

    fn categories() -> Vec<CategoryConfig> {
        vec![CategoryConfig {
            name: "FIRE".into(),
            collection_id: "db-fire".into(),
            section: None,
        }]
    }

    async fn warmed_cache() -> LinkCache {
        let store = InMemoryStore::new();
        store.seed_document("db-fire", doc("cn-slug", "src-1", "zh-hans", true), Vec::new());
        store.seed_document("db-fire", doc("en-slug", "src-1", "en", true), Vec::new());
        store.seed_document("db-fire", doc("draft-slug", "src-1", "zh-hant", false), Vec::new());

        let mut cache = LinkCache::new("playfishlab.com").unwrap();
        cache.warm(&store, &categories()).await.unwrap();
        cache
    }

    #[tokio::test]
    async fn warm_moves_cache_to_ready() {
        let cache = warmed_cache().await;
        assert_eq!(cache.state(), CacheState::Ready);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn rewrites_known_links_to_target_sibling() {
        let cache = warmed_cache().await;
        let en = LanguageCode::new("en");
        assert_eq!(
            cache.localize_url("https://playfishlab.com/fire/cn-slug", &en).as_deref(),
            Some("https://playfishlab.com/fire/en-slug")
        );
        assert_eq!(
            cache.localize_url("https://www.playfishlab.com/fire/cn-slug#part", &en).as_deref(),
            Some("https://playfishlab.com/fire/en-slug#part")
        );
        // No published zh-hant sibling.
        assert!(cache
            .localize_url("https://playfishlab.com/fire/cn-slug", &LanguageCode::new("zh-hant"))
            .is_none());
        assert!(cache.localize_url("https://other.com/fire/cn-slug", &en).is_none());
        assert!(cache.localize_url("https://playfishlab.com/fire/unknown", &en).is_none());
    }

    #[tokio::test]
    async fn localize_changes_links_but_not_text() {
        let cache = warmed_cache().await;
        let tree = vec![ContentNode::new(NodeKind::Paragraph(TextBlock {
            rich_text: vec![
                TextSpan::plain("见"),
                TextSpan::linked("这篇", "https://playfishlab.com/fire/cn-slug"),
            ],
            color: None,
        }))
        .with_children(vec![ContentNode::paragraph("子")])];

        let localized = cache.localize(&tree, &LanguageCode::new("en")).unwrap();
        assert_eq!(extract_texts(&localized), extract_texts(&tree));
        let NodeKind::Paragraph(block) = &localized[0].kind else {
            panic!("expected paragraph");
        };
        assert_eq!(
            block.rich_text[1].link.as_deref(),
            Some("https://playfishlab.com/fire/en-slug")
        );
    }

    #[test]
    fn cold_cache_is_rejected() {
        let cache = LinkCache::new("playfishlab.com").unwrap();
        assert_eq!(cache.state(), CacheState::Empty);
        let err = cache.localize(&[], &LanguageCode::new("en")).unwrap_err();
        assert!(matches!(err, LingoflowError::Validation { .. }));
    }

    #[tokio::test]
    async fn failed_warm_returns_to_empty() {
        struct Broken;
        #[async_trait::async_trait]
        impl DocumentStore for Broken {
            async fn list_children(&self, _: &str, _: Option<&str>) -> Result<lingoflow_store::ChildrenPage> {
                unreachable!()
            }
            async fn create_document(&self, _: &str, _: &Properties, _: &[ContentNode]) -> Result<String> {
                unreachable!()
            }
            async fn append_children(&self, _: &str, _: &[ContentNode]) -> Result<Vec<String>> {
                unreachable!()
            }
            async fn update_properties(&self, _: &str, _: &Properties) -> Result<()> {
                unreachable!()
            }
            async fn get_properties(&self, _: &str) -> Result<Properties> {
                unreachable!()
            }
            async fn query_collection(
                &self,
                _: &str,
                _: &CollectionQuery,
                _: Option<&str>,
            ) -> Result<lingoflow_store::DocumentPage> {
                Err(LingoflowError::store_status(500, "boom"))
            }
        }

        let mut cache = LinkCache::new("playfishlab.com").unwrap();
        assert!(cache.warm(&Broken, &categories()).await.is_err());
        assert_eq!(cache.state(), CacheState::Empty);

        let store = InMemoryStore::new();
        assert!(cache.warm(&store, &categories()).await.is_ok());
        assert_eq!(cache.state(), CacheState::Ready);
    }
}
