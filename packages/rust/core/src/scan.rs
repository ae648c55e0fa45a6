//! Task discovery: find published source documents missing a translation.
//!
//! Every document in a collection counts toward its source's languages,
//! published or not, so an unpublished translation awaiting review is not
//! scheduled again.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use lingoflow_shared::{AppConfig, LanguageCode, Result};
use lingoflow_store::{CollectionQuery, DocumentRecord, DocumentStore, PropertyValue, text_of};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::properties::names;

/// A source document and the languages it still lacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationTask {
    pub source_document_id: String,
    pub title: String,
    pub source_key: String,
    /// In configured target-language order.
    pub missing_languages: Vec<LanguageCode>,
    /// Blog theme (category name) the document belongs to.
    pub category: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Default)]
struct SourceGroup<'a> {
    source: Option<&'a DocumentRecord>,
    languages: HashSet<LanguageCode>,
}

/// Scan every configured category and return tasks, newest source first.
#[instrument(skip_all, fields(categories = config.categories.len()))]
pub async fn scan_for_missing_translations(
    store: &dyn DocumentStore,
    config: &AppConfig,
) -> Result<Vec<TranslationTask>> {
    let source_language = &config.translation.source_language;
    let query = CollectionQuery::default().newest_first();
    let mut tasks = Vec::new();

    for category in &config.categories {
        let records = query_all(store, &category.collection_id, &query).await?;

        // BTreeMap keeps task order stable for documents created at the same instant.
        let mut groups: BTreeMap<String, SourceGroup<'_>> = BTreeMap::new();
        for record in &records {
            let (Some(key), Some(lang)) = (
                text_of(&record.properties, names::SOURCE_ID),
                text_of(&record.properties, names::LANG),
            ) else {
                debug!(id = %record.id, "skipping document without SourceID or Lang");
                continue;
            };
            let lang = LanguageCode::new(lang);
            let group = groups.entry(key).or_default();
            if &lang == source_language && is_published(record) {
                group.source = Some(record);
            }
            group.languages.insert(lang);
        }

        for (source_key, group) in groups {
            let Some(source) = group.source else {
                continue;
            };
            let missing: Vec<LanguageCode> = config
                .translation
                .target_languages
                .iter()
                .filter(|lang| !group.languages.contains(*lang))
                .cloned()
                .collect();
            if missing.is_empty() {
                continue;
            }
            tasks.push(TranslationTask {
                source_document_id: source.id.clone(),
                title: text_of(&source.properties, names::TITLE)
                    .unwrap_or_else(|| "Untitled".into()),
                source_key,
                missing_languages: missing,
                category: category.name.clone(),
                published_at: source.created_time,
            });
        }
    }

    tasks.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    info!(tasks = tasks.len(), "scan complete");
    Ok(tasks)
}

fn is_published(record: &DocumentRecord) -> bool {
    matches!(
        record.properties.get(names::PUBLISHED),
        Some(PropertyValue::Checkbox(true))
    )
}

async fn query_all(
    store: &dyn DocumentStore,
    collection_id: &str,
    query: &CollectionQuery,
) -> Result<Vec<DocumentRecord>> {
    let mut records = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = store
            .query_collection(collection_id, query, cursor.as_deref())
            .await?;
        records.extend(page.items);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(records)
}
