//! In-memory [`DocumentStore`] used by tests across the workspace.
//!
//! Nodes are kept flat (id → node, parent → ordered child ids) so listing
//! and pagination behave like the real store. Every create/append call is
//! recorded with its size.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lingoflow_blocks::{ContentNode, FetchedBlock};
use lingoflow_shared::{LingoflowError, Result};

use crate::{
    ChildrenPage, CollectionQuery, DocumentPage, DocumentRecord, DocumentStore,
    MAX_CHILDREN_PER_WRITE, Properties, PropertyFilter, PropertyValue, widest_child_list,
};

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug)]
struct MemoryDocument {
    collection_id: String,
    properties: Properties,
    created_time: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    nodes: HashMap<String, ContentNode>,
    children: HashMap<String, Vec<String>>,
    documents: HashMap<String, MemoryDocument>,
    /// Document ids in insertion order.
    document_order: Vec<String>,
    writes: HashMap<String, Vec<usize>>,
    failing_lists: HashSet<String>,
    fail_writes: bool,
    next_id: usize,
}

impl MemoryState {
    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    /// Insert `nodes` under `parent` and return their ids.
    fn insert_nodes(&mut self, parent: &str, nodes: &[ContentNode]) -> Vec<String> {
        let mut ids = Vec::with_capacity(nodes.len());
        for node in nodes {
            let id = self.fresh_id("node");
            let flat = ContentNode {
                id: Some(id.clone()),
                kind: node.kind.clone(),
                children: Vec::new(),
            };
            self.nodes.insert(id.clone(), flat);
            self.children
                .entry(parent.to_string())
                .or_default()
                .push(id.clone());
            self.insert_nodes(&id, &node.children);
            ids.push(id);
        }
        ids
    }

    fn build_tree(&self, parent: &str) -> Vec<ContentNode> {
        self.children
            .get(parent)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.nodes.get(id))
                    .map(|node| ContentNode {
                        children: self.build_tree(node.id.as_deref().unwrap_or_default()),
                        ..node.clone()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check_write(&self, nodes: &[ContentNode]) -> Result<()> {
        if self.fail_writes {
            return Err(LingoflowError::store_status(503, "writes are disabled"));
        }
        let widest = widest_child_list(nodes);
        if widest > MAX_CHILDREN_PER_WRITE {
            return Err(LingoflowError::store_status(
                400,
                format!(
                    "body.children.length should be ≤ {MAX_CHILDREN_PER_WRITE}, instead was {widest}"
                ),
            ));
        }
        Ok(())
    }
}

/// Thread-safe in-memory store.
#[derive(Debug)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    page_size: usize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// A store that returns at most `page_size` items per listing page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            page_size: page_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a document with content, created now. Returns its id.
    pub fn seed_document(
        &self,
        collection_id: &str,
        properties: Properties,
        tree: Vec<ContentNode>,
    ) -> String {
        self.seed_document_at(collection_id, properties, Utc::now(), tree)
    }

    /// Add a document with an explicit creation time.
    pub fn seed_document_at(
        &self,
        collection_id: &str,
        properties: Properties,
        created_time: DateTime<Utc>,
        tree: Vec<ContentNode>,
    ) -> String {
        let mut state = self.lock();
        let id = state.fresh_id("doc");
        state.documents.insert(
            id.clone(),
            MemoryDocument {
                collection_id: collection_id.to_string(),
                properties,
                created_time,
            },
        );
        state.document_order.push(id.clone());
        state.insert_nodes(&id, &tree);
        id
    }

    /// Make every listing of `node_id` fail.
    pub fn fail_listing(&self, node_id: &str) {
        self.lock().failing_lists.insert(node_id.to_string());
    }

    /// Make every create/append call fail.
    pub fn fail_writes(&self) {
        self.lock().fail_writes = true;
    }

    /// Ids of the direct children of a document or node.
    pub fn child_ids(&self, parent: &str) -> Vec<String> {
        self.lock().children.get(parent).cloned().unwrap_or_default()
    }

    /// Top-level node counts of each create/append call made for a document or block.
    pub fn write_sizes(&self, document_id: &str) -> Vec<usize> {
        self.lock()
            .writes
            .get(document_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Full content tree of a document.
    pub fn document_tree(&self, document_id: &str) -> Vec<ContentNode> {
        self.lock().build_tree(document_id)
    }

    pub fn properties_of(&self, document_id: &str) -> Option<Properties> {
        self.lock()
            .documents
            .get(document_id)
            .map(|d| d.properties.clone())
    }

    /// Ids of the documents in a collection, in insertion order.
    pub fn documents_in(&self, collection_id: &str) -> Vec<String> {
        let state = self.lock();
        state
            .document_order
            .iter()
            .filter(|id| {
                state
                    .documents
                    .get(*id)
                    .is_some_and(|d| d.collection_id == collection_id)
            })
            .cloned()
            .collect()
    }
}

fn matches_filter(props: &Properties, filter: &PropertyFilter) -> bool {
    match filter {
        PropertyFilter::Checkbox { property, equals } => {
            props.get(property).and_then(PropertyValue::as_bool).unwrap_or(false) == *equals
        }
        PropertyFilter::Select { property, equals } => props
            .get(property)
            .and_then(PropertyValue::plain_text)
            .is_some_and(|name| name == *equals),
    }
}

fn parse_offset(cursor: Option<&str>) -> Result<usize> {
    cursor
        .map(|c| {
            c.parse::<usize>()
                .map_err(|_| LingoflowError::store_status(400, format!("invalid cursor: {c}")))
        })
        .transpose()
        .map(Option::unwrap_or_default)
}

fn page_bounds(len: usize, offset: usize, page_size: usize) -> (usize, usize, Option<String>) {
    let start = offset.min(len);
    let end = (start + page_size).min(len);
    let next = (end < len).then(|| end.to_string());
    (start, end, next)
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn list_children(&self, node_id: &str, cursor: Option<&str>) -> Result<ChildrenPage> {
        let state = self.lock();
        if state.failing_lists.contains(node_id) {
            return Err(LingoflowError::store_status(502, format!("listing {node_id} failed")));
        }
        if !state.nodes.contains_key(node_id) && !state.documents.contains_key(node_id) {
            return Err(LingoflowError::store_status(404, format!("no such block: {node_id}")));
        }

        let ids = state.children.get(node_id).cloned().unwrap_or_default();
        let (start, end, next_cursor) = page_bounds(ids.len(), parse_offset(cursor)?, self.page_size);
        let items = ids[start..end]
            .iter()
            .filter_map(|id| {
                let node = state.nodes.get(id)?.clone();
                let has_children = state.children.get(id).is_some_and(|c| !c.is_empty());
                Some(FetchedBlock { node, has_children })
            })
            .collect();

        Ok(ChildrenPage { items, next_cursor })
    }

    async fn create_document(
        &self,
        collection_id: &str,
        properties: &Properties,
        children: &[ContentNode],
    ) -> Result<String> {
        let mut state = self.lock();
        state.check_write(children)?;

        let id = state.fresh_id("doc");
        state.documents.insert(
            id.clone(),
            MemoryDocument {
                collection_id: collection_id.to_string(),
                properties: properties.clone(),
                created_time: Utc::now(),
            },
        );
        state.document_order.push(id.clone());
        state.insert_nodes(&id, children);
        state.writes.entry(id.clone()).or_default().push(children.len());
        Ok(id)
    }

    async fn append_children(&self, parent_id: &str, nodes: &[ContentNode]) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.check_write(nodes)?;
        if !state.documents.contains_key(parent_id) && !state.nodes.contains_key(parent_id) {
            return Err(LingoflowError::store_status(
                404,
                format!("no such block: {parent_id}"),
            ));
        }
        let ids = state.insert_nodes(parent_id, nodes);
        state
            .writes
            .entry(parent_id.to_string())
            .or_default()
            .push(nodes.len());
        Ok(ids)
    }

    async fn update_properties(&self, document_id: &str, properties: &Properties) -> Result<()> {
        let mut state = self.lock();
        let doc = state.documents.get_mut(document_id).ok_or_else(|| {
            LingoflowError::store_status(404, format!("no such document: {document_id}"))
        })?;
        doc.properties
            .extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn get_properties(&self, document_id: &str) -> Result<Properties> {
        self.properties_of(document_id).ok_or_else(|| {
            LingoflowError::store_status(404, format!("no such document: {document_id}"))
        })
    }

    async fn query_collection(
        &self,
        collection_id: &str,
        query: &CollectionQuery,
        cursor: Option<&str>,
    ) -> Result<DocumentPage> {
        let state = self.lock();
        let mut records: Vec<DocumentRecord> = state
            .document_order
            .iter()
            .filter_map(|id| {
                let doc = state.documents.get(id)?;
                (doc.collection_id == collection_id
                    && query.filters.iter().all(|f| matches_filter(&doc.properties, f)))
                .then(|| DocumentRecord {
                    id: id.clone(),
                    properties: doc.properties.clone(),
                    created_time: doc.created_time,
                })
            })
            .collect();
        if query.newest_first {
            records.sort_by(|a, b| b.created_time.cmp(&a.created_time));
        }

        let (start, end, next_cursor) =
            page_bounds(records.len(), parse_offset(cursor)?, self.page_size);
        Ok(DocumentPage {
            items: records.drain(start..end).collect(),
            next_cursor,
        })
    }
}
