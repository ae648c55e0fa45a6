//! Document store interface and the Notion HTTP adapter.
//!
//! The pipeline only talks to the store through [`DocumentStore`]. Every
//! child list in a write, top-level or nested, is limited to
//! [`MAX_CHILDREN_PER_WRITE`] nodes; use [`create_with_children`] and
//! [`append_all`] to write larger trees.

pub mod fetch;
pub mod memory;
pub mod notion;
pub mod properties;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lingoflow_blocks::{ContentNode, FetchedBlock};
use lingoflow_shared::Result;

pub use fetch::{append_all, create_with_children, fetch_tree};
pub use memory::InMemoryStore;
pub use notion::NotionClient;
pub use properties::{Properties, PropertyValue, parse_properties, properties_to_json, text_of};

/// Most nodes a single child list in a create or append call may carry.
pub const MAX_CHILDREN_PER_WRITE: usize = 100;

/// Length of the longest child list in `nodes`, the list itself included.
pub(crate) fn widest_child_list(nodes: &[ContentNode]) -> usize {
    nodes
        .iter()
        .map(|n| widest_child_list(&n.children))
        .fold(nodes.len(), usize::max)
}

// ---------------------------------------------------------------------------
// Pages of results
// ---------------------------------------------------------------------------

/// One page of a node's children.
#[derive(Debug, Clone, Default)]
pub struct ChildrenPage {
    pub items: Vec<FetchedBlock>,
    /// Cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

/// A document as listed by a collection query.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub id: String,
    pub properties: Properties,
    pub created_time: DateTime<Utc>,
}

/// One page of a collection query.
#[derive(Debug, Clone, Default)]
pub struct DocumentPage {
    pub items: Vec<DocumentRecord>,
    pub next_cursor: Option<String>,
}

// ---------------------------------------------------------------------------
// Collection queries
// ---------------------------------------------------------------------------

/// A single property condition.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyFilter {
    Checkbox { property: String, equals: bool },
    Select { property: String, equals: String },
}

/// Filter and ordering for [`DocumentStore::query_collection`]. All filters must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionQuery {
    pub filters: Vec<PropertyFilter>,
    /// Sort by creation time, newest first.
    pub newest_first: bool,
}

impl CollectionQuery {
    /// Documents whose checkbox `property` is ticked.
    pub fn checked(property: impl Into<String>) -> Self {
        Self {
            filters: vec![PropertyFilter::Checkbox {
                property: property.into(),
                equals: true,
            }],
            newest_first: false,
        }
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

/// The workspace store holding source and destination documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// One page of the direct children of a document or node.
    async fn list_children(&self, node_id: &str, cursor: Option<&str>) -> Result<ChildrenPage>;

    /// Create a document in a collection and return its id.
    /// No child list in `children`, at any depth, exceeds [`MAX_CHILDREN_PER_WRITE`] nodes.
    async fn create_document(
        &self,
        collection_id: &str,
        properties: &Properties,
        children: &[ContentNode],
    ) -> Result<String>;

    /// Append nodes to the end of a document or block and return the ids of
    /// the appended top-level nodes, in order. No child list in the request,
    /// at any depth, may exceed [`MAX_CHILDREN_PER_WRITE`] nodes.
    async fn append_children(&self, parent_id: &str, nodes: &[ContentNode]) -> Result<Vec<String>>;

    async fn update_properties(&self, document_id: &str, properties: &Properties) -> Result<()>;

    async fn get_properties(&self, document_id: &str) -> Result<Properties>;

    /// One page of a collection's documents.
    async fn query_collection(
        &self,
        collection_id: &str,
        query: &CollectionQuery,
        cursor: Option<&str>,
    ) -> Result<DocumentPage>;
}
