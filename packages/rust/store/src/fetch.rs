//! Whole-tree reads and chunked writes on top of [`DocumentStore`].

use futures::future::{BoxFuture, FutureExt};
use lingoflow_blocks::ContentNode;
use lingoflow_shared::{LingoflowError, Result};
use tracing::{debug, info, instrument};

use crate::{DocumentStore, MAX_CHILDREN_PER_WRITE, Properties};

/// Fetch the complete content tree under `root_id`.
///
/// Every page of every child list is read in order, and each node the store
/// marks as having children is expanded before it is appended. Any failed
/// page fails the whole fetch.
#[instrument(skip_all, fields(root = %root_id))]
pub async fn fetch_tree(store: &dyn DocumentStore, root_id: &str) -> Result<Vec<ContentNode>> {
    let tree = fetch_children(store, root_id.to_string(), 0).await?;
    let total: usize = tree.iter().map(ContentNode::subtree_len).sum();
    info!(top_level = tree.len(), total, "fetched content tree");
    Ok(tree)
}

fn fetch_children(
    store: &dyn DocumentStore,
    node_id: String,
    depth: usize,
) -> BoxFuture<'_, Result<Vec<ContentNode>>> {
    async move {
        let mut nodes = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = store.list_children(&node_id, cursor.as_deref()).await?;
            pages += 1;
            debug!(node = %node_id, depth, page = pages, items = page.items.len(), "children page");

            for fetched in page.items {
                let mut node = fetched.node;
                if fetched.has_children {
                    let id = node.id.clone().ok_or_else(|| {
                        LingoflowError::parse(format!(
                            "{} block under {node_id} has children but no id",
                            node.kind.type_name()
                        ))
                    })?;
                    node.children = fetch_children(store, id, depth + 1).await?;
                }
                nodes.push(node);
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(nodes)
    }
    .boxed()
}

/// Ids of every direct child of `parent_id`, in order.
async fn child_ids(store: &dyn DocumentStore, parent_id: &str) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = store.list_children(parent_id, cursor.as_deref()).await?;
        for fetched in page.items {
            let id = fetched
                .node
                .id
                .ok_or_else(|| LingoflowError::parse(format!("child of {parent_id} has no id")))?;
            ids.push(id);
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return Ok(ids),
        }
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// A node split for writing: the part sent in one request, plus the
/// children that must be appended once the node exists.
#[derive(Debug)]
struct WritePlan {
    /// The node with at most [`MAX_CHILDREN_PER_WRITE`] children at every level.
    inline: ContentNode,
    /// One plan per inline child, in order.
    children: Vec<WritePlan>,
    /// Children past the limit, appended to this node after it is written.
    overflow: Vec<ContentNode>,
}

impl WritePlan {
    fn new(node: &ContentNode) -> Self {
        let writable: Vec<&ContentNode> =
            node.children.iter().filter(|c| c.kind.is_supported()).collect();
        let split = writable.len().min(MAX_CHILDREN_PER_WRITE);
        let children: Vec<WritePlan> = writable[..split].iter().map(|c| WritePlan::new(c)).collect();
        let overflow = writable[split..].iter().map(|c| (*c).clone()).collect();
        Self {
            inline: ContentNode {
                id: None,
                kind: node.kind.clone(),
                children: children.iter().map(|c| c.inline.clone()).collect(),
            },
            children,
            overflow,
        }
    }

    fn for_nodes(nodes: &[ContentNode]) -> Vec<WritePlan> {
        nodes
            .iter()
            .filter(|n| n.kind.is_supported())
            .map(WritePlan::new)
            .collect()
    }

    /// Whether anything under this node still has to be written after it is created.
    fn has_deferred(&self) -> bool {
        !self.overflow.is_empty() || self.children.iter().any(WritePlan::has_deferred)
    }
}

fn inline_nodes(plans: &[WritePlan]) -> Vec<ContentNode> {
    plans.iter().map(|p| p.inline.clone()).collect()
}

/// Write what `plan` deferred, now that its node exists as `id`.
fn complete_plan<'a>(
    store: &'a dyn DocumentStore,
    id: String,
    plan: &'a WritePlan,
) -> BoxFuture<'a, Result<()>> {
    async move {
        // The inline children are the node's only children until the overflow lands.
        if plan.children.iter().any(WritePlan::has_deferred) {
            let ids = child_ids(store, &id).await?;
            complete_plans(store, &id, ids, &plan.children).await?;
        }
        if !plan.overflow.is_empty() {
            debug!(block = %id, count = plan.overflow.len(), "appending overflow children");
            append_plans(store, &id, &WritePlan::for_nodes(&plan.overflow)).await?;
        }
        Ok(())
    }
    .boxed()
}

fn complete_plans<'a>(
    store: &'a dyn DocumentStore,
    parent_id: &'a str,
    ids: Vec<String>,
    plans: &'a [WritePlan],
) -> BoxFuture<'a, Result<()>> {
    async move {
        if !plans.iter().any(WritePlan::has_deferred) {
            return Ok(());
        }
        if ids.len() != plans.len() {
            return Err(LingoflowError::store(format!(
                "wrote {} blocks under {parent_id} but the store reported {} ids",
                plans.len(),
                ids.len()
            )));
        }
        for (id, plan) in ids.into_iter().zip(plans) {
            if plan.has_deferred() {
                complete_plan(store, id, plan).await?;
            }
        }
        Ok(())
    }
    .boxed()
}

fn append_plans<'a>(
    store: &'a dyn DocumentStore,
    parent_id: &'a str,
    plans: &'a [WritePlan],
) -> BoxFuture<'a, Result<()>> {
    async move {
        for chunk in plans.chunks(MAX_CHILDREN_PER_WRITE) {
            let ids = store.append_children(parent_id, &inline_nodes(chunk)).await?;
            debug!(parent = %parent_id, count = chunk.len(), "appended children");
            complete_plans(store, parent_id, ids, chunk).await?;
        }
        Ok(())
    }
    .boxed()
}

/// Create a document holding `nodes`, splitting the content across as many
/// writes as the per-call limit requires. Returns the new document id.
///
/// Child lists longer than the limit at any depth are written in part with
/// their parent and the rest appended to the parent's new id. Unsupported
/// nodes are not written.
#[instrument(skip_all, fields(collection = %collection_id, nodes = nodes.len()))]
pub async fn create_with_children(
    store: &dyn DocumentStore,
    collection_id: &str,
    properties: &Properties,
    nodes: &[ContentNode],
) -> Result<String> {
    let plans = WritePlan::for_nodes(nodes);
    let split = plans.len().min(MAX_CHILDREN_PER_WRITE);
    let (first, rest) = plans.split_at(split);

    let id = store
        .create_document(collection_id, properties, &inline_nodes(first))
        .await?;
    if first.iter().any(WritePlan::has_deferred) {
        let ids = child_ids(store, &id).await?;
        complete_plans(store, &id, ids, first).await?;
    }
    append_plans(store, &id, rest).await?;
    Ok(id)
}

/// Append `nodes` to a document, keeping every child list of every request
/// within [`MAX_CHILDREN_PER_WRITE`].
pub async fn append_all(
    store: &dyn DocumentStore,
    document_id: &str,
    nodes: &[ContentNode],
) -> Result<()> {
    append_plans(store, document_id, &WritePlan::for_nodes(nodes)).await
}
