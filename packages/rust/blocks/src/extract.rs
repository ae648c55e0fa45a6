//! Text extraction: flatten a content tree into the ordered list of
//! translatable strings.
//!
//! The walk is depth-first, pre-order. For each node: its own spans, then
//! image caption spans, then table-row cells (cell by cell, span by span),
//! then its children. [`crate::reconstruct`] consumes translations in exactly
//! this order, so both walks must skip the same spans. Unsupported nodes
//! are dropped on reconstruction, so their whole subtree is skipped here too.

use crate::model::{ContentNode, NodeKind, TextSpan};

/// Collect every translatable span's content, in walk order.
pub fn extract_texts(nodes: &[ContentNode]) -> Vec<String> {
    let mut out = Vec::new();
    collect_nodes(nodes, &mut out);
    out
}

/// Number of strings [`extract_texts`] would return, without allocating them.
pub fn count_translatable(nodes: &[ContentNode]) -> usize {
    nodes
        .iter()
        .filter(|node| node.kind.is_supported())
        .map(|node| {
            let own = node_spans(&node.kind)
                .into_iter()
                .flatten()
                .filter(|s| s.is_translatable())
                .count();
            own + count_translatable(&node.children)
        })
        .sum()
}

/// Concatenated text of a tree, one line per block, cut at `max_chars` characters.
///
/// Includes non-translatable spans (mentions render their plain text).
pub fn plain_text(nodes: &[ContentNode], max_chars: usize) -> String {
    let mut lines = Vec::new();
    collect_lines(nodes, &mut lines);
    let joined = lines.join("\n");
    match joined.char_indices().nth(max_chars) {
        Some((idx, _)) => joined[..idx].to_string(),
        None => joined,
    }
}

fn collect_nodes(nodes: &[ContentNode], out: &mut Vec<String>) {
    for node in nodes.iter().filter(|n| n.kind.is_supported()) {
        for spans in node_spans(&node.kind) {
            push_translatable(spans, out);
        }
        collect_nodes(&node.children, out);
    }
}

fn push_translatable(spans: &[TextSpan], out: &mut Vec<String>) {
    out.extend(
        spans
            .iter()
            .filter(|s| s.is_translatable())
            .map(|s| s.content.clone()),
    );
}

/// Span groups of one node, in extraction order.
fn node_spans(kind: &NodeKind) -> Vec<&[TextSpan]> {
    match kind {
        NodeKind::Paragraph(b)
        | NodeKind::Heading1(b)
        | NodeKind::Heading2(b)
        | NodeKind::Heading3(b)
        | NodeKind::BulletedListItem(b)
        | NodeKind::NumberedListItem(b)
        | NodeKind::Quote(b)
        | NodeKind::Toggle(b) => vec![b.rich_text.as_slice()],
        NodeKind::ToDo(b) => vec![b.rich_text.as_slice()],
        NodeKind::Callout(b) => vec![b.rich_text.as_slice()],
        NodeKind::Image(img) => vec![img.caption.as_slice()],
        NodeKind::TableRow(row) => row.cells.iter().map(Vec::as_slice).collect(),
        NodeKind::PassThrough(b) => b.rich_text.iter().map(Vec::as_slice).collect(),
        NodeKind::Table(_) | NodeKind::Divider | NodeKind::Unsupported { .. } => Vec::new(),
    }
}

fn collect_lines(nodes: &[ContentNode], lines: &mut Vec<String>) {
    for node in nodes.iter().filter(|n| n.kind.is_supported()) {
        let line = node_spans(&node.kind)
            .into_iter()
            .map(|spans| spans.iter().map(|s| s.content.as_str()).collect::<String>())
            .filter(|text| !text.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" | ");
        if !line.is_empty() {
            lines.push(line);
        }
        collect_lines(&node.children, lines);
    }
}
