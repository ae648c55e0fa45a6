//! Tree reconstruction: rebuild a content tree with translated text
//! re-inserted positionally.
//!
//! Translations are consumed from a [`TranslationCursor`] in the same order
//! [`crate::extract::extract_texts`] produced the originals. The output tree
//! carries no store identifiers and is ready to be written as new content.

use tracing::{debug, warn};

use crate::model::{
    CalloutBlock, ContentNode, ImageBlock, ImageSource, NodeKind, PassThroughBlock, TableRowBlock,
    TextBlock, TextSpan, ToDoBlock,
};

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Position in the translated-text supply.
///
/// When the supply runs out, the original text is kept and counted as a
/// fallback instead of failing the whole reconstruction.
#[derive(Debug)]
pub struct TranslationCursor<'a> {
    supply: &'a [String],
    index: usize,
    fallbacks: usize,
}

impl<'a> TranslationCursor<'a> {
    pub fn new(supply: &'a [String]) -> Self {
        Self {
            supply,
            index: 0,
            fallbacks: 0,
        }
    }

    /// Take the next translated string, or `original` when the supply is exhausted.
    pub fn next_for(&mut self, original: &str) -> String {
        match self.supply.get(self.index) {
            Some(text) => {
                self.index += 1;
                text.clone()
            }
            None => {
                self.fallbacks += 1;
                original.to_string()
            }
        }
    }

    pub fn report(&self) -> CursorReport {
        CursorReport {
            consumed: self.index,
            leftover: self.supply.len().saturating_sub(self.index),
            fallbacks: self.fallbacks,
        }
    }
}

/// How the supply lined up with the tree after reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorReport {
    /// Translated strings placed into the tree.
    pub consumed: usize,
    /// Translated strings never used.
    pub leftover: usize,
    /// Spans that kept their original text because the supply ran out.
    pub fallbacks: usize,
}

impl CursorReport {
    /// True when every translated string was used exactly once.
    pub fn is_aligned(&self) -> bool {
        self.leftover == 0 && self.fallbacks == 0
    }
}

// ---------------------------------------------------------------------------
// Reconstruction
// ---------------------------------------------------------------------------

/// Rebuild `nodes` using `translated` for every translatable span.
pub fn reconstruct(nodes: &[ContentNode], translated: &[String]) -> Vec<ContentNode> {
    reconstruct_with_report(nodes, translated).0
}

/// Like [`reconstruct`], also returning how the supply lined up.
pub fn reconstruct_with_report(
    nodes: &[ContentNode],
    translated: &[String],
) -> (Vec<ContentNode>, CursorReport) {
    let mut cursor = TranslationCursor::new(translated);
    let rebuilt = rebuild_nodes(nodes, &mut cursor);
    let report = cursor.report();

    if report.fallbacks > 0 {
        warn!(
            fallbacks = report.fallbacks,
            supplied = translated.len(),
            "translation supply exhausted, original text kept"
        );
    }
    if report.leftover > 0 {
        warn!(
            leftover = report.leftover,
            consumed = report.consumed,
            "translated strings left unused after reconstruction"
        );
    }

    (rebuilt, report)
}

fn rebuild_nodes(nodes: &[ContentNode], cursor: &mut TranslationCursor<'_>) -> Vec<ContentNode> {
    nodes
        .iter()
        .filter_map(|node| rebuild_node(node, cursor))
        .collect()
}

fn rebuild_node(node: &ContentNode, cursor: &mut TranslationCursor<'_>) -> Option<ContentNode> {
    // Own spans first: the cursor must advance in extraction order.
    let kind = match &node.kind {
        NodeKind::Unsupported { block_type } => {
            debug!(block_type = %block_type, "dropping unsupported block");
            return None;
        }
        NodeKind::Paragraph(b) => NodeKind::Paragraph(rebuild_text_block(b, cursor)),
        NodeKind::Heading1(b) => NodeKind::Heading1(rebuild_text_block(b, cursor)),
        NodeKind::Heading2(b) => NodeKind::Heading2(rebuild_text_block(b, cursor)),
        NodeKind::Heading3(b) => NodeKind::Heading3(rebuild_text_block(b, cursor)),
        NodeKind::BulletedListItem(b) => {
            NodeKind::BulletedListItem(rebuild_text_block(b, cursor))
        }
        NodeKind::NumberedListItem(b) => {
            NodeKind::NumberedListItem(rebuild_text_block(b, cursor))
        }
        NodeKind::Quote(b) => NodeKind::Quote(rebuild_text_block(b, cursor)),
        NodeKind::Toggle(b) => NodeKind::Toggle(rebuild_text_block(b, cursor)),
        NodeKind::ToDo(b) => NodeKind::ToDo(ToDoBlock {
            rich_text: rebuild_spans(&b.rich_text, cursor),
            checked: b.checked,
            color: b.color.clone(),
        }),
        NodeKind::Callout(b) => NodeKind::Callout(CalloutBlock {
            rich_text: rebuild_spans(&b.rich_text, cursor),
            icon: b.icon.clone(),
            color: b.color.clone(),
        }),
        NodeKind::Image(img) => NodeKind::Image(ImageBlock {
            source: stabilize_source(&img.source),
            caption: rebuild_spans(&img.caption, cursor),
        }),
        NodeKind::TableRow(row) => NodeKind::TableRow(TableRowBlock {
            cells: row
                .cells
                .iter()
                .map(|cell| rebuild_spans(cell, cursor))
                .collect(),
        }),
        NodeKind::Table(table) => NodeKind::Table(table.clone()),
        NodeKind::Divider => NodeKind::Divider,
        NodeKind::PassThrough(b) => NodeKind::PassThrough(PassThroughBlock {
            block_type: b.block_type.clone(),
            rich_text: b.rich_text.as_ref().map(|spans| rebuild_spans(spans, cursor)),
            payload: b.payload.clone(),
        }),
    };

    Some(ContentNode {
        id: None,
        kind,
        children: rebuild_nodes(&node.children, cursor),
    })
}

fn rebuild_text_block(block: &TextBlock, cursor: &mut TranslationCursor<'_>) -> TextBlock {
    TextBlock {
        rich_text: rebuild_spans(&block.rich_text, cursor),
        color: block.color.clone(),
    }
}

fn rebuild_spans(spans: &[TextSpan], cursor: &mut TranslationCursor<'_>) -> Vec<TextSpan> {
    spans
        .iter()
        .map(|span| {
            if !span.is_translatable() {
                return span.clone();
            }
            TextSpan {
                content: cursor.next_for(&span.content),
                ..span.clone()
            }
        })
        .collect()
}

/// Store-hosted files cannot be re-attached to a new document, so they are
/// referenced by URL instead. The signed URL still expires.
fn stabilize_source(source: &ImageSource) -> ImageSource {
    match source {
        ImageSource::External { url } => ImageSource::External { url: url.clone() },
        ImageSource::File { url, expiry_time } => {
            warn!(
                url = %url,
                expiry_time = expiry_time.as_deref().unwrap_or("unknown"),
                "store-hosted image rewritten as external link; the URL will expire"
            );
            ImageSource::External { url: url.clone() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_texts;
    use crate::model::{Annotations, SpanKind, TableBlock};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn sample_tree() -> Vec<ContentNode> {
        let bold = TextSpan {
            annotations: Annotations {
                bold: true,
                ..Annotations::default()
            },
            ..TextSpan::plain("粗体")
        };
        let heading = ContentNode::new(NodeKind::Heading2(TextBlock {
            rich_text: vec![bold, TextSpan::plain(" "), TextSpan::linked("链接", "https://a.test")],
            color: Some("blue".into()),
        }))
        .with_id("h1");
        let list = ContentNode::new(NodeKind::BulletedListItem(TextBlock::from_text("一")))
            .with_id("li")
            .with_children(vec![
                ContentNode::new(NodeKind::ToDo(ToDoBlock {
                    rich_text: vec![TextSpan::plain("二")],
                    checked: true,
                    color: None,
                }))
                .with_id("todo"),
            ]);
        let image = ContentNode::new(NodeKind::Image(ImageBlock {
            source: ImageSource::External {
                url: "https://img.test/x.png".into(),
            },
            caption: vec![TextSpan::plain("图")],
        }));
        let table = ContentNode::new(NodeKind::Table(TableBlock {
            width: 2,
            has_column_header: true,
            has_row_header: true,
        }))
        .with_children(vec![ContentNode::new(NodeKind::TableRow(TableRowBlock {
            cells: vec![vec![TextSpan::plain("甲")], vec![TextSpan::plain("乙")]],
        }))]);
        vec![heading, list, image, ContentNode::new(NodeKind::Divider), table]
    }

    #[test]
    fn extraction_and_reconstruction_stay_aligned() {
        let tree = sample_tree();
        let texts = extract_texts(&tree);
        let translated: Vec<String> = texts.iter().map(|t| format!("T({t})")).collect();

        let (rebuilt, report) = reconstruct_with_report(&tree, &translated);
        assert!(report.is_aligned());
        assert_eq!(report.consumed, texts.len());
        assert_eq!(extract_texts(&rebuilt), translated);
    }

    #[test]
    fn identity_translation_round_trips_supported_tree() {
        let tree = sample_tree();
        let rebuilt = reconstruct(&tree, &extract_texts(&tree));

        let expected: Vec<ContentNode> = tree.iter().map(strip_ids).collect();
        assert_eq!(rebuilt, expected);
    }

    fn strip_ids(node: &ContentNode) -> ContentNode {
        ContentNode {
            id: None,
            kind: node.kind.clone(),
            children: node.children.iter().map(strip_ids).collect(),
        }
    }

    #[test]
    fn styles_and_links_survive_translation() {
        let tree = sample_tree();
        let rebuilt = reconstruct(&tree, &strings(&["Bold", "Link", "One", "Two", "Pic", "A", "B"]));

        let NodeKind::Heading2(block) = &rebuilt[0].kind else {
            panic!("expected heading");
        };
        assert_eq!(block.rich_text[0].content, "Bold");
        assert!(block.rich_text[0].annotations.bold);
        assert_eq!(block.rich_text[1].content, " ");
        assert_eq!(block.rich_text[2].content, "Link");
        assert_eq!(block.rich_text[2].link.as_deref(), Some("https://a.test"));
        assert_eq!(block.color.as_deref(), Some("blue"));

        let NodeKind::Table(table) = &rebuilt[4].kind else {
            panic!("expected table");
        };
        assert!(table.has_column_header && table.has_row_header);
        assert_eq!(extract_texts(&rebuilt[4].children), ["A", "B"]);
    }

    #[test]
    fn whitespace_spans_pass_through_without_consuming_supply() {
        let tree = vec![ContentNode::new(NodeKind::Paragraph(TextBlock {
            rich_text: vec![
                TextSpan::plain("A"),
                TextSpan::plain("   "),
                TextSpan::plain("B"),
            ],
            color: None,
        }))];

        let (rebuilt, report) = reconstruct_with_report(&tree, &strings(&["X", "Y"]));
        assert!(report.is_aligned());
        let NodeKind::Paragraph(block) = &rebuilt[0].kind else {
            panic!("expected paragraph");
        };
        let contents: Vec<&str> = block.rich_text.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, ["X", "   ", "Y"]);
    }

    #[test]
    fn opaque_spans_pass_through() {
        let mention = TextSpan {
            content: "@Ann".into(),
            annotations: Annotations::default(),
            link: None,
            kind: SpanKind::Opaque {
                kind: "mention".into(),
                payload: serde_json::json!({"type": "user"}),
            },
        };
        let tree = vec![ContentNode::new(NodeKind::Paragraph(TextBlock {
            rich_text: vec![TextSpan::plain("你好"), mention.clone()],
            color: None,
        }))];
        let rebuilt = reconstruct(&tree, &strings(&["Hello"]));
        let NodeKind::Paragraph(block) = &rebuilt[0].kind else {
            panic!("expected paragraph");
        };
        assert_eq!(block.rich_text[1], mention);
    }

    #[test]
    fn unsupported_nodes_are_dropped_in_order() {
        let tree = vec![
            ContentNode::paragraph("first"),
            ContentNode::new(NodeKind::Unsupported {
                block_type: "child_page".into(),
            }),
            ContentNode::paragraph("second"),
        ];
        let translated = extract_texts(&tree);
        let (rebuilt, report) = reconstruct_with_report(&tree, &translated);

        assert!(report.is_aligned());
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(extract_texts(&rebuilt), ["first", "second"]);
        assert!(rebuilt.iter().all(|n| matches!(n.kind, NodeKind::Paragraph(_))));
    }

    #[test]
    fn file_images_become_external_with_same_url() {
        let tree = vec![ContentNode::new(NodeKind::Image(ImageBlock {
            source: ImageSource::File {
                url: "https://files.test/a.png?X-Amz-Signature=abc".into(),
                expiry_time: Some("2026-01-01T00:00:00.000Z".into()),
            },
            caption: Vec::new(),
        }))];
        let rebuilt = reconstruct(&tree, &[]);
        let NodeKind::Image(img) = &rebuilt[0].kind else {
            panic!("expected image");
        };
        assert_eq!(
            img.source,
            ImageSource::External {
                url: "https://files.test/a.png?X-Amz-Signature=abc".into()
            }
        );
    }

    #[test]
    fn exhausted_supply_keeps_original_text() {
        let tree = vec![ContentNode::paragraph("一"), ContentNode::paragraph("二")];
        let (rebuilt, report) = reconstruct_with_report(&tree, &strings(&["One"]));
        assert_eq!(extract_texts(&rebuilt), ["One", "二"]);
        assert_eq!(report.fallbacks, 1);
        assert!(!report.is_aligned());
    }

    #[test]
    fn leftover_supply_is_reported() {
        let tree = vec![ContentNode::paragraph("一")];
        let (_, report) = reconstruct_with_report(&tree, &strings(&["One", "Two"]));
        assert_eq!(
            report,
            CursorReport {
                consumed: 1,
                leftover: 1,
                fallbacks: 0
            }
        );
    }

    #[test]
    fn store_ids_are_cleared() {
        let tree = sample_tree();
        let rebuilt = reconstruct(&tree, &extract_texts(&tree));
        assert!(rebuilt[1].id.is_none());
        assert!(rebuilt[1].children[0].id.is_none());
    }
}
