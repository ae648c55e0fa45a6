//! Store wire codec: block JSON as the Notion API returns and accepts it.
//!
//! A block object names its type in `type` and carries the type-specific
//! payload under a key of the same name:
//!
//! ```json
//! {"id": "…", "type": "paragraph", "has_children": false,
//!  "paragraph": {"rich_text": [...], "color": "default"}}
//! ```

use lingoflow_shared::{LingoflowError, Result};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::model::{
    Annotations, CalloutBlock, ContentNode, ImageBlock, ImageSource, NodeKind, PassThroughBlock,
    SpanKind, TableBlock, TableRowBlock, TextBlock, TextSpan, ToDoBlock,
};

/// Longest text content the store accepts in one rich-text object.
pub const MAX_TEXT_CHARS: usize = 2000;

/// A parsed block plus whether the store says it has children to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedBlock {
    pub node: ContentNode,
    pub has_children: bool,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct BlockWire {
    id: Option<String>,
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    has_children: bool,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Deserialize)]
struct TextPayloadWire {
    #[serde(default)]
    rich_text: Vec<Value>,
    color: Option<String>,
}

#[derive(Deserialize)]
struct ToDoWire {
    #[serde(default)]
    rich_text: Vec<Value>,
    #[serde(default)]
    checked: bool,
    color: Option<String>,
}

#[derive(Deserialize)]
struct CalloutWire {
    #[serde(default)]
    rich_text: Vec<Value>,
    icon: Option<Value>,
    color: Option<String>,
}

#[derive(Deserialize)]
struct UrlWire {
    url: String,
    expiry_time: Option<String>,
}

#[derive(Deserialize)]
struct ImageWire {
    #[serde(rename = "type")]
    source_type: String,
    external: Option<UrlWire>,
    file: Option<UrlWire>,
    #[serde(default)]
    caption: Vec<Value>,
}

#[derive(Deserialize)]
struct TableWire {
    table_width: u32,
    #[serde(default)]
    has_column_header: bool,
    #[serde(default)]
    has_row_header: bool,
}

#[derive(Deserialize)]
struct TableRowWire {
    #[serde(default)]
    cells: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct RichTextWire {
    #[serde(rename = "type")]
    kind: String,
    text: Option<TextContentWire>,
    #[serde(default)]
    annotations: Annotations,
    plain_text: Option<String>,
    href: Option<String>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Deserialize)]
struct TextContentWire {
    content: String,
    link: Option<LinkWire>,
}

#[derive(Deserialize)]
struct LinkWire {
    url: String,
}

/// Decode one block object from a children listing.
pub fn parse_block(value: Value) -> Result<FetchedBlock> {
    let mut wire: BlockWire = serde_json::from_value(value)
        .map_err(|e| LingoflowError::parse(format!("malformed block: {e}")))?;
    let payload = wire.rest.remove(&wire.block_type).unwrap_or(Value::Null);

    let kind = match wire.block_type.as_str() {
        "paragraph" => NodeKind::Paragraph(text_block(payload, &wire.block_type)?),
        "heading_1" => NodeKind::Heading1(text_block(payload, &wire.block_type)?),
        "heading_2" => NodeKind::Heading2(text_block(payload, &wire.block_type)?),
        "heading_3" => NodeKind::Heading3(text_block(payload, &wire.block_type)?),
        "bulleted_list_item" => NodeKind::BulletedListItem(text_block(payload, &wire.block_type)?),
        "numbered_list_item" => NodeKind::NumberedListItem(text_block(payload, &wire.block_type)?),
        "quote" => NodeKind::Quote(text_block(payload, &wire.block_type)?),
        "toggle" => NodeKind::Toggle(text_block(payload, &wire.block_type)?),
        "to_do" => {
            let p: ToDoWire = payload_as(payload, &wire.block_type)?;
            NodeKind::ToDo(ToDoBlock {
                rich_text: parse_rich_text(&p.rich_text)?,
                checked: p.checked,
                color: p.color,
            })
        }
        "callout" => {
            let p: CalloutWire = payload_as(payload, &wire.block_type)?;
            NodeKind::Callout(CalloutBlock {
                rich_text: parse_rich_text(&p.rich_text)?,
                icon: p.icon,
                color: p.color,
            })
        }
        "image" => NodeKind::Image(image_block(payload_as(payload, "image")?)?),
        "table" => {
            let p: TableWire = payload_as(payload, &wire.block_type)?;
            NodeKind::Table(TableBlock {
                width: p.table_width,
                has_column_header: p.has_column_header,
                has_row_header: p.has_row_header,
            })
        }
        "table_row" => {
            let p: TableRowWire = payload_as(payload, &wire.block_type)?;
            NodeKind::TableRow(TableRowBlock {
                cells: p
                    .cells
                    .iter()
                    .map(|cell| parse_rich_text(cell))
                    .collect::<Result<_>>()?,
            })
        }
        "divider" => NodeKind::Divider,
        "child_page" | "child_database" | "unsupported" => NodeKind::Unsupported {
            block_type: wire.block_type.clone(),
        },
        _ => NodeKind::PassThrough(pass_through_block(payload, &wire.block_type)?),
    };

    Ok(FetchedBlock {
        node: ContentNode {
            id: wire.id,
            kind,
            children: Vec::new(),
        },
        has_children: wire.has_children,
    })
}

fn payload_as<T: serde::de::DeserializeOwned>(payload: Value, block_type: &str) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| LingoflowError::parse(format!("malformed {block_type} payload: {e}")))
}

fn text_block(payload: Value, block_type: &str) -> Result<TextBlock> {
    let p: TextPayloadWire = payload_as(payload, block_type)?;
    Ok(TextBlock {
        rich_text: parse_rich_text(&p.rich_text)?,
        color: p.color,
    })
}

fn pass_through_block(payload: Value, block_type: &str) -> Result<PassThroughBlock> {
    let mut payload = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(LingoflowError::parse(format!(
                "{block_type} payload is not an object: {other}"
            )));
        }
    };
    // Children are fetched and written as nodes, never inline.
    payload.remove("children");
    let rich_text = match payload.remove("rich_text") {
        Some(Value::Array(items)) => Some(parse_rich_text(&items)?),
        Some(other) => {
            return Err(LingoflowError::parse(format!(
                "{block_type} rich_text is not an array: {other}"
            )));
        }
        None => None,
    };
    Ok(PassThroughBlock {
        block_type: block_type.to_string(),
        rich_text,
        payload,
    })
}

fn image_block(p: ImageWire) -> Result<ImageBlock> {
    let source = match (p.source_type.as_str(), p.external, p.file) {
        ("external", Some(ext), _) => ImageSource::External { url: ext.url },
        ("file", _, Some(file)) => ImageSource::File {
            url: file.url,
            expiry_time: file.expiry_time,
        },
        (other, _, _) => {
            return Err(LingoflowError::parse(format!(
                "image source '{other}' has no url"
            )));
        }
    };
    Ok(ImageBlock {
        source,
        caption: parse_rich_text(&p.caption)?,
    })
}

/// Decode a rich-text array into spans.
pub fn parse_rich_text(items: &[Value]) -> Result<Vec<TextSpan>> {
    items.iter().map(parse_span).collect()
}

fn parse_span(value: &Value) -> Result<TextSpan> {
    let mut wire: RichTextWire = serde_json::from_value(value.clone())
        .map_err(|e| LingoflowError::parse(format!("malformed rich text: {e}")))?;

    if wire.kind == "text" {
        let text = wire
            .text
            .ok_or_else(|| LingoflowError::parse("text span without text payload"))?;
        return Ok(TextSpan {
            content: text.content,
            annotations: wire.annotations,
            link: text.link.map(|l| l.url),
            kind: SpanKind::Text,
        });
    }

    let payload = wire.rest.remove(&wire.kind).unwrap_or(Value::Null);
    Ok(TextSpan {
        content: wire.plain_text.unwrap_or_default(),
        annotations: wire.annotations,
        link: wire.href,
        kind: SpanKind::Opaque {
            kind: wire.kind,
            payload,
        },
    })
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode spans as a rich-text array, splitting text longer than [`MAX_TEXT_CHARS`].
pub fn spans_to_json(spans: &[TextSpan]) -> Vec<Value> {
    let mut out = Vec::with_capacity(spans.len());
    for span in spans {
        match &span.kind {
            SpanKind::Text => {
                let link = span.link.as_ref().map(|url| json!({ "url": url }));
                for piece in split_chars(&span.content, MAX_TEXT_CHARS) {
                    out.push(json!({
                        "type": "text",
                        "text": { "content": piece, "link": link },
                        "annotations": span.annotations,
                    }));
                }
            }
            SpanKind::Opaque { kind, payload } => {
                out.push(json!({
                    "type": kind,
                    kind.as_str(): payload,
                    "annotations": span.annotations,
                }));
            }
        }
    }
    out
}

fn split_chars(text: &str, max: usize) -> Vec<&str> {
    if text.chars().count() <= max {
        return vec![text];
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == max {
            pieces.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    pieces.push(&text[start..]);
    pieces
}

/// Encode one node for a create/append request. Unsupported nodes yield `None`.
///
/// Table rows are nested under `table.children`; other children under
/// `<type>.children`.
pub fn node_to_request(node: &ContentNode) -> Option<Value> {
    let type_name = node.kind.type_name().to_string();
    let mut payload = match &node.kind {
        NodeKind::Unsupported { .. } => return None,
        NodeKind::Paragraph(b)
        | NodeKind::Heading1(b)
        | NodeKind::Heading2(b)
        | NodeKind::Heading3(b)
        | NodeKind::BulletedListItem(b)
        | NodeKind::NumberedListItem(b)
        | NodeKind::Quote(b)
        | NodeKind::Toggle(b) => {
            let mut p = Map::new();
            p.insert("rich_text".into(), Value::Array(spans_to_json(&b.rich_text)));
            insert_color(&mut p, &b.color);
            p
        }
        NodeKind::ToDo(b) => {
            let mut p = Map::new();
            p.insert("rich_text".into(), Value::Array(spans_to_json(&b.rich_text)));
            p.insert("checked".into(), Value::Bool(b.checked));
            insert_color(&mut p, &b.color);
            p
        }
        NodeKind::Callout(b) => {
            let mut p = Map::new();
            p.insert("rich_text".into(), Value::Array(spans_to_json(&b.rich_text)));
            if let Some(icon) = &b.icon {
                p.insert("icon".into(), icon.clone());
            }
            insert_color(&mut p, &b.color);
            p
        }
        NodeKind::Image(img) => {
            let mut p = Map::new();
            p.insert("type".into(), json!("external"));
            p.insert("external".into(), json!({ "url": img.source.url() }));
            p.insert("caption".into(), Value::Array(spans_to_json(&img.caption)));
            p
        }
        NodeKind::Table(t) => {
            let mut p = Map::new();
            p.insert("table_width".into(), json!(t.width));
            p.insert("has_column_header".into(), json!(t.has_column_header));
            p.insert("has_row_header".into(), json!(t.has_row_header));
            p
        }
        NodeKind::TableRow(row) => {
            let cells: Vec<Value> = row
                .cells
                .iter()
                .map(|cell| Value::Array(spans_to_json(cell)))
                .collect();
            let mut p = Map::new();
            p.insert("cells".into(), Value::Array(cells));
            p
        }
        NodeKind::Divider => Map::new(),
        NodeKind::PassThrough(b) => {
            let mut p = b.payload.clone();
            if let Some(spans) = &b.rich_text {
                p.insert("rich_text".into(), Value::Array(spans_to_json(spans)));
            }
            p
        }
    };

    if !node.children.is_empty() {
        payload.insert("children".into(), Value::Array(nodes_to_request(&node.children)));
    }

    let mut block = Map::new();
    block.insert("object".into(), json!("block"));
    block.insert("type".into(), json!(type_name));
    block.insert(type_name, Value::Object(payload));
    Some(Value::Object(block))
}

/// Encode a node list, skipping unsupported nodes.
pub fn nodes_to_request(nodes: &[ContentNode]) -> Vec<Value> {
    nodes.iter().filter_map(node_to_request).collect()
}

fn insert_color(payload: &mut Map<String, Value>, color: &Option<String>) {
    if let Some(color) = color {
        payload.insert("color".into(), json!(color));
    }
}
