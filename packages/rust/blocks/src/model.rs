//! Content tree model: typed blocks and their inline text spans.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Inline text
// ---------------------------------------------------------------------------

/// Style annotations carried by a span. Always passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub code: bool,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    "default".into()
}

impl Default for Annotations {
    fn default() -> Self {
        Self {
            bold: false,
            italic: false,
            strikethrough: false,
            underline: false,
            code: false,
            color: default_color(),
        }
    }
}

/// What a span is made of.
#[derive(Debug, Clone, PartialEq)]
pub enum SpanKind {
    /// Plain text; eligible for translation.
    Text,
    /// A non-text inline item (mention, equation) kept verbatim.
    Opaque {
        /// Inline type name as the store reports it (`mention`, `equation`).
        kind: String,
        /// The type-specific payload.
        payload: serde_json::Value,
    },
}

/// One inline run of text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub content: String,
    pub annotations: Annotations,
    pub link: Option<String>,
    pub kind: SpanKind,
}

impl TextSpan {
    /// An unstyled text span.
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            annotations: Annotations::default(),
            link: None,
            kind: SpanKind::Text,
        }
    }

    /// A text span pointing at `url`.
    pub fn linked(content: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            link: Some(url.into()),
            ..Self::plain(content)
        }
    }

    /// Whether this span is sent for translation and consumes a translated slot.
    ///
    /// Opaque spans and empty or whitespace-only text never do.
    pub fn is_translatable(&self) -> bool {
        matches!(self.kind, SpanKind::Text) && !self.content.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Block payloads
// ---------------------------------------------------------------------------

/// Payload shared by the plain rich-text block kinds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextBlock {
    pub rich_text: Vec<TextSpan>,
    pub color: Option<String>,
}

impl TextBlock {
    /// A block holding a single plain span.
    pub fn from_text(content: impl Into<String>) -> Self {
        Self {
            rich_text: vec![TextSpan::plain(content)],
            color: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToDoBlock {
    pub rich_text: Vec<TextSpan>,
    pub checked: bool,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CalloutBlock {
    pub rich_text: Vec<TextSpan>,
    /// Emoji or icon object, opaque to the pipeline.
    pub icon: Option<serde_json::Value>,
    pub color: Option<String>,
}

/// Where an image's bytes live.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// A stable public URL.
    External { url: String },
    /// A store-hosted file behind a signed URL that expires.
    File {
        url: String,
        expiry_time: Option<String>,
    },
}

impl ImageSource {
    pub fn url(&self) -> &str {
        match self {
            Self::External { url } | Self::File { url, .. } => url,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlock {
    pub source: ImageSource,
    pub caption: Vec<TextSpan>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBlock {
    pub width: u32,
    pub has_column_header: bool,
    pub has_row_header: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableRowBlock {
    /// Ordered cells, each an ordered list of spans.
    pub cells: Vec<Vec<TextSpan>>,
}

/// A block type without a typed model (`code`, `bookmark`, `column_list`,
/// `embed`, ...), written back with its payload untouched.
///
/// When the payload has a `rich_text` array it is lifted out into
/// `rich_text` so it is translated like any other block text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PassThroughBlock {
    pub block_type: String,
    pub rich_text: Option<Vec<TextSpan>>,
    /// The remaining payload fields, minus `rich_text` and `children`.
    pub payload: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Closed set of block kinds the pipeline understands.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Paragraph(TextBlock),
    Heading1(TextBlock),
    Heading2(TextBlock),
    Heading3(TextBlock),
    BulletedListItem(TextBlock),
    NumberedListItem(TextBlock),
    Quote(TextBlock),
    Toggle(TextBlock),
    ToDo(ToDoBlock),
    Callout(CalloutBlock),
    Image(ImageBlock),
    Table(TableBlock),
    TableRow(TableRowBlock),
    Divider,
    /// Any other writable block, carried through verbatim.
    PassThrough(PassThroughBlock),
    /// Blocks the destination cannot be written with (`child_page`,
    /// `child_database`, `unsupported`). Dropped on reconstruction.
    Unsupported { block_type: String },
}

impl NodeKind {
    /// Block type name as used by the store.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Paragraph(_) => "paragraph",
            Self::Heading1(_) => "heading_1",
            Self::Heading2(_) => "heading_2",
            Self::Heading3(_) => "heading_3",
            Self::BulletedListItem(_) => "bulleted_list_item",
            Self::NumberedListItem(_) => "numbered_list_item",
            Self::Quote(_) => "quote",
            Self::Toggle(_) => "toggle",
            Self::ToDo(_) => "to_do",
            Self::Callout(_) => "callout",
            Self::Image(_) => "image",
            Self::Table(_) => "table",
            Self::TableRow(_) => "table_row",
            Self::Divider => "divider",
            Self::PassThrough(b) => &b.block_type,
            Self::Unsupported { block_type } => block_type,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported { .. })
    }

    /// Mutable access to every span list this node carries (text, caption, cells).
    pub fn spans_mut(&mut self) -> Vec<&mut Vec<TextSpan>> {
        match self {
            Self::Paragraph(b)
            | Self::Heading1(b)
            | Self::Heading2(b)
            | Self::Heading3(b)
            | Self::BulletedListItem(b)
            | Self::NumberedListItem(b)
            | Self::Quote(b)
            | Self::Toggle(b) => vec![&mut b.rich_text],
            Self::ToDo(b) => vec![&mut b.rich_text],
            Self::Callout(b) => vec![&mut b.rich_text],
            Self::Image(img) => vec![&mut img.caption],
            Self::TableRow(row) => row.cells.iter_mut().collect(),
            Self::PassThrough(b) => b.rich_text.iter_mut().collect(),
            Self::Table(_) | Self::Divider | Self::Unsupported { .. } => Vec::new(),
        }
    }
}

/// One structural unit of a document, with its nested children.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentNode {
    /// Store identifier; `None` for nodes built locally for writing.
    pub id: Option<String>,
    pub kind: NodeKind,
    pub children: Vec<ContentNode>,
}

impl ContentNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: None,
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<ContentNode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Shorthand for a paragraph holding one plain span.
    pub fn paragraph(content: impl Into<String>) -> Self {
        Self::new(NodeKind::Paragraph(TextBlock::from_text(content)))
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Self::subtree_len).sum::<usize>()
    }
}
