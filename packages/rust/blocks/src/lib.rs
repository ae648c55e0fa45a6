//! Content tree model, text extraction, reconstruction, and the store wire codec.
//!
//! Extraction and reconstruction walk a tree in the same order: a tree
//! rebuilt from `extract_texts(tree)` with every string replaced keeps the
//! shape of the original, minus unsupported blocks.

pub mod extract;
pub mod model;
pub mod reconstruct;
pub mod wire;

pub use extract::{count_translatable, extract_texts, plain_text};
pub use model::{
    Annotations, CalloutBlock, ContentNode, ImageBlock, ImageSource, NodeKind, PassThroughBlock,
    SpanKind, TableBlock, TableRowBlock, TextBlock, TextSpan, ToDoBlock,
};
pub use reconstruct::{CursorReport, TranslationCursor, reconstruct, reconstruct_with_report};
pub use wire::{
    FetchedBlock, MAX_TEXT_CHARS, node_to_request, nodes_to_request, parse_block,
    parse_rich_text, spans_to_json,
};
