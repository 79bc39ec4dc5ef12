pub mod codec;
pub mod html_converter;
pub mod html_parser;
pub mod markdown_converter;

pub mod structured_document;
pub mod structured_editor;

mod builder;

pub use codec::{DocumentCodec, HtmlCodec, MarkdownCodec, ReviewFormat};
pub use structured_document::{
    Block, BlockType, DocumentPosition, ElementId, HeadingLevel, ListKind, Mark, MediaReference,
    Selection, StructuredDocument, TextRun, TextStyle,
};
pub use structured_editor::{BlockToggle, CommandResult, EditorState};
