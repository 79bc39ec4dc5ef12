// Structured Document Model
// A review document as an ordered list of blocks holding styled runs or images.
// HTML and markdown are only storage formats, see the converters.

use crate::media::{MediaError, media_id_from_url};
use std::cmp::min;
use std::collections::HashSet;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

/// Unique identifier for blocks within one document.
/// Zero means "not assigned yet"; the document assigns ids when a block is added.
pub type ElementId = u64;

/// A formatting mark that can be toggled on a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mark {
    Bold,
    Italic,
    Underline,
}

/// The set of marks carried by a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl TextStyle {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn bold() -> Self {
        TextStyle {
            bold: true,
            ..Default::default()
        }
    }

    pub fn italic() -> Self {
        TextStyle {
            italic: true,
            ..Default::default()
        }
    }

    pub fn underline() -> Self {
        TextStyle {
            underline: true,
            ..Default::default()
        }
    }

    pub fn has(&self, mark: Mark) -> bool {
        match mark {
            Mark::Bold => self.bold,
            Mark::Italic => self.italic,
            Mark::Underline => self.underline,
        }
    }

    /// Returns a copy with `mark` switched on or off
    pub fn with(mut self, mark: Mark, on: bool) -> Self {
        match mark {
            Mark::Bold => self.bold = on,
            Mark::Italic => self.italic = on,
            Mark::Underline => self.underline = on,
        }
        self
    }

    pub fn is_plain(&self) -> bool {
        *self == Self::plain()
    }
}

/// A run of styled text (a contiguous piece of text with uniform styling)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub text: String,
    pub style: TextStyle,
}

impl TextRun {
    pub fn new(text: impl Into<String>, style: TextStyle) -> Self {
        TextRun {
            text: text.into(),
            style,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, TextStyle::plain())
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Split this run at the given character offset.
    /// Returns (left_run, right_run)
    pub fn split_at(&self, offset: usize) -> (TextRun, TextRun) {
        let (left, right) = self.text.split_at(byte_index(&self.text, offset));
        (
            TextRun::new(left, self.style),
            TextRun::new(right, self.style),
        )
    }
}

/// Converts a character offset into a byte index, clamped to the end of `text`.
pub(crate) fn byte_index(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeadingLevel {
    One,
    Two,
    Three,
}

impl HeadingLevel {
    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            1 => Some(HeadingLevel::One),
            2 => Some(HeadingLevel::Two),
            3 => Some(HeadingLevel::Three),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            HeadingLevel::One => 1,
            HeadingLevel::Two => 2,
            HeadingLevel::Three => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Ordered,
    Unordered,
}

/// Pointer from the document to an image kept by the upload service.
///
/// `media_id` is the canonical identifier. `url` must encode the same id
/// (see [`media_id_from_url`]) so that the id survives a trip through the
/// persisted text, which only stores the url.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaReference {
    media_id: String,
    url: String,
}

impl MediaReference {
    pub fn new(media_id: impl Into<String>, url: impl Into<String>) -> Result<Self, MediaError> {
        let media_id = media_id.into();
        let url = url.into();
        match media_id_from_url(&url) {
            Some(parsed) if parsed == media_id => Ok(MediaReference { media_id, url }),
            Some(parsed) => Err(MediaError::UrlMismatch {
                media_id,
                found: parsed.to_string(),
            }),
            None => Err(MediaError::UnparseableUrl(url)),
        }
    }

    /// Build a reference from a persisted url, if the id can be recovered from it
    pub fn from_url(url: impl Into<String>) -> Option<Self> {
        let url = url.into();
        let media_id = media_id_from_url(&url)?.to_string();
        Some(MediaReference { media_id, url })
    }

    pub fn media_id(&self) -> &str {
        &self.media_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Block-level content types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockType {
    Paragraph,
    Heading { level: HeadingLevel },
    ListItem { list: ListKind },
    Image(MediaReference),
}

impl BlockType {
    pub fn is_text(&self) -> bool {
        !matches!(self, BlockType::Image(_))
    }

    pub fn media(&self) -> Option<&MediaReference> {
        match self {
            BlockType::Image(media) => Some(media),
            _ => None,
        }
    }

    pub fn list_kind(&self) -> Option<ListKind> {
        match self {
            BlockType::ListItem { list } => Some(*list),
            _ => None,
        }
    }
}

/// A block of content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: ElementId,
    pub block_type: BlockType,
    pub content: Vec<TextRun>,
}

impl Block {
    pub fn new(id: ElementId, block_type: BlockType) -> Self {
        Block {
            id,
            block_type,
            content: Vec::new(),
        }
    }

    pub fn paragraph(id: ElementId) -> Self {
        Self::new(id, BlockType::Paragraph)
    }

    pub fn heading(id: ElementId, level: HeadingLevel) -> Self {
        Self::new(id, BlockType::Heading { level })
    }

    pub fn list_item(id: ElementId, list: ListKind) -> Self {
        Self::new(id, BlockType::ListItem { list })
    }

    pub fn image(id: ElementId, media: MediaReference) -> Self {
        Self::new(id, BlockType::Image(media))
    }

    pub fn with_text(mut self, text: impl Into<String>, style: TextStyle) -> Self {
        self.content.push(TextRun::new(text, style));
        self.normalize_content();
        self
    }

    pub fn with_plain_text(self, text: impl Into<String>) -> Self {
        self.with_text(text, TextStyle::plain())
    }

    pub fn is_image(&self) -> bool {
        !self.block_type.is_text()
    }

    /// Total text length in characters. Image blocks have no text.
    pub fn text_len(&self) -> usize {
        self.content.iter().map(|run| run.len()).sum()
    }

    pub fn to_plain_text(&self) -> String {
        self.content.iter().map(|run| run.text.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.content.iter().all(|run| run.is_empty())
    }

    /// Structural equality: same type and runs, ids ignored
    pub fn same_content(&self, other: &Block) -> bool {
        self.block_type == other.block_type && self.content == other.content
    }

    /// Restore the run invariants: no empty runs, no line breaks inside runs,
    /// and no two adjacent runs with the same style.
    pub fn normalize_content(&mut self) {
        if self.is_image() {
            self.content.clear();
            return;
        }

        let mut merged: Vec<TextRun> = Vec::with_capacity(self.content.len());
        for mut run in self.content.drain(..) {
            if run.text.is_empty() {
                continue;
            }
            if run.text.contains(['\n', '\r']) {
                run.text = run.text.replace("\r\n", " ").replace(['\n', '\r'], " ");
            }
            match merged.last_mut() {
                Some(last) if last.style == run.style => last.text.push_str(&run.text),
                _ => merged.push(run),
            }
        }
        self.content = merged;
    }

    /// Style that text typed at `offset` inherits: the style of the character
    /// before the offset, or of the first character at the start of the block.
    pub fn style_at(&self, offset: usize) -> TextStyle {
        let mut pos = 0;
        for run in &self.content {
            let len = run.len();
            if offset > pos && offset <= pos + len {
                return run.style;
            }
            pos += len;
        }
        self.content
            .first()
            .filter(|_| offset == 0)
            .map(|run| run.style)
            .unwrap_or_default()
    }

    /// Split this block's content at a character offset, returning the right part.
    /// The left part remains in self.
    pub fn split_content_at(&mut self, offset: usize) -> Vec<TextRun> {
        let offset = min(offset, self.text_len());
        let mut left = Vec::new();
        let mut right = Vec::new();
        let mut pos = 0usize;

        for run in self.content.drain(..) {
            let len = run.len();
            if pos + len <= offset {
                left.push(run);
            } else if pos >= offset {
                right.push(run);
            } else {
                let (l, r) = run.split_at(offset - pos);
                left.push(l);
                right.push(r);
            }
            pos += len;
        }

        self.content = left;
        self.normalize_content();
        right
    }

    /// Delete text in [start..end) of this block's flattened text
    pub fn delete_text_range(&mut self, start: usize, end: usize) {
        let len = self.text_len();
        let start = min(start, len);
        let end = min(end, len);
        if start >= end {
            return;
        }

        let tail = self.split_content_at(end);
        self.split_content_at(start);
        self.content.extend(tail);
        self.normalize_content();
    }

    /// Insert text with the given style at a character offset
    pub fn insert_text(&mut self, offset: usize, text: &str, style: TextStyle) {
        let right = self.split_content_at(offset);
        self.content.push(TextRun::new(text, style));
        self.content.extend(right);
        self.normalize_content();
    }

    /// Apply `f` to the style of every character in [start..end)
    pub fn map_styles<F>(&mut self, start: usize, end: usize, mut f: F)
    where
        F: FnMut(TextStyle) -> TextStyle,
    {
        let len = self.text_len();
        let start = min(start, len);
        let end = min(end, len);
        if start >= end {
            return;
        }

        let after = self.split_content_at(end);
        let mut selected = self.split_content_at(start);
        for run in &mut selected {
            run.style = f(run.style);
        }
        self.content.extend(selected);
        self.content.extend(after);
        self.normalize_content();
    }

    /// Whether every character in [start..end) carries `mark`.
    /// Returns None when the range holds no characters.
    pub fn range_has_mark(&self, start: usize, end: usize, mark: Mark) -> Option<bool> {
        let mut pos = 0usize;
        let mut seen = false;
        for run in &self.content {
            let len = run.len();
            let run_start = pos;
            pos += len;
            if pos <= start || run_start >= end {
                continue;
            }
            seen = true;
            if !run.style.has(mark) {
                return Some(false);
            }
        }
        seen.then_some(true)
    }

    /// Character offset of the grapheme boundary before `offset`
    pub fn previous_grapheme_offset(&self, offset: usize) -> usize {
        let text = self.to_plain_text();
        let byte = byte_index(&text, offset);
        text[..byte]
            .grapheme_indices(true)
            .last()
            .map(|(idx, _)| text[..idx].chars().count())
            .unwrap_or(0)
    }

    /// Character offset of the grapheme boundary after `offset`
    pub fn next_grapheme_offset(&self, offset: usize) -> usize {
        let text = self.to_plain_text();
        let byte = byte_index(&text, offset);
        match text[byte..].graphemes(true).next() {
            Some(grapheme) => offset + grapheme.chars().count(),
            None => offset,
        }
    }
}

/// Position within a document: a block and a character offset in its text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentPosition {
    pub block_id: ElementId,
    pub offset: usize,
}

impl DocumentPosition {
    pub fn new(block_id: ElementId, offset: usize) -> Self {
        DocumentPosition { block_id, offset }
    }
}

/// A selection range. `anchor` is where it started, `focus` where it ends;
/// the two may be in either document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selection {
    pub anchor: DocumentPosition,
    pub focus: DocumentPosition,
}

impl Selection {
    pub fn new(anchor: DocumentPosition, focus: DocumentPosition) -> Self {
        Selection { anchor, focus }
    }

    pub fn collapsed(pos: DocumentPosition) -> Self {
        Selection {
            anchor: pos,
            focus: pos,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// A position resolved to a block index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResolvedPosition {
    pub block_index: usize,
    pub offset: usize,
}

/// Mutable access to a copy of the block list, handed out by [`StructuredDocument::edit`].
pub struct BlockEdit<'a> {
    blocks: &'a mut Vec<Block>,
    next_id: &'a mut ElementId,
}

impl BlockEdit<'_> {
    /// Reserve a fresh block id
    pub fn fresh_id(&mut self) -> ElementId {
        let id = *self.next_id;
        *self.next_id += 1;
        id
    }
}

impl Deref for BlockEdit<'_> {
    type Target = Vec<Block>;

    fn deref(&self) -> &Self::Target {
        self.blocks
    }
}

impl DerefMut for BlockEdit<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.blocks
    }
}

/// The structured document.
///
/// Documents are values: every edit returns a new document and leaves the
/// original untouched. Cloning is cheap because the block list is shared.
#[derive(Debug, Clone)]
pub struct StructuredDocument {
    blocks: Arc<Vec<Block>>,
    next_id: ElementId,
}

impl StructuredDocument {
    /// An empty document: a single empty paragraph
    pub fn new() -> Self {
        Self::from_blocks(Vec::new())
    }

    /// Build a document from blocks, assigning ids to blocks that have none
    /// and restoring the run invariants.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        let next_id = blocks.iter().map(|b| b.id).max().unwrap_or(0) + 1;
        let mut doc = StructuredDocument {
            blocks: Arc::new(blocks),
            next_id,
        };
        let blocks = Arc::make_mut(&mut doc.blocks);
        Self::fix_up(blocks, &mut doc.next_id);
        doc
    }

    /// Create a simple document with one paragraph
    pub fn with_paragraph(text: impl Into<String>) -> Self {
        Self::from_blocks(vec![Block::paragraph(0).with_plain_text(text)])
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// True when both values share the same snapshot of blocks
    pub fn ptr_eq(&self, other: &StructuredDocument) -> bool {
        Arc::ptr_eq(&self.blocks, &other.blocks)
    }

    /// Apply `f` to a copy of the blocks and return the resulting document.
    /// Ids, run invariants and non-emptiness are restored afterwards.
    pub fn edit<R>(&self, f: impl FnOnce(&mut BlockEdit<'_>) -> R) -> (Self, R) {
        let mut blocks: Vec<Block> = self.blocks.as_ref().clone();
        let mut next_id = self.next_id;
        let result = f(&mut BlockEdit {
            blocks: &mut blocks,
            next_id: &mut next_id,
        });
        Self::fix_up(&mut blocks, &mut next_id);
        (
            StructuredDocument {
                blocks: Arc::new(blocks),
                next_id,
            },
            result,
        )
    }

    fn fix_up(blocks: &mut Vec<Block>, next_id: &mut ElementId) {
        if blocks.is_empty() {
            blocks.push(Block::paragraph(0));
        }
        let mut seen = HashSet::with_capacity(blocks.len());
        for block in blocks.iter_mut() {
            // Zero and repeated ids get fresh ones; the first holder keeps its id
            if block.id == 0 || !seen.insert(block.id) {
                block.id = *next_id;
                seen.insert(block.id);
                *next_id += 1;
            }
            block.normalize_content();
        }
    }

    /// Find block index by ID
    pub fn find_block_index(&self, id: ElementId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }

    /// Position at the start of the document
    pub fn start(&self) -> DocumentPosition {
        DocumentPosition::new(self.blocks[0].id, 0)
    }

    /// Position at the end of the document
    pub fn end(&self) -> DocumentPosition {
        let last = &self.blocks[self.blocks.len() - 1];
        DocumentPosition::new(last.id, last.text_len())
    }

    /// Position for a block index and offset, clamped to the document
    pub fn position_at(&self, block_index: usize, offset: usize) -> DocumentPosition {
        let block = &self.blocks[min(block_index, self.blocks.len() - 1)];
        DocumentPosition::new(block.id, min(offset, block.text_len()))
    }

    /// Resolve a position to a block index. A position whose block no longer
    /// exists resolves to the end of the document.
    pub fn resolve(&self, pos: DocumentPosition) -> ResolvedPosition {
        match self.find_block_index(pos.block_id) {
            Some(block_index) => ResolvedPosition {
                block_index,
                offset: min(pos.offset, self.blocks[block_index].text_len()),
            },
            None => {
                let block_index = self.blocks.len() - 1;
                ResolvedPosition {
                    block_index,
                    offset: self.blocks[block_index].text_len(),
                }
            }
        }
    }

    /// Validate and clamp a position to document bounds
    pub fn clamp_position(&self, pos: DocumentPosition) -> DocumentPosition {
        let resolved = self.resolve(pos);
        self.position_at(resolved.block_index, resolved.offset)
    }

    /// Resolve a selection to an ordered (start, end) pair
    pub fn ordered_range(&self, selection: &Selection) -> (ResolvedPosition, ResolvedPosition) {
        let a = self.resolve(selection.anchor);
        let b = self.resolve(selection.focus);
        if b < a { (b, a) } else { (a, b) }
    }

    /// All media references in document order
    pub fn media_references(&self) -> impl Iterator<Item = &MediaReference> {
        self.blocks.iter().filter_map(|b| b.block_type.media())
    }

    /// Convert to plain text
    pub fn to_plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.to_plain_text())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// True for the canonical empty document (one empty paragraph)
    pub fn is_blank(&self) -> bool {
        self.blocks.len() == 1
            && self.blocks[0].block_type == BlockType::Paragraph
            && self.blocks[0].is_empty()
    }
}

impl Default for StructuredDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural equality: block types, runs and media references in order.
/// Block ids are editor bookkeeping and do not take part.
impl PartialEq for StructuredDocument {
    fn eq(&self, other: &Self) -> bool {
        self.blocks.len() == other.blocks.len()
            && self
                .blocks
                .iter()
                .zip(other.blocks.iter())
                .all(|(a, b)| a.same_content(b))
    }
}

impl Eq for StructuredDocument {}

impl fmt::Display for StructuredDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "StructuredDocument ({} blocks):", self.blocks.len())?;
        for (i, block) in self.blocks.iter().enumerate() {
            write!(f, "  [{}] ", i)?;
            match &block.block_type {
                BlockType::Paragraph => write!(f, "Paragraph")?,
                BlockType::Heading { level } => write!(f, "Heading(h{})", level.as_u8())?,
                BlockType::ListItem { list } => write!(
                    f,
                    "ListItem({})",
                    match list {
                        ListKind::Ordered => "ordered",
                        ListKind::Unordered => "unordered",
                    }
                )?,
                BlockType::Image(media) => write!(f, "Image({})", media.media_id())?,
            }
            writeln!(f, ": {:?}", block.to_plain_text())?;
        }
        Ok(())
    }
}
