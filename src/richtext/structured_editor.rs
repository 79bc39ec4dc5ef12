// Structured Editor
// Editing commands on a StructuredDocument plus a selection.
// Commands never mutate their input; each returns the next editor state.

use super::structured_document::*;
use tracing::warn;

/// Whether a command applied to the state it was given
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    Handled,
    /// The caller may fall back to its default behavior
    NotHandled,
}

pub type CommandOutput = (EditorState, CommandResult);

/// Block kinds a user can toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockToggle {
    Paragraph,
    Heading(HeadingLevel),
    OrderedList,
    UnorderedList,
}

impl BlockToggle {
    pub fn block_type(self) -> BlockType {
        match self {
            BlockToggle::Paragraph => BlockType::Paragraph,
            BlockToggle::Heading(level) => BlockType::Heading { level },
            BlockToggle::OrderedList => BlockType::ListItem {
                list: ListKind::Ordered,
            },
            BlockToggle::UnorderedList => BlockType::ListItem {
                list: ListKind::Unordered,
            },
        }
    }
}

/// Named editing commands delivered by a key binding layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    ToggleMark(Mark),
    ToggleBlock(BlockToggle),
    SplitBlock,
    SoftNewline,
    Backspace,
    Delete,
    DeleteBlockBackward,
}

impl KeyCommand {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "bold" => KeyCommand::ToggleMark(Mark::Bold),
            "italic" => KeyCommand::ToggleMark(Mark::Italic),
            "underline" => KeyCommand::ToggleMark(Mark::Underline),
            "header-one" => KeyCommand::ToggleBlock(BlockToggle::Heading(HeadingLevel::One)),
            "header-two" => KeyCommand::ToggleBlock(BlockToggle::Heading(HeadingLevel::Two)),
            "header-three" => KeyCommand::ToggleBlock(BlockToggle::Heading(HeadingLevel::Three)),
            "paragraph" => KeyCommand::ToggleBlock(BlockToggle::Paragraph),
            "ordered-list-item" => KeyCommand::ToggleBlock(BlockToggle::OrderedList),
            "unordered-list-item" => KeyCommand::ToggleBlock(BlockToggle::UnorderedList),
            "split-block" => KeyCommand::SplitBlock,
            "soft-newline" => KeyCommand::SoftNewline,
            "backspace" => KeyCommand::Backspace,
            "delete" => KeyCommand::Delete,
            "delete-block-backward" => KeyCommand::DeleteBlockBackward,
            _ => return None,
        })
    }
}

/// A document together with the user's selection
#[derive(Debug, Clone, PartialEq)]
pub struct EditorState {
    pub document: StructuredDocument,
    pub selection: Selection,
    /// Style for the next typed text, set by toggling a mark with a collapsed selection
    pub pending_style: Option<TextStyle>,
}

impl EditorState {
    /// An empty document with the cursor at its start
    pub fn new() -> Self {
        Self::with_document(StructuredDocument::new())
    }

    pub fn with_document(document: StructuredDocument) -> Self {
        let selection = Selection::collapsed(document.start());
        EditorState {
            document,
            selection,
            pending_style: None,
        }
    }

    /// The focus of the selection, resolved against the document
    pub fn cursor(&self) -> ResolvedPosition {
        self.document.resolve(self.selection.focus)
    }

    fn not_handled(&self) -> CommandOutput {
        (self.clone(), CommandResult::NotHandled)
    }

    /// A state on `document` with the selection collapsed at `pos`
    fn moved_to(document: StructuredDocument, pos: DocumentPosition) -> EditorState {
        let pos = document.clamp_position(pos);
        EditorState {
            document,
            selection: Selection::collapsed(pos),
            pending_style: None,
        }
    }

    /// A state on `document` keeping the current selection
    fn keeping_selection(&self, document: StructuredDocument) -> EditorState {
        let selection = Selection::new(
            document.clamp_position(self.selection.anchor),
            document.clamp_position(self.selection.focus),
        );
        EditorState {
            document,
            selection,
            pending_style: None,
        }
    }

    /// Move the selection. A pending style survives only if nothing moved.
    pub fn set_selection(&self, selection: Selection) -> EditorState {
        let selection = Selection::new(
            self.document.clamp_position(selection.anchor),
            self.document.clamp_position(selection.focus),
        );
        EditorState {
            document: self.document.clone(),
            selection,
            pending_style: self.pending_style.filter(|_| selection == self.selection),
        }
    }

    /// Apply a named key command. Unknown names are not handled.
    pub fn handle_key_command(&self, name: &str) -> CommandOutput {
        match KeyCommand::parse(name) {
            Some(command) => self.apply(command),
            None => self.not_handled(),
        }
    }

    pub fn apply(&self, command: KeyCommand) -> CommandOutput {
        match command {
            KeyCommand::ToggleMark(mark) => self.toggle_inline_mark(mark),
            KeyCommand::ToggleBlock(toggle) => self.toggle_block_type(toggle),
            KeyCommand::SplitBlock => self.split_block(),
            KeyCommand::SoftNewline => self.exit_list(),
            KeyCommand::Backspace => self.delete_backward(),
            KeyCommand::Delete => self.delete_forward(),
            KeyCommand::DeleteBlockBackward => self.delete_to_block_start(),
        }
    }

    /// Toggle `mark` on the selection: removed if every selected character
    /// carries it, added everywhere otherwise. With a collapsed selection the
    /// mark applies to the next typed text.
    pub fn toggle_inline_mark(&self, mark: Mark) -> CommandOutput {
        if self.selection.is_collapsed() {
            let cursor = self.cursor();
            let block = &self.document.blocks()[cursor.block_index];
            if block.is_image() {
                return self.not_handled();
            }
            let current = self
                .pending_style
                .unwrap_or_else(|| block.style_at(cursor.offset));
            let mut state = self.clone();
            state.pending_style = Some(current.with(mark, !current.has(mark)));
            return (state, CommandResult::Handled);
        }

        let ranges = self.text_ranges();
        let mut seen = false;
        let mut all_marked = true;
        for &(index, start, end) in &ranges {
            if let Some(marked) = self.document.blocks()[index].range_has_mark(start, end, mark) {
                seen = true;
                all_marked &= marked;
            }
        }
        if !seen {
            return self.not_handled();
        }

        let (document, ()) = self.document.edit(|blocks| {
            for &(index, start, end) in &ranges {
                blocks[index].map_styles(start, end, |style| style.with(mark, !all_marked));
            }
        });
        (self.keeping_selection(document), CommandResult::Handled)
    }

    /// (block index, start, end) character ranges of the selection in each text block
    fn text_ranges(&self) -> Vec<(usize, usize, usize)> {
        let (start, end) = self.document.ordered_range(&self.selection);
        (start.block_index..=end.block_index)
            .filter_map(|index| {
                let block = &self.document.blocks()[index];
                if block.is_image() {
                    return None;
                }
                let from = if index == start.block_index { start.offset } else { 0 };
                let to = if index == end.block_index {
                    end.offset
                } else {
                    block.text_len()
                };
                Some((index, from, to))
            })
            .collect()
    }

    /// Convert the text blocks touching the selection. A kind that is already
    /// active on all of them reverts to paragraph.
    pub fn toggle_block_type(&self, toggle: BlockToggle) -> CommandOutput {
        let (start, end) = self.document.ordered_range(&self.selection);
        let blocks = self.document.blocks();
        let touched: Vec<usize> = (start.block_index..=end.block_index)
            .filter(|&index| !blocks[index].is_image())
            .collect();
        if touched.is_empty() {
            return self.not_handled();
        }

        let requested = toggle.block_type();
        let active = touched
            .iter()
            .all(|&index| blocks[index].block_type == requested);
        let target = if active {
            BlockType::Paragraph
        } else {
            requested
        };
        if touched
            .iter()
            .all(|&index| blocks[index].block_type == target)
        {
            return (self.clone(), CommandResult::Handled);
        }

        let (document, ()) = self.document.edit(|blocks| {
            for &index in &touched {
                blocks[index].block_type = target.clone();
            }
        });
        let mut state = self.keeping_selection(document);
        state.pending_style = self.pending_style;
        (state, CommandResult::Handled)
    }

    /// Insert an image block for an uploaded media item at the selection
    pub fn insert_image_placeholder(&self, media_id: &str, url: &str) -> CommandOutput {
        match MediaReference::new(media_id, url) {
            Ok(media) => self.insert_image(media),
            Err(err) => {
                warn!(%err, "not inserting image");
                self.not_handled()
            }
        }
    }

    /// Insert an image block at the selection.
    ///
    /// On an image the new image goes after it; at offset 0 of a non-empty
    /// block before it; at the end of a block after it; anywhere else the
    /// block is split around the image. The image becomes the selection.
    pub fn insert_image(&self, media: MediaReference) -> CommandOutput {
        let state = self.collapsed_for_insert();
        let cursor = state.cursor();
        let (document, image_id) = state.document.edit(|blocks| {
            let index = cursor.block_index;
            let at = {
                let block = &blocks[index];
                if block.is_image() || cursor.offset >= block.text_len() {
                    index + 1
                } else if cursor.offset == 0 {
                    index
                } else {
                    let right = blocks[index].split_content_at(cursor.offset);
                    let tail_id = blocks.fresh_id();
                    let mut tail = Block::new(tail_id, blocks[index].block_type.clone());
                    tail.content = right;
                    blocks.insert(index + 1, tail);
                    index + 1
                }
            };
            let image_id = blocks.fresh_id();
            blocks.insert(at, Block::image(image_id, media));
            image_id
        });
        (
            Self::moved_to(document, DocumentPosition::new(image_id, 0)),
            CommandResult::Handled,
        )
    }

    fn collapsed_for_insert(&self) -> EditorState {
        if self.selection.is_collapsed() {
            self.clone()
        } else {
            let (mut state, _) = self.delete_selection();
            state.pending_style = self.pending_style;
            state
        }
    }

    /// Type text at the selection, replacing selected content
    pub fn insert_text(&self, text: &str) -> CommandOutput {
        if text.is_empty() {
            return (self.clone(), CommandResult::Handled);
        }
        if text.contains(['\n', '\r']) {
            return self.paste_text(text);
        }

        let state = self.collapsed_for_insert();
        let cursor = state.cursor();
        let block = &state.document.blocks()[cursor.block_index];
        let style = state
            .pending_style
            .unwrap_or_else(|| block.style_at(cursor.offset));
        let inserted = text.chars().count();

        if block.is_image() {
            // Typing on an image starts a paragraph after it
            let (document, id) = state.document.edit(|blocks| {
                let id = blocks.fresh_id();
                blocks.insert(
                    cursor.block_index + 1,
                    Block::paragraph(id).with_text(text, style),
                );
                id
            });
            return (
                Self::moved_to(document, DocumentPosition::new(id, inserted)),
                CommandResult::Handled,
            );
        }

        let block_id = block.id;
        let (document, ()) = state.document.edit(|blocks| {
            blocks[cursor.block_index].insert_text(cursor.offset, text, style);
        });
        (
            Self::moved_to(
                document,
                DocumentPosition::new(block_id, cursor.offset + inserted),
            ),
            CommandResult::Handled,
        )
    }

    /// Enter: split the block at the cursor. List items continue the list,
    /// an empty list item leaves it, headings continue as paragraphs.
    pub fn split_block(&self) -> CommandOutput {
        self.break_block(false)
    }

    /// Shift+Enter: split the block and continue with a paragraph
    pub fn exit_list(&self) -> CommandOutput {
        self.break_block(true)
    }

    fn break_block(&self, leave_list: bool) -> CommandOutput {
        let state = self.collapsed_for_insert();
        let cursor = state.cursor();
        let index = cursor.block_index;
        let block = &state.document.blocks()[index];

        if block.is_image() {
            let (document, id) = state.document.edit(|blocks| {
                let id = blocks.fresh_id();
                blocks.insert(index + 1, Block::paragraph(id));
                id
            });
            return (
                Self::moved_to(document, DocumentPosition::new(id, 0)),
                CommandResult::Handled,
            );
        }

        if block.block_type.list_kind().is_some() && block.is_empty() {
            let id = block.id;
            let (document, ()) = state.document.edit(|blocks| {
                blocks[index].block_type = BlockType::Paragraph;
            });
            return (
                Self::moved_to(document, DocumentPosition::new(id, 0)),
                CommandResult::Handled,
            );
        }

        let continuation = match block.block_type {
            BlockType::ListItem { list } if !leave_list => BlockType::ListItem { list },
            _ => BlockType::Paragraph,
        };

        if cursor.offset == 0 && !block.is_empty() {
            // The block moves down below a new empty one
            let id = block.id;
            let (document, ()) = state.document.edit(|blocks| {
                let new_id = blocks.fresh_id();
                blocks.insert(index, Block::new(new_id, continuation));
            });
            return (
                Self::moved_to(document, DocumentPosition::new(id, 0)),
                CommandResult::Handled,
            );
        }

        let (document, id) = state.document.edit(|blocks| {
            let right = blocks[index].split_content_at(cursor.offset);
            let id = blocks.fresh_id();
            let mut next = Block::new(id, continuation);
            next.content = right;
            blocks.insert(index + 1, next);
            id
        });
        (
            Self::moved_to(document, DocumentPosition::new(id, 0)),
            CommandResult::Handled,
        )
    }

    /// Backspace
    pub fn delete_backward(&self) -> CommandOutput {
        if !self.selection.is_collapsed() {
            return self.delete_selection();
        }
        let cursor = self.cursor();
        let index = cursor.block_index;
        let blocks = self.document.blocks();
        let block = &blocks[index];

        if block.is_image() {
            return self.remove_image(index);
        }

        if cursor.offset > 0 {
            let from = block.previous_grapheme_offset(cursor.offset);
            let id = block.id;
            let (document, ()) = self.document.edit(|blocks| {
                blocks[index].delete_text_range(from, cursor.offset);
            });
            return (
                Self::moved_to(document, DocumentPosition::new(id, from)),
                CommandResult::Handled,
            );
        }

        if block.block_type != BlockType::Paragraph {
            // At the start of a heading or list item the style goes first
            let (document, ()) = self.document.edit(|blocks| {
                blocks[index].block_type = BlockType::Paragraph;
            });
            return (self.keeping_selection(document), CommandResult::Handled);
        }

        if index == 0 {
            return self.not_handled();
        }

        let previous = &blocks[index - 1];
        if previous.is_image() {
            let (document, ()) = self.document.edit(|blocks| {
                blocks.remove(index - 1);
            });
            return (self.keeping_selection(document), CommandResult::Handled);
        }

        let target = DocumentPosition::new(previous.id, previous.text_len());
        let (document, ()) = self.document.edit(|blocks| {
            let current = blocks.remove(index);
            blocks[index - 1].content.extend(current.content);
        });
        (Self::moved_to(document, target), CommandResult::Handled)
    }

    /// Delete key
    pub fn delete_forward(&self) -> CommandOutput {
        if !self.selection.is_collapsed() {
            return self.delete_selection();
        }
        let cursor = self.cursor();
        let index = cursor.block_index;
        let blocks = self.document.blocks();
        let block = &blocks[index];

        if block.is_image() {
            return self.remove_image(index);
        }

        if cursor.offset < block.text_len() {
            let to = block.next_grapheme_offset(cursor.offset);
            let (document, ()) = self.document.edit(|blocks| {
                blocks[index].delete_text_range(cursor.offset, to);
            });
            return (self.keeping_selection(document), CommandResult::Handled);
        }

        let Some(next) = blocks.get(index + 1) else {
            return self.not_handled();
        };
        let next_is_image = next.is_image();
        let (document, ()) = self.document.edit(|blocks| {
            let next = blocks.remove(index + 1);
            if !next_is_image {
                blocks[index].content.extend(next.content);
            }
        });
        (self.keeping_selection(document), CommandResult::Handled)
    }

    /// Delete from the start of the block to the cursor
    pub fn delete_to_block_start(&self) -> CommandOutput {
        if !self.selection.is_collapsed() {
            return self.delete_selection();
        }
        let cursor = self.cursor();
        let block = &self.document.blocks()[cursor.block_index];
        if block.is_image() || cursor.offset == 0 {
            return self.delete_backward();
        }
        let id = block.id;
        let (document, ()) = self.document.edit(|blocks| {
            blocks[cursor.block_index].delete_text_range(0, cursor.offset);
        });
        (
            Self::moved_to(document, DocumentPosition::new(id, 0)),
            CommandResult::Handled,
        )
    }

    fn remove_image(&self, index: usize) -> CommandOutput {
        let blocks = self.document.blocks();
        let target = match (index.checked_sub(1).map(|i| &blocks[i]), blocks.get(index + 1)) {
            (Some(previous), _) => DocumentPosition::new(previous.id, previous.text_len()),
            (None, Some(next)) => DocumentPosition::new(next.id, 0),
            // The document is left empty and gets a fresh paragraph
            (None, None) => DocumentPosition::new(0, 0),
        };
        let (document, ()) = self.document.edit(|blocks| {
            blocks.remove(index);
        });
        (Self::moved_to(document, target), CommandResult::Handled)
    }

    /// Remove the selected content. Images touched by a selection spanning
    /// several blocks are removed; the text around the selection is joined.
    pub fn delete_selection(&self) -> CommandOutput {
        if self.selection.is_collapsed() {
            return self.not_handled();
        }
        let (start, end) = self.document.ordered_range(&self.selection);
        let first = &self.document.blocks()[start.block_index];

        if start.block_index == end.block_index {
            let id = first.id;
            let (document, ()) = self.document.edit(|blocks| {
                blocks[start.block_index].delete_text_range(start.offset, end.offset);
            });
            return (
                Self::moved_to(document, DocumentPosition::new(id, start.offset)),
                CommandResult::Handled,
            );
        }

        let (document, cursor) = self.document.edit(|blocks| {
            let first_index = start.block_index;
            let mut last = blocks[end.block_index].clone();
            let tail = (!last.is_image()).then(|| last.split_content_at(end.offset));
            blocks.drain(first_index + 1..=end.block_index);

            if !blocks[first_index].is_image() {
                let first = &mut blocks[first_index];
                let len = first.text_len();
                first.delete_text_range(start.offset, len);
                if let Some(tail) = tail {
                    first.content.extend(tail);
                }
                return DocumentPosition::new(first.id, start.offset);
            }

            blocks.remove(first_index);
            if let Some(tail) = tail {
                let id = blocks.fresh_id();
                let mut rest = Block::new(id, last.block_type);
                rest.content = tail;
                blocks.insert(first_index, rest);
                return DocumentPosition::new(id, 0);
            }
            match first_index.checked_sub(1).map(|i| &blocks[i]) {
                Some(previous) => DocumentPosition::new(previous.id, previous.text_len()),
                None => blocks
                    .first()
                    .map(|next| DocumentPosition::new(next.id, 0))
                    .unwrap_or(DocumentPosition::new(0, 0)),
            }
        });
        (Self::moved_to(document, cursor), CommandResult::Handled)
    }

    /// Paste plain text. Each line after the first starts a new block.
    pub fn paste_text(&self, text: &str) -> CommandOutput {
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        let lines: Vec<&str> = normalized.split('\n').collect();
        if lines.len() == 1 {
            return self.insert_text(lines[0]);
        }

        let state = self.collapsed_for_insert();
        let cursor = state.cursor();
        let index = cursor.block_index;
        let block = &state.document.blocks()[index];
        let style = match state.pending_style {
            Some(style) => style,
            None if block.is_image() => TextStyle::plain(),
            None => block.style_at(cursor.offset),
        };

        let (document, end) = state.document.edit(|blocks| {
            let mut remaining = lines.as_slice();
            let (continuation, mut right) = if blocks[index].is_image() {
                (BlockType::Paragraph, Vec::new())
            } else {
                let right = blocks[index].split_content_at(cursor.offset);
                blocks[index].content.push(TextRun::new(lines[0], style));
                remaining = &lines[1..];
                let continuation = match blocks[index].block_type {
                    BlockType::ListItem { list } => BlockType::ListItem { list },
                    _ => BlockType::Paragraph,
                };
                (continuation, right)
            };

            let mut end = DocumentPosition::new(0, 0);
            for (i, line) in remaining.iter().enumerate() {
                let id = blocks.fresh_id();
                let mut block = Block::new(id, continuation.clone()).with_text(*line, style);
                if i + 1 == remaining.len() {
                    end = DocumentPosition::new(id, line.chars().count());
                    block.content.append(&mut right);
                }
                blocks.insert(index + 1 + i, block);
            }
            end
        });
        (Self::moved_to(document, end), CommandResult::Handled)
    }
}

impl Default for EditorState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(id: &str) -> MediaReference {
        MediaReference::new(id, format!("https://cdn.example.com/review-images/{}.png", id))
            .unwrap()
    }

    fn state(blocks: Vec<Block>) -> EditorState {
        EditorState::with_document(StructuredDocument::from_blocks(blocks))
    }

    fn at(state: &EditorState, block_index: usize, offset: usize) -> DocumentPosition {
        state.document.position_at(block_index, offset)
    }

    fn select(state: &EditorState, from: (usize, usize), to: (usize, usize)) -> EditorState {
        state.set_selection(Selection::new(
            at(state, from.0, from.1),
            at(state, to.0, to.1),
        ))
    }

    fn types(state: &EditorState) -> Vec<BlockType> {
        state
            .document
            .blocks()
            .iter()
            .map(|b| b.block_type.clone())
            .collect()
    }

    fn texts(state: &EditorState) -> Vec<String> {
        state
            .document
            .blocks()
            .iter()
            .map(|b| b.to_plain_text())
            .collect()
    }

    fn assert_runs_merged(state: &EditorState) {
        for block in state.document.blocks() {
            for pair in block.content.windows(2) {
                assert_ne!(pair[0].style, pair[1].style, "unmerged runs in {:?}", block);
            }
            assert!(block.content.iter().all(|run| !run.is_empty()));
        }
    }

    #[test]
    fn test_insert_text() {
        let (editor, result) = EditorState::new().insert_text("Hello");
        assert_eq!(result, CommandResult::Handled);
        assert_eq!(editor.document.to_plain_text(), "Hello");
        assert_eq!(editor.cursor().offset, 5);

        let (editor, _) = editor.insert_text(" world");
        assert_eq!(editor.document.to_plain_text(), "Hello world");
    }

    #[test]
    fn test_commands_leave_input_untouched() {
        let before = EditorState::new();
        let (after, _) = before.insert_text("x");
        assert!(before.document.is_blank());
        assert!(!after.document.ptr_eq(&before.document));
    }

    #[test]
    fn test_toggle_bold_across_blocks() {
        let editor = state(vec![
            Block::paragraph(0).with_plain_text("Hello"),
            Block::paragraph(0).with_plain_text("World"),
        ]);
        let editor = select(&editor, (0, 2), (1, 3));
        let (editor, result) = editor.toggle_inline_mark(Mark::Bold);
        assert_eq!(result, CommandResult::Handled);
        assert_eq!(
            editor.document.blocks()[0].content,
            vec![TextRun::plain("He"), TextRun::new("llo", TextStyle::bold())]
        );
        assert_eq!(
            editor.document.blocks()[1].content,
            vec![TextRun::new("Wor", TextStyle::bold()), TextRun::plain("ld")]
        );

        // Everything selected is bold now, so toggling again removes it
        let (editor, _) = editor.toggle_inline_mark(Mark::Bold);
        assert_eq!(texts(&editor), vec!["Hello", "World"]);
        assert!(editor
            .document
            .blocks()
            .iter()
            .all(|b| b.content.len() == 1 && b.content[0].style.is_plain()));
    }

    #[test]
    fn test_toggle_mark_on_partially_marked_selection_adds() {
        let editor = state(vec![
            Block::paragraph(0)
                .with_text("ab", TextStyle::italic())
                .with_plain_text("cd"),
        ]);
        let editor = select(&editor, (0, 0), (0, 4));
        let (editor, _) = editor.toggle_inline_mark(Mark::Italic);
        assert_eq!(
            editor.document.blocks()[0].content,
            vec![TextRun::new("abcd", TextStyle::italic())]
        );
        assert_runs_merged(&editor);
    }

    #[test]
    fn test_marks_stay_merged() {
        let mut editor = state(vec![Block::paragraph(0).with_plain_text("abcdefgh")]);
        for (from, to, mark) in [
            (0, 4, Mark::Bold),
            (2, 6, Mark::Italic),
            (4, 8, Mark::Bold),
            (0, 8, Mark::Underline),
            (2, 6, Mark::Italic),
            (0, 8, Mark::Underline),
        ] {
            editor = select(&editor, (0, from), (0, to));
            editor = editor.toggle_inline_mark(mark).0;
            assert_runs_merged(&editor);
        }
        assert_eq!(
            editor.document.blocks()[0].content,
            vec![TextRun::new("abcdefgh", TextStyle::bold())]
        );
    }

    #[test]
    fn test_collapsed_toggle_sets_pending_style() {
        let (editor, _) = EditorState::new().insert_text("plain ");
        let (editor, result) = editor.toggle_inline_mark(Mark::Bold);
        assert_eq!(result, CommandResult::Handled);
        assert_eq!(editor.pending_style, Some(TextStyle::bold()));

        let (editor, _) = editor.insert_text("bold");
        assert_eq!(
            editor.document.blocks()[0].content,
            vec![
                TextRun::plain("plain "),
                TextRun::new("bold", TextStyle::bold())
            ]
        );
        assert_eq!(editor.pending_style, None);

        // Moving the cursor drops a pending style
        let (editor, _) = editor.toggle_inline_mark(Mark::Italic);
        let moved = editor.set_selection(Selection::collapsed(at(&editor, 0, 0)));
        assert_eq!(moved.pending_style, None);
    }

    #[test]
    fn test_toggle_paragraph_is_idempotent() {
        let editor = state(vec![
            Block::heading(0, HeadingLevel::One).with_plain_text("Title"),
        ]);
        let (once, result) = editor.toggle_block_type(BlockToggle::Paragraph);
        assert_eq!(result, CommandResult::Handled);
        assert_eq!(types(&once), vec![BlockType::Paragraph]);

        let (twice, result) = once.toggle_block_type(BlockToggle::Paragraph);
        assert_eq!(result, CommandResult::Handled);
        assert_eq!(twice, once);
        assert!(twice.document.ptr_eq(&once.document));
    }

    #[test]
    fn test_toggle_list_kinds() {
        let editor = state(vec![
            Block::paragraph(0).with_plain_text("a"),
            Block::paragraph(0).with_plain_text("b"),
        ]);
        let editor = select(&editor, (0, 0), (1, 1));
        let ordered = BlockType::ListItem {
            list: ListKind::Ordered,
        };
        let unordered = BlockType::ListItem {
            list: ListKind::Unordered,
        };

        let (editor, _) = editor.toggle_block_type(BlockToggle::OrderedList);
        assert_eq!(types(&editor), vec![ordered.clone(), ordered]);

        // A different list kind converts directly
        let (editor, _) = editor.toggle_block_type(BlockToggle::UnorderedList);
        assert_eq!(types(&editor), vec![unordered.clone(), unordered]);

        // The active kind reverts to paragraphs
        let (editor, _) = editor.toggle_block_type(BlockToggle::UnorderedList);
        assert_eq!(types(&editor), vec![BlockType::Paragraph, BlockType::Paragraph]);
    }

    #[test]
    fn test_toggle_block_type_skips_images() {
        let editor = state(vec![Block::image(0, media("a"))]);
        let (after, result) = editor.toggle_block_type(BlockToggle::OrderedList);
        assert_eq!(result, CommandResult::NotHandled);
        assert_eq!(after, editor);

        let editor = state(vec![
            Block::paragraph(0).with_plain_text("a"),
            Block::image(0, media("b")),
        ]);
        let editor = select(&editor, (0, 0), (1, 0));
        let (editor, _) = editor.toggle_block_type(BlockToggle::Heading(HeadingLevel::Two));
        assert_eq!(
            types(&editor),
            vec![
                BlockType::Heading {
                    level: HeadingLevel::Two
                },
                BlockType::Image(media("b"))
            ]
        );
    }

    #[test]
    fn test_insert_image_splits_block() {
        let editor = state(vec![Block::paragraph(0).with_plain_text("beforeafter")]);
        let editor = editor.set_selection(Selection::collapsed(at(&editor, 0, 6)));
        let (editor, result) = editor.insert_image(media("abc"));
        assert_eq!(result, CommandResult::Handled);
        assert_eq!(texts(&editor), vec!["before", "", "after"]);
        assert_eq!(editor.document.blocks()[1].block_type, BlockType::Image(media("abc")));
        assert_eq!(editor.cursor().block_index, 1);
    }

    #[test]
    fn test_insert_image_at_block_edges() {
        let editor = state(vec![Block::paragraph(0).with_plain_text("text")]);

        let (start, _) = editor.insert_image(media("a"));
        assert!(start.document.blocks()[0].is_image());

        let end = editor.set_selection(Selection::collapsed(at(&editor, 0, 4)));
        let (end, _) = end.insert_image(media("b"));
        assert!(end.document.blocks()[1].is_image());

        // On an image, the new one follows it
        let (end, _) = end.insert_image(media("c"));
        assert_eq!(
            types(&end)[1..],
            [BlockType::Image(media("b")), BlockType::Image(media("c"))]
        );
    }

    #[test]
    fn test_insert_image_placeholder_checks_url() {
        let editor = EditorState::new();
        let (after, result) =
            editor.insert_image_placeholder("abc123", "https://cdn.example.com/other.png");
        assert_eq!(result, CommandResult::NotHandled);
        assert_eq!(after, editor);

        let (after, result) =
            editor.insert_image_placeholder("abc123", "https://cdn.example.com/abc123.png");
        assert_eq!(result, CommandResult::Handled);
        assert_eq!(after.document.media_references().count(), 1);
    }

    #[test]
    fn test_split_block_in_lists_and_headings() {
        let editor = state(vec![
            Block::list_item(0, ListKind::Unordered).with_plain_text("one"),
        ]);
        let editor = editor.set_selection(Selection::collapsed(at(&editor, 0, 3)));
        let (editor, _) = editor.split_block();
        let item = BlockType::ListItem {
            list: ListKind::Unordered,
        };
        assert_eq!(types(&editor), vec![item.clone(), item.clone()]);

        // Enter on the empty item leaves the list
        let (editor, _) = editor.split_block();
        assert_eq!(types(&editor), vec![item, BlockType::Paragraph]);

        let heading = state(vec![
            Block::heading(0, HeadingLevel::One).with_plain_text("Title"),
        ]);
        let heading = heading.set_selection(Selection::collapsed(at(&heading, 0, 5)));
        let (heading, _) = heading.split_block();
        assert_eq!(types(&heading)[1], BlockType::Paragraph);
    }

    #[test]
    fn test_exit_list_continues_with_paragraph() {
        let editor = state(vec![
            Block::list_item(0, ListKind::Ordered).with_plain_text("onetwo"),
        ]);
        let editor = editor.set_selection(Selection::collapsed(at(&editor, 0, 3)));
        let (editor, result) = editor.handle_key_command("soft-newline");
        assert_eq!(result, CommandResult::Handled);
        assert_eq!(texts(&editor), vec!["one", "two"]);
        assert_eq!(types(&editor)[1], BlockType::Paragraph);
    }

    #[test]
    fn test_backspace_resets_block_style_then_merges() {
        let editor = state(vec![
            Block::paragraph(0).with_plain_text("para"),
            Block::list_item(0, ListKind::Ordered).with_plain_text("item"),
        ]);
        let editor = editor.set_selection(Selection::collapsed(at(&editor, 1, 0)));

        let (editor, _) = editor.handle_key_command("backspace");
        assert_eq!(types(&editor), vec![BlockType::Paragraph, BlockType::Paragraph]);

        let (editor, _) = editor.handle_key_command("backspace");
        assert_eq!(texts(&editor), vec!["paraitem"]);
        assert_eq!(editor.cursor().offset, 4);
    }

    #[test]
    fn test_backspace_removes_preceding_image() {
        let editor = state(vec![
            Block::paragraph(0).with_plain_text("a"),
            Block::image(0, media("x")),
            Block::paragraph(0).with_plain_text("b"),
        ]);
        let editor = editor.set_selection(Selection::collapsed(at(&editor, 2, 0)));
        let (editor, _) = editor.delete_backward();
        assert_eq!(texts(&editor), vec!["a", "b"]);
        assert_eq!(editor.document.media_references().count(), 0);
        assert_eq!(editor.cursor().block_index, 1);
    }

    #[test]
    fn test_backspace_is_grapheme_aware() {
        let (editor, _) = EditorState::new().insert_text("ae\u{301}");
        let (editor, _) = editor.delete_backward();
        assert_eq!(editor.document.to_plain_text(), "a");
    }

    #[test]
    fn test_delete_forward_removes_following_image() {
        let editor = state(vec![
            Block::paragraph(0).with_plain_text("a"),
            Block::image(0, media("x")),
        ]);
        let editor = editor.set_selection(Selection::collapsed(at(&editor, 0, 1)));
        let (editor, result) = editor.handle_key_command("delete");
        assert_eq!(result, CommandResult::Handled);
        assert_eq!(texts(&editor), vec!["a"]);

        let (_, result) = editor.delete_forward();
        assert_eq!(result, CommandResult::NotHandled);
    }

    #[test]
    fn test_delete_block_backward() {
        let editor = state(vec![Block::paragraph(0).with_plain_text("hello world")]);
        let editor = editor.set_selection(Selection::collapsed(at(&editor, 0, 6)));
        let (editor, _) = editor.handle_key_command("delete-block-backward");
        assert_eq!(texts(&editor), vec!["world"]);
        assert_eq!(editor.cursor().offset, 0);
    }

    #[test]
    fn test_delete_selection_across_blocks() {
        let editor = state(vec![
            Block::paragraph(0).with_plain_text("Hello"),
            Block::image(0, media("gone")),
            Block::heading(0, HeadingLevel::Two).with_plain_text("World"),
        ]);
        let editor = select(&editor, (2, 2), (0, 3));
        let (editor, _) = editor.delete_selection();
        assert_eq!(texts(&editor), vec!["Helrld"]);
        assert_eq!(types(&editor), vec![BlockType::Paragraph]);
        assert!(editor.selection.is_collapsed());
        assert_eq!(editor.cursor().offset, 3);
    }

    #[test]
    fn test_paste_lines_become_blocks() {
        let editor = state(vec![
            Block::list_item(0, ListKind::Unordered).with_plain_text("ab"),
        ]);
        let editor = editor.set_selection(Selection::collapsed(at(&editor, 0, 1)));
        let (editor, _) = editor.paste_text("1\r\n2\n3");
        assert_eq!(texts(&editor), vec!["a1", "2", "3b"]);
        assert!(types(&editor).iter().all(|t| t.list_kind() == Some(ListKind::Unordered)));
        assert_eq!(editor.cursor().block_index, 2);
        assert_eq!(editor.cursor().offset, 1);
    }

    #[test]
    fn test_unknown_key_command() {
        let editor = EditorState::new();
        let (after, result) = editor.handle_key_command("transpose-characters");
        assert_eq!(result, CommandResult::NotHandled);
        assert_eq!(after, editor);
    }

    #[test]
    fn test_key_commands_map_to_toggles() {
        let (editor, _) = EditorState::new().insert_text("x");
        for (name, expected) in [
            (
                "header-three",
                BlockType::Heading {
                    level: HeadingLevel::Three,
                },
            ),
            ("paragraph", BlockType::Paragraph),
            (
                "ordered-list-item",
                BlockType::ListItem {
                    list: ListKind::Ordered,
                },
            ),
        ] {
            let (after, result) = editor.handle_key_command(name);
            assert_eq!(result, CommandResult::Handled, "{}", name);
            assert_eq!(types(&after), vec![expected]);
        }
    }
}
