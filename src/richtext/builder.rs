// Block Builder
// Collects blocks for the converters. Both the HTML tree walk and the markdown
// event stream are reduced to open/close/text/image calls on this builder.

use super::structured_document::*;

pub(crate) struct BlockBuilder {
    blocks: Vec<Block>,
    current: Option<Block>,
    /// Enclosing explicit block types; text arriving outside any open block
    /// (for example after an image split it) reopens the innermost one.
    context: Vec<BlockType>,
    /// Set when an image was dropped from the current block; if the block
    /// stays blank it was only the image's wrapper.
    dropped_image: bool,
}

impl BlockBuilder {
    pub fn new() -> Self {
        BlockBuilder {
            blocks: Vec::new(),
            current: None,
            context: Vec::new(),
            dropped_image: false,
        }
    }

    /// Enter an explicit block element (heading, list item, ...)
    pub fn open(&mut self, block_type: BlockType) {
        self.drop_or_emit_current();
        self.current = Some(Block::new(0, block_type.clone()));
        self.context.push(block_type);
    }

    /// Enter a paragraph. Inside a list item the paragraph continues the item.
    pub fn open_paragraph(&mut self) {
        let block_type = match self.context.last() {
            Some(list_item @ BlockType::ListItem { .. }) => list_item.clone(),
            _ => BlockType::Paragraph,
        };
        match &mut self.current {
            Some(block) if block.block_type == block_type && is_blank(block) => {
                block.content.clear();
                self.context.push(block_type);
            }
            _ => self.open(block_type),
        }
    }

    /// Leave the innermost explicit block element. The block is emitted even if empty.
    pub fn close(&mut self) {
        if let Some(block) = self.current.take()
            && !(self.dropped_image && is_blank(&block))
        {
            self.blocks.push(block);
        }
        self.dropped_image = false;
        self.context.pop();
    }

    /// End any open block at a container boundary (lists, unknown containers)
    pub fn break_block(&mut self) {
        self.drop_or_emit_current();
    }

    pub fn push_text(&mut self, text: &str, style: TextStyle) {
        let block = match &mut self.current {
            Some(block) => block,
            None => {
                // Whitespace between blocks carries no content
                if text.trim().is_empty() {
                    return;
                }
                let block_type = match self.context.last() {
                    Some(BlockType::Image(_)) | None => BlockType::Paragraph,
                    Some(other) => other.clone(),
                };
                self.current.insert(Block::new(0, block_type))
            }
        };
        block.content.push(TextRun::new(text, style));
    }

    /// Emit an image block, splitting any open text block around it
    pub fn push_image(&mut self, media: MediaReference) {
        self.drop_or_emit_current();
        self.blocks.push(Block::image(0, media));
    }

    /// An image was present but cannot be represented
    pub fn skip_image(&mut self) {
        self.dropped_image = true;
    }

    pub fn finish(mut self) -> StructuredDocument {
        if let Some(block) = self.current.take() {
            self.blocks.push(block);
        }
        StructuredDocument::from_blocks(self.blocks)
    }

    /// A block that is still blank when something structural interrupts it
    /// was only a wrapper and is dropped.
    fn drop_or_emit_current(&mut self) {
        self.dropped_image = false;
        if let Some(block) = self.current.take()
            && !is_blank(&block)
        {
            self.blocks.push(block);
        }
    }
}

fn is_blank(block: &Block) -> bool {
    block.content.iter().all(|run| run.text.trim().is_empty())
}
