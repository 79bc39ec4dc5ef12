// Markdown Converter
// Converts between StructuredDocument and Markdown text format
// Markdown is used purely as a storage/serialization format

use super::builder::BlockBuilder;
use super::html_converter::{html_image_urls, walk_html_into};
use super::structured_document::*;
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use tracing::debug;

/// Characters escaped with a backslash wherever they appear in text
const ALWAYS_ESCAPED: &[char] = &[
    '\\', '`', '*', '_', '[', ']', '<', '>', '&', '!', '~', '|', '#',
];

/// Characters that would open a block construct at the start of a line
const BLOCK_START_ESCAPED: &[char] = &['-', '+', '='];

/// Convert a StructuredDocument to markdown text
pub fn document_to_markdown(doc: &StructuredDocument) -> String {
    if doc.is_blank() {
        return String::new();
    }

    let mut output = String::new();
    let mut previous_list: Option<ListKind> = None;
    let mut item_number = 0usize;

    for (i, block) in doc.blocks().iter().enumerate() {
        let list = block.block_type.list_kind();
        if i > 0 {
            // Items of one list stay tight
            if list.is_some() && list == previous_list {
                output.push('\n');
            } else {
                output.push_str("\n\n");
            }
        }
        item_number = if list.is_some() && list == previous_list {
            item_number + 1
        } else {
            1
        };
        previous_list = list;

        match &block.block_type {
            BlockType::Paragraph => {
                if block.is_empty() {
                    // A blank line cannot hold an empty paragraph
                    output.push_str("<p></p>");
                } else {
                    write_inline(&mut output, &block.content);
                }
            }
            BlockType::Heading { level } => {
                output.push_str(&"#".repeat(level.as_u8() as usize));
                if !block.is_empty() {
                    output.push(' ');
                    write_inline(&mut output, &block.content);
                }
            }
            BlockType::ListItem { list } => {
                match list {
                    ListKind::Unordered => output.push('-'),
                    ListKind::Ordered => output.push_str(&format!("{}.", item_number)),
                }
                if !block.is_empty() {
                    output.push(' ');
                    write_inline(&mut output, &block.content);
                }
            }
            BlockType::Image(media) => {
                output.push_str("![image](");
                write_destination(&mut output, media.url());
                output.push(')');
            }
        }
    }

    output
}

fn write_destination(output: &mut String, url: &str) {
    let bracketed = url
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '<' | '>'));
    if bracketed {
        output.push('<');
    }
    for c in url.chars() {
        if matches!(c, '\\' | '&' | '<' | '>') {
            output.push('\\');
        }
        output.push(c);
    }
    if bracketed {
        output.push('>');
    }
}

/// Write the runs of one text block.
///
/// Bold and italic use `*` delimiters only where emphasis parsing cannot
/// misread them; everything else falls back to inline HTML tags, which the
/// reader understands as well. Underline has no markdown syntax.
fn write_inline(output: &mut String, runs: &[TextRun]) {
    let total: usize = runs.iter().map(|run| run.len()).sum();
    let text: String = runs.iter().map(|run| run.text.as_str()).collect();
    let leading = text.chars().take_while(|&c| is_edge_blank(c)).count();
    let trailing = if leading == total {
        0
    } else {
        text.chars()
            .rev()
            .take_while(|&c| is_edge_blank(c))
            .count()
    };
    let edges = Edges {
        leading,
        trailing_from: total - trailing,
        marker_punct: ordinal_marker_punct(&text),
    };

    let mut pos = 0usize;
    for (i, run) in runs.iter().enumerate() {
        let delimiters = uses_delimiters(runs, i);
        let style = run.style;
        if style.underline {
            output.push_str("<u>");
        }
        let delimiter = match (style.bold, style.italic) {
            (true, true) => "***",
            (true, false) => "**",
            (false, true) => "*",
            (false, false) => "",
        };
        if delimiters {
            output.push_str(delimiter);
        } else {
            if style.italic {
                output.push_str("<em>");
            }
            if style.bold {
                output.push_str("<strong>");
            }
        }

        for c in run.text.chars() {
            write_char(output, c, pos, &edges);
            pos += 1;
        }

        if delimiters {
            output.push_str(delimiter);
        } else {
            if style.bold {
                output.push_str("</strong>");
            }
            if style.italic {
                output.push_str("</em>");
            }
        }
        if style.underline {
            output.push_str("</u>");
        }
    }
}

/// Positions in a block's text that need block-level escaping
struct Edges {
    /// Characters before this index are leading whitespace
    leading: usize,
    /// Whitespace from this index on is trailing
    trailing_from: usize,
    /// Index of the `.`/`)` that would turn leading digits into a list marker
    marker_punct: Option<usize>,
}

fn write_char(output: &mut String, c: char, pos: usize, edges: &Edges) {
    let at_edge = pos < edges.leading || pos >= edges.trailing_from;
    match c {
        // Leading and trailing blanks would be stripped by the parser
        c if at_edge && is_edge_blank(c) => {
            output.push_str("&#");
            output.push_str(&u32::from(c).to_string());
            output.push(';');
        }
        _ => {
            let escape = ALWAYS_ESCAPED.contains(&c)
                || (pos == 0 && BLOCK_START_ESCAPED.contains(&c))
                || edges.marker_punct == Some(pos);
            if escape {
                output.push('\\');
            }
            output.push(c);
        }
    }
}

/// Blanks the parser trims from the edges of a paragraph or heading
fn is_edge_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\u{b}' | '\u{c}')
}

fn ordinal_marker_punct(text: &str) -> Option<usize> {
    let digits = text.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    match text.chars().nth(digits) {
        Some('.') | Some(')') => Some(digits),
        _ => None,
    }
}

fn uses_delimiters(runs: &[TextRun], index: usize) -> bool {
    let emphasized = |run: &TextRun| run.style.bold || run.style.italic;
    let run = &runs[index];
    if !emphasized(run) {
        return false;
    }
    let alphanumeric_edges = match (run.text.chars().next(), run.text.chars().last()) {
        (Some(first), Some(last)) => first.is_alphanumeric() && last.is_alphanumeric(),
        _ => false,
    };
    let before = index.checked_sub(1).and_then(|i| runs.get(i));
    let after = runs.get(index + 1);
    alphanumeric_edges && !before.is_some_and(emphasized) && !after.is_some_and(emphasized)
}

/// Convert markdown text to a StructuredDocument.
///
/// Constructs the document model cannot hold are reduced: code becomes
/// plain text, links keep their text, `####` and deeper headings become
/// paragraphs and quotes are unwrapped.
pub fn markdown_to_document(markdown: &str) -> StructuredDocument {
    let mut builder = BlockBuilder::new();
    let mut styles = vec![TextStyle::plain()];
    let mut lists: Vec<ListKind> = Vec::new();
    let mut image_depth = 0usize;
    let mut html_block: Option<String> = None;
    let mut in_code_block = false;

    for event in Parser::new_ext(markdown, Options::empty()) {
        if image_depth > 0 {
            // Alt text is not content
            match event {
                Event::Start(Tag::Image { .. }) => image_depth += 1,
                Event::End(TagEnd::Image) => image_depth -= 1,
                _ => {}
            }
            continue;
        }

        let style = styles.last().copied().unwrap_or_default();
        match event {
            Event::Start(tag) => match tag {
                Tag::Paragraph => builder.open_paragraph(),
                Tag::Heading { level, .. } => match HeadingLevel::from_u8(level as u8) {
                    Some(level) => builder.open(BlockType::Heading { level }),
                    None => builder.open_paragraph(),
                },
                Tag::List(start_number) => {
                    builder.break_block();
                    lists.push(if start_number.is_some() {
                        ListKind::Ordered
                    } else {
                        ListKind::Unordered
                    });
                }
                Tag::Item => {
                    let list = lists.last().copied().unwrap_or(ListKind::Unordered);
                    builder.open(BlockType::ListItem { list });
                }
                Tag::Emphasis => styles.push(style.with(Mark::Italic, true)),
                Tag::Strong => styles.push(style.with(Mark::Bold, true)),
                Tag::Image { dest_url, .. } => {
                    image_depth = 1;
                    match MediaReference::from_url(dest_url.to_string()) {
                        Some(media) => builder.push_image(media),
                        None => {
                            debug!(url = %dest_url, "dropping image without media id");
                            builder.skip_image();
                        }
                    }
                }
                Tag::HtmlBlock => {
                    builder.break_block();
                    html_block = Some(String::new());
                }
                Tag::CodeBlock(_) => {
                    in_code_block = true;
                    builder.open(BlockType::Paragraph);
                }
                Tag::BlockQuote(_) => builder.break_block(),
                _ => {}
            },
            Event::End(tag_end) => match tag_end {
                TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item => {
                    builder.close();
                    styles.truncate(1);
                }
                TagEnd::CodeBlock => {
                    in_code_block = false;
                    builder.close();
                }
                TagEnd::List(_) => {
                    lists.pop();
                    builder.break_block();
                }
                TagEnd::Emphasis | TagEnd::Strong => {
                    if styles.len() > 1 {
                        styles.pop();
                    }
                }
                TagEnd::HtmlBlock => {
                    if let Some(html) = html_block.take() {
                        walk_html_into(&mut builder, &html);
                    }
                    builder.break_block();
                }
                TagEnd::BlockQuote(_) => builder.break_block(),
                _ => {}
            },
            Event::Text(text) => {
                if in_code_block {
                    builder.push_text(text.trim_end_matches('\n'), style);
                } else {
                    builder.push_text(&text, style);
                }
            }
            Event::Code(code) => builder.push_text(&code, style),
            Event::Html(html) => {
                if let Some(buffer) = html_block.as_mut() {
                    buffer.push_str(&html);
                }
            }
            Event::InlineHtml(tag) => match inline_tag(&tag) {
                Some(InlineTag::Open(mark)) => styles.push(style.with(mark, true)),
                Some(InlineTag::Close) => {
                    if styles.len() > 1 {
                        styles.pop();
                    }
                }
                Some(InlineTag::Break) => builder.push_text(" ", style),
                None => {}
            },
            Event::SoftBreak | Event::HardBreak => builder.push_text(" ", style),
            _ => {}
        }
    }

    builder.finish()
}

enum InlineTag {
    Open(Mark),
    Close,
    Break,
}

/// Recognize the inline HTML tags that carry formatting
fn inline_tag(tag: &str) -> Option<InlineTag> {
    let tag = tag.trim().to_ascii_lowercase();
    let inner = tag.strip_prefix('<')?.strip_suffix('>')?.trim_end_matches('/').trim();
    let (closing, name) = match inner.strip_prefix('/') {
        Some(name) => (true, name.trim()),
        None => (false, inner),
    };
    let name = name.split_whitespace().next()?;
    let mark = match name {
        "b" | "strong" => Mark::Bold,
        "i" | "em" => Mark::Italic,
        "u" => Mark::Underline,
        "br" => return Some(InlineTag::Break),
        _ => return None,
    };
    Some(if closing {
        InlineTag::Close
    } else {
        InlineTag::Open(mark)
    })
}

/// Image destinations in a markdown document, in document order.
/// Visits exactly the images the deserializer would turn into blocks.
pub fn markdown_image_urls(markdown: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut image_depth = 0usize;
    let mut html_block: Option<String> = None;

    for event in Parser::new_ext(markdown, Options::empty()) {
        match event {
            Event::Start(Tag::Image { dest_url, .. }) => {
                if image_depth == 0 {
                    urls.push(dest_url.to_string());
                }
                image_depth += 1;
            }
            Event::End(TagEnd::Image) => image_depth = image_depth.saturating_sub(1),
            Event::Start(Tag::HtmlBlock) => html_block = Some(String::new()),
            Event::Html(html) => {
                if let Some(buffer) = html_block.as_mut() {
                    buffer.push_str(&html);
                }
            }
            Event::End(TagEnd::HtmlBlock) => {
                if let Some(html) = html_block.take() {
                    urls.extend(html_image_urls(&html));
                }
            }
            _ => {}
        }
    }
    urls
}
