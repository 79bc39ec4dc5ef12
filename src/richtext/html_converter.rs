// HTML Converter
// Converts between StructuredDocument and the HTML review format.
// Serialization is deterministic; deserialization accepts whatever HTML a
// review was stored with and keeps only what the document model can hold.

use super::builder::BlockBuilder;
use super::html_parser::{HtmlElement, HtmlNode, parse_fragment};
use super::structured_document::*;
use pulldown_cmark_escape::escape_html;
use tracing::debug;

/// Subtrees that never contribute content
const SKIPPED_ELEMENTS: &[&str] = &["head", "script", "style", "template", "title", "noscript"];

/// Elements treated as plain inline wrappers: their text is kept, the element is not
const TRANSPARENT_INLINE: &[&str] = &[
    "a", "abbr", "bdi", "bdo", "cite", "code", "data", "del", "dfn", "font", "ins", "kbd",
    "label", "mark", "q", "s", "samp", "small", "span", "strike", "sub", "sup", "time", "var",
];

/// Convert a StructuredDocument to HTML
pub fn document_to_html(doc: &StructuredDocument) -> String {
    let mut output = String::new();
    let mut open_list: Option<ListKind> = None;

    for block in doc.blocks() {
        let list = block.block_type.list_kind();
        if open_list != list {
            if let Some(kind) = open_list {
                output.push_str(list_tag(kind, true));
            }
            if let Some(kind) = list {
                output.push_str(list_tag(kind, false));
            }
            open_list = list;
        }

        match &block.block_type {
            BlockType::Paragraph => {
                output.push_str("<p>");
                write_runs(&mut output, &block.content);
                output.push_str("</p>");
            }
            BlockType::Heading { level } => {
                let level = level.as_u8();
                output.push_str(&format!("<h{}>", level));
                write_runs(&mut output, &block.content);
                output.push_str(&format!("</h{}>", level));
            }
            BlockType::ListItem { .. } => {
                output.push_str("<li>");
                write_runs(&mut output, &block.content);
                output.push_str("</li>");
            }
            BlockType::Image(media) => {
                output.push_str("<figure><img src=\"");
                push_escaped(&mut output, media.url());
                output.push_str("\"></figure>");
            }
        }
    }

    if let Some(kind) = open_list {
        output.push_str(list_tag(kind, true));
    }
    output
}

fn list_tag(kind: ListKind, closing: bool) -> &'static str {
    match (kind, closing) {
        (ListKind::Ordered, false) => "<ol>",
        (ListKind::Ordered, true) => "</ol>",
        (ListKind::Unordered, false) => "<ul>",
        (ListKind::Unordered, true) => "</ul>",
    }
}

/// Marks nest as `<u><em><strong>text</strong></em></u>`
fn write_runs(output: &mut String, runs: &[TextRun]) {
    for run in runs {
        if run.style.underline {
            output.push_str("<u>");
        }
        if run.style.italic {
            output.push_str("<em>");
        }
        if run.style.bold {
            output.push_str("<strong>");
        }
        push_escaped(output, &run.text);
        if run.style.bold {
            output.push_str("</strong>");
        }
        if run.style.italic {
            output.push_str("</em>");
        }
        if run.style.underline {
            output.push_str("</u>");
        }
    }
}

fn push_escaped(output: &mut String, text: &str) {
    // Writing into a String cannot fail
    let _ = escape_html(&mut *output, text);
}

/// Convert review HTML to a StructuredDocument.
///
/// Unknown elements are unwrapped, `h4`-`h6` become paragraphs, and images
/// whose url does not encode a media id are dropped.
pub fn html_to_document(html: &str) -> StructuredDocument {
    let mut builder = BlockBuilder::new();
    walk_html_into(&mut builder, html);
    builder.finish()
}

/// Feed an HTML fragment into a builder. Also used for HTML blocks embedded in markdown.
pub(crate) fn walk_html_into(builder: &mut BlockBuilder, html: &str) {
    let nodes = parse_fragment(html);
    let mut lists = Vec::new();
    walk_nodes(builder, &nodes, TextStyle::plain(), &mut lists);
}

fn walk_nodes(
    builder: &mut BlockBuilder,
    nodes: &[HtmlNode],
    style: TextStyle,
    lists: &mut Vec<ListKind>,
) {
    for node in nodes {
        match node {
            HtmlNode::Text(text) => builder.push_text(text, style),
            HtmlNode::Element(element) => walk_element(builder, element, style, lists),
        }
    }
}

fn walk_element(
    builder: &mut BlockBuilder,
    element: &HtmlElement,
    style: TextStyle,
    lists: &mut Vec<ListKind>,
) {
    let children = &element.children;
    match element.name.as_str() {
        "p" | "h4" | "h5" | "h6" => {
            builder.open_paragraph();
            walk_nodes(builder, children, style, lists);
            builder.close();
        }
        "h1" | "h2" | "h3" => {
            let level = element.name[1..]
                .parse::<u8>()
                .ok()
                .and_then(HeadingLevel::from_u8)
                .unwrap_or(HeadingLevel::One);
            builder.open(BlockType::Heading { level });
            walk_nodes(builder, children, style, lists);
            builder.close();
        }
        "ul" | "ol" => {
            builder.break_block();
            lists.push(if element.name == "ol" {
                ListKind::Ordered
            } else {
                ListKind::Unordered
            });
            walk_nodes(builder, children, style, lists);
            lists.pop();
            builder.break_block();
        }
        "li" => {
            let list = lists.last().copied().unwrap_or(ListKind::Unordered);
            builder.open(BlockType::ListItem { list });
            walk_nodes(builder, children, style, lists);
            builder.close();
        }
        "img" => match element.attr("src").and_then(MediaReference::from_url) {
            Some(media) => builder.push_image(media),
            None => {
                debug!(src = ?element.attr("src"), "dropping image without media id");
                builder.skip_image();
            }
        },
        "br" => builder.push_text(" ", style),
        "strong" | "b" => walk_nodes(builder, children, style.with(Mark::Bold, true), lists),
        "em" | "i" => walk_nodes(builder, children, style.with(Mark::Italic, true), lists),
        "u" => walk_nodes(builder, children, style.with(Mark::Underline, true), lists),
        name if SKIPPED_ELEMENTS.contains(&name) => {}
        name if TRANSPARENT_INLINE.contains(&name) => walk_nodes(builder, children, style, lists),
        _ => {
            // Unknown containers (div, figure, blockquote, ...) delimit blocks
            builder.break_block();
            walk_nodes(builder, children, style, lists);
            builder.break_block();
        }
    }
}

/// Image urls in an HTML document, in document order.
/// Visits exactly the images the deserializer would turn into blocks.
pub fn html_image_urls(html: &str) -> Vec<String> {
    let mut urls = Vec::new();
    collect_image_urls(&parse_fragment(html), &mut urls);
    urls
}

fn collect_image_urls(nodes: &[HtmlNode], urls: &mut Vec<String>) {
    for node in nodes {
        if let HtmlNode::Element(element) = node {
            match element.name.as_str() {
                "img" => {
                    if let Some(src) = element.attr("src") {
                        urls.push(src.to_string());
                    }
                }
                name if SKIPPED_ELEMENTS.contains(&name) => {}
                _ => collect_image_urls(&element.children, urls),
            }
        }
    }
}
