use super::media_id_from_url;
use crate::richtext::{ReviewFormat, StructuredDocument};
use std::collections::BTreeSet;
use tracing::debug;

/// Media ids referenced by a document, straight from its image blocks
pub fn extract_references(doc: &StructuredDocument) -> BTreeSet<String> {
    doc.media_references()
        .map(|media| media.media_id().to_string())
        .collect()
}

/// Media ids referenced by persisted review text.
///
/// Yields the same set as deserializing `text` and calling
/// [`extract_references`], without building the document. Image urls
/// that carry no media id are skipped.
pub fn extract_references_from_text(format: ReviewFormat, text: &str) -> BTreeSet<String> {
    format
        .codec()
        .image_urls(text)
        .iter()
        .filter_map(|url| {
            let id = media_id_from_url(url);
            if id.is_none() {
                debug!(%url, "skipping image url without media id");
            }
            id.map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::richtext::{Block, MediaReference};

    fn image(id: &str) -> Block {
        Block::image(
            0,
            MediaReference::new(id, format!("https://cdn.example.com/img/{}.webp", id)).unwrap(),
        )
    }

    #[test]
    fn test_extract_from_document() {
        let doc = StructuredDocument::from_blocks(vec![
            image("b"),
            Block::paragraph(0).with_plain_text("text"),
            image("a"),
            image("b"),
        ]);
        let ids: Vec<_> = extract_references(&doc).into_iter().collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_text_and_document_agree() {
        let doc = StructuredDocument::from_blocks(vec![
            Block::paragraph(0).with_plain_text("intro"),
            image("x1"),
            Block::list_item(0, crate::richtext::ListKind::Ordered).with_plain_text("item"),
            image("y2"),
        ]);
        for format in [ReviewFormat::Html, ReviewFormat::Markdown] {
            let text = format.serialize(&doc);
            assert_eq!(
                extract_references_from_text(format, &text),
                extract_references(&doc),
                "{} form: {}",
                format,
                text
            );
        }
    }

    #[test]
    fn test_unparseable_references_are_skipped() {
        let html = r#"<p><img src="https://cdn.example.com/"></p><img src="/uploads/ok.png"><img>"#;
        let ids: Vec<_> = extract_references_from_text(ReviewFormat::Html, html)
            .into_iter()
            .collect();
        assert_eq!(ids, vec!["ok"]);

        let markdown = "![a](no-extension)\n\n![b](/uploads/fine.jpg)";
        let ids: Vec<_> = extract_references_from_text(ReviewFormat::Markdown, markdown)
            .into_iter()
            .collect();
        assert_eq!(ids, vec!["fine"]);
    }
}
