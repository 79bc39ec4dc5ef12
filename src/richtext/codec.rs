// Review Formats
// The two text forms a review can be stored in, behind one interface.

use super::html_converter::{document_to_html, html_image_urls, html_to_document};
use super::markdown_converter::{document_to_markdown, markdown_image_urls, markdown_to_document};
use super::structured_document::StructuredDocument;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Persisted form of a review document
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReviewFormat {
    #[default]
    Html,
    Markdown,
}

/// Converts documents to and from one persisted text form.
///
/// `serialize` must be deterministic and `deserialize` must never fail;
/// `deserialize(serialize(d)) == d` holds for every document.
pub trait DocumentCodec: Send + Sync {
    fn format(&self) -> ReviewFormat;

    fn serialize(&self, doc: &StructuredDocument) -> String;

    fn deserialize(&self, text: &str) -> StructuredDocument;

    /// Urls of the images `deserialize` would produce, without building the document
    fn image_urls(&self, text: &str) -> Vec<String>;
}

pub struct HtmlCodec;

impl DocumentCodec for HtmlCodec {
    fn format(&self) -> ReviewFormat {
        ReviewFormat::Html
    }

    fn serialize(&self, doc: &StructuredDocument) -> String {
        document_to_html(doc)
    }

    fn deserialize(&self, text: &str) -> StructuredDocument {
        html_to_document(text)
    }

    fn image_urls(&self, text: &str) -> Vec<String> {
        html_image_urls(text)
    }
}

pub struct MarkdownCodec;

impl DocumentCodec for MarkdownCodec {
    fn format(&self) -> ReviewFormat {
        ReviewFormat::Markdown
    }

    fn serialize(&self, doc: &StructuredDocument) -> String {
        document_to_markdown(doc)
    }

    fn deserialize(&self, text: &str) -> StructuredDocument {
        markdown_to_document(text)
    }

    fn image_urls(&self, text: &str) -> Vec<String> {
        markdown_image_urls(text)
    }
}

impl ReviewFormat {
    pub fn codec(self) -> &'static dyn DocumentCodec {
        match self {
            ReviewFormat::Html => &HtmlCodec,
            ReviewFormat::Markdown => &MarkdownCodec,
        }
    }

    pub fn serialize(self, doc: &StructuredDocument) -> String {
        self.codec().serialize(doc)
    }

    pub fn deserialize(self, text: &str) -> StructuredDocument {
        self.codec().deserialize(text)
    }

    pub fn extension(self) -> &'static str {
        match self {
            ReviewFormat::Html => "html",
            ReviewFormat::Markdown => "md",
        }
    }

    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "html" | "htm" => Some(ReviewFormat::Html),
            "md" | "markdown" => Some(ReviewFormat::Markdown),
            _ => None,
        }
    }
}

impl fmt::Display for ReviewFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReviewFormat::Html => "html",
            ReviewFormat::Markdown => "markdown",
        })
    }
}
