//! Turns a file on disk into page-level text.

use scraper::{ElementRef, Html, Selector};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::office;
use crate::traits::DocumentParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Markdown,
    Html,
    Pdf,
    Docx,
    Pptx,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "text" | "rst" | "csv" | "log" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            _ => None,
        }
    }

    /// PDF pages and presentation slides are numbered from 1.
    pub fn is_paginated(self) -> bool { matches!(self, Self::Pdf | Self::Pptx) }

    /// Formats whose text carries ATX headings after parsing.
    pub fn has_markup(self) -> bool { matches!(self, Self::Markdown | Self::Html | Self::Docx) }
}

#[derive(Debug, Clone)]
pub struct Page {
    pub number: Option<u32>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub path: PathBuf,
    pub format: DocumentFormat,
    pub pages: Vec<Page>,
}

impl ParsedDocument {
    pub fn is_blank(&self) -> bool { self.pages.iter().all(|p| p.text.trim().is_empty()) }
}

/// Built-in parser for text, markdown, HTML, PDF and Office files.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalParser;

impl DocumentParser for LocalParser {
    fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let format = DocumentFormat::from_path(path).ok_or_else(|| Error::UnsupportedFormat {
            path: path.display().to_string(),
            extension: path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_else(|| "<none>".to_string()),
        })?;
        let pages = match format {
            DocumentFormat::Text | DocumentFormat::Markdown => {
                vec![Page { number: None, text: read_lossy(path)? }]
            }
            DocumentFormat::Html => vec![Page { number: None, text: html_to_text(&read_lossy(path)?) }],
            DocumentFormat::Pdf => pdf_pages(path)?,
            DocumentFormat::Docx => office::docx_pages(path)?,
            DocumentFormat::Pptx => office::pptx_pages(path)?,
        };
        Ok(ParsedDocument { path: path.to_path_buf(), format, pages })
    }
}

fn read_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| Error::load(path, e))?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).to_string(),
    })
}

fn pdf_pages(path: &Path) -> Result<Vec<Page>> {
    let doc = lopdf::Document::load(path).map_err(|e| Error::load(path, e))?;
    let mut pages = Vec::new();
    for (number, _) in doc.get_pages() {
        let text = doc
            .extract_text(&[number])
            .map_err(|e| Error::load(path, format!("page {number}: {e}")))?;
        pages.push(Page { number: Some(number), text });
    }
    Ok(pages)
}

const BLOCKS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "pre", "blockquote", "td", "th", "dt", "dd"];

/// Block-level text separated by blank lines; h1-h3 become ATX headings.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(&BLOCKS.join(", ")) else {
        return String::new();
    };
    let mut blocks = Vec::new();
    for element in document.select(&selector) {
        if nested_in_block(&element) {
            continue;
        }
        let text = collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "));
        if text.is_empty() {
            continue;
        }
        match element.value().name() {
            "h1" => blocks.push(format!("# {text}")),
            "h2" => blocks.push(format!("## {text}")),
            "h3" => blocks.push(format!("### {text}")),
            _ => blocks.push(text),
        }
    }
    if blocks.is_empty() {
        if let Ok(body) = Selector::parse("body") {
            if let Some(body) = document.select(&body).next() {
                return collapse_whitespace(&body.text().collect::<Vec<_>>().join(" "));
            }
        }
    }
    blocks.join("\n\n")
}

fn nested_in_block(element: &ElementRef) -> bool {
    element
        .ancestors()
        .filter_map(|node| node.value().as_element())
        .any(|el| BLOCKS.contains(&el.name()))
}

fn collapse_whitespace(text: &str) -> String { text.split_whitespace().collect::<Vec<_>>().join(" ") }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_headings_become_markdown() {
        let html = "<html><body><h1>Title</h1><p>Intro  text</p><ul><li><p>item</p></li></ul><h2>Sub</h2><p>More</p></body></html>";
        let text = html_to_text(html);
        assert_eq!(text, "# Title\n\nIntro text\n\nitem\n\n## Sub\n\nMore");
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = LocalParser.parse(Path::new("budget.xlsx")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }
}
