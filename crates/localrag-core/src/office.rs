//! Text extraction from Office Open XML packages (docx, pptx).
//!
//! Both are zip archives of XML parts. Word paragraphs come from
//! `word/document.xml`; a `HeadingN` paragraph style (N <= 3) becomes an ATX
//! heading. Each `ppt/slides/slideN.xml` becomes page N.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::parser::Page;

fn open(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).map_err(|e| Error::load(path, e))?;
    ZipArchive::new(file).map_err(|e| Error::load(path, e))
}

fn read_part(archive: &mut ZipArchive<File>, path: &Path, name: &str) -> Result<String> {
    let mut part = archive.by_name(name).map_err(|e| Error::load(path, format!("{name}: {e}")))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml).map_err(|e| Error::load(path, format!("{name}: {e}")))?;
    Ok(xml)
}

pub fn docx_pages(path: &Path) -> Result<Vec<Page>> {
    let mut archive = open(path)?;
    let xml = read_part(&mut archive, path, "word/document.xml")?;
    let text = docx_text(&xml).map_err(|e| Error::load(path, e))?;
    Ok(vec![Page { number: None, text }])
}

pub fn pptx_pages(path: &Path) -> Result<Vec<Page>> {
    let mut archive = open(path)?;
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let n = name.strip_prefix("ppt/slides/slide")?.strip_suffix(".xml")?.parse().ok()?;
            Some((n, name.to_string()))
        })
        .collect();
    slides.sort();
    let mut pages = Vec::with_capacity(slides.len());
    for (number, name) in slides {
        let xml = read_part(&mut archive, path, &name)?;
        let text = slide_text(&xml).map_err(|e| Error::load(path, format!("{name}: {e}")))?;
        pages.push(Page { number: Some(number), text });
    }
    Ok(pages)
}

fn heading_level(e: &BytesStart) -> Option<usize> {
    let attr = e.try_get_attribute("w:val").ok()??;
    let style = attr.unescape_value().ok()?;
    let level: usize = style.strip_prefix("Heading")?.parse().ok()?;
    (1..=3).contains(&level).then_some(level)
}

/// Paragraphs of a `word/document.xml` part, separated by blank lines.
pub fn docx_text(xml: &str) -> std::result::Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut level = None;
    let mut in_text = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) if e.name().as_ref() == b"w:t" => in_text = false,
            Event::Empty(e) | Event::Start(e) if e.name().as_ref() == b"w:pStyle" => level = heading_level(&e),
            Event::Empty(e) if e.name().as_ref() == b"w:tab" => current.push('\t'),
            Event::Empty(e) if e.name().as_ref() == b"w:br" => current.push('\n'),
            Event::Text(t) if in_text => current.push_str(&t.unescape()?),
            Event::End(e) if e.name().as_ref() == b"w:p" => {
                let text = current.trim();
                if !text.is_empty() {
                    match level {
                        Some(n) => paragraphs.push(format!("{} {text}", "#".repeat(n))),
                        None => paragraphs.push(text.to_string()),
                    }
                }
                current.clear();
                level = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs.join("\n\n"))
}

/// Paragraphs of one slide, one per line.
pub fn slide_text(xml: &str) -> std::result::Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"a:t" => in_text = true,
            Event::End(e) if e.name().as_ref() == b"a:t" => in_text = false,
            Event::Text(t) if in_text => current.push_str(&t.unescape()?),
            Event::End(e) if e.name().as_ref() == b"a:p" => {
                let line = current.trim();
                if !line.is_empty() {
                    lines.push(line.to_string());
                }
                current.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(lines.join("\n"))
}
