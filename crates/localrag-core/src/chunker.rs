//! Token-budgeted chunking for the doc-chunk export mode.
//!
//! Paragraphs (blank-line separated) are the structural unit. Consecutive
//! paragraphs on the same page and under the same headings are merged while
//! the result still fits the budget; a paragraph that alone exceeds it is
//! split on sentence boundaries, then on words, then on characters.

use crate::error::Result;
use crate::markdown::{heading, is_fence};
use crate::parser::ParsedDocument;
use crate::tokens::TokenCounter;
use crate::types::Chunk;

pub struct HybridChunker<'a> {
    counter: &'a TokenCounter,
    max_tokens: usize,
}

struct Block {
    page_number: Option<u32>,
    header_path: Vec<String>,
    text: String,
}

impl<'a> HybridChunker<'a> {
    pub fn new(counter: &'a TokenCounter, max_tokens: usize) -> Self {
        Self { counter, max_tokens: max_tokens.max(1) }
    }

    pub fn chunk(&self, doc: &ParsedDocument) -> Result<Vec<Chunk>> {
        let source_path = doc.path.to_string_lossy().to_string();
        let mut chunks = Vec::new();
        for piece in self.merge(blocks(doc)) {
            let index = chunks.len();
            chunks.push(Chunk::new(piece.text, source_path.clone(), piece.page_number, piece.header_path, index)?);
        }
        Ok(chunks)
    }

    fn fits(&self, text: &str) -> bool { self.counter.count(text) <= self.max_tokens }

    fn merge(&self, blocks: Vec<Block>) -> Vec<Block> {
        let mut out: Vec<Block> = Vec::new();
        let mut current: Option<Block> = None;
        for block in blocks {
            if !self.fits(&block.text) {
                out.extend(current.take());
                for text in self.split_oversized(&block.text) {
                    out.push(Block { page_number: block.page_number, header_path: block.header_path.clone(), text });
                }
                continue;
            }
            current = match current.take() {
                Some(mut cur) if cur.page_number == block.page_number && cur.header_path == block.header_path => {
                    let joined = format!("{}\n\n{}", cur.text, block.text);
                    if self.fits(&joined) {
                        cur.text = joined;
                        Some(cur)
                    } else {
                        out.push(cur);
                        Some(block)
                    }
                }
                Some(cur) => {
                    out.push(cur);
                    Some(block)
                }
                None => Some(block),
            };
        }
        out.extend(current);
        out
    }

    fn split_oversized(&self, text: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut buf = String::new();
        for sentence in sentences(text) {
            if !self.fits(sentence) {
                if !buf.is_empty() {
                    pieces.push(std::mem::take(&mut buf));
                }
                pieces.extend(self.pack(sentence.split_whitespace()));
                continue;
            }
            let candidate = if buf.is_empty() {
                sentence.to_string()
            } else if buf.ends_with(is_wide_terminal) {
                format!("{buf}{sentence}")
            } else {
                format!("{buf} {sentence}")
            };
            if self.fits(&candidate) {
                buf = candidate;
            } else {
                pieces.push(std::mem::replace(&mut buf, sentence.to_string()));
            }
        }
        if !buf.is_empty() {
            pieces.push(buf);
        }
        pieces
    }

    /// Greedy word packing; a single word over budget is cut on characters.
    fn pack<'w>(&self, words: impl Iterator<Item = &'w str>) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut buf = String::new();
        for word in words {
            if !self.fits(word) {
                if !buf.is_empty() {
                    pieces.push(std::mem::take(&mut buf));
                }
                pieces.extend(self.counter.split_to_budget(word, self.max_tokens));
                continue;
            }
            let candidate = if buf.is_empty() { word.to_string() } else { format!("{buf} {word}") };
            if self.fits(&candidate) {
                buf = candidate;
            } else {
                pieces.push(std::mem::replace(&mut buf, word.to_string()));
            }
        }
        if !buf.is_empty() {
            pieces.push(buf);
        }
        pieces
    }
}

fn is_wide_terminal(c: char) -> bool { matches!(c, '。' | '！' | '？') }

/// Sentences end at `.!?` followed by whitespace, or at `。！？`.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if is_wide_terminal(c) {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = end;
            continue;
        }
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next, n)) = chars.peek() {
            if n.is_whitespace() {
                let sentence = text[start..next].trim();
                if !sentence.is_empty() {
                    out.push(sentence);
                }
                start = next;
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn blocks(doc: &ParsedDocument) -> Vec<Block> {
    let markup = doc.format.has_markup();
    let mut headers: [Option<String>; 3] = [None, None, None];
    let mut out = Vec::new();
    for page in &doc.pages {
        let mut in_fence = false;
        let mut para: Vec<&str> = Vec::new();
        for line in page.text.lines() {
            if markup && is_fence(line) {
                in_fence = !in_fence;
                para.push(line);
                continue;
            }
            if !in_fence && line.trim().is_empty() {
                push_block(&mut out, &headers, page.number, &mut para);
                continue;
            }
            if markup && !in_fence {
                if let Some((level, title)) = heading(line) {
                    push_block(&mut out, &headers, page.number, &mut para);
                    headers[level - 1] = Some(title.to_string());
                    for deeper in headers.iter_mut().skip(level) {
                        *deeper = None;
                    }
                    continue;
                }
            }
            para.push(line);
        }
        push_block(&mut out, &headers, page.number, &mut para);
    }
    out
}

fn push_block(out: &mut Vec<Block>, headers: &[Option<String>; 3], page_number: Option<u32>, para: &mut Vec<&str>) {
    let text = para.join("\n").trim().to_string();
    para.clear();
    if !text.is_empty() {
        out.push(Block { page_number, header_path: headers.iter().flatten().cloned().collect(), text });
    }
}
