use std::collections::HashSet;

use localrag_core::types::{Citation, SearchHit};

/// Distinct citations in the order they were first retrieved.
#[derive(Debug, Clone, Default)]
pub struct CitationSet {
    order: Vec<Citation>,
    seen: HashSet<Citation>,
}

impl CitationSet {
    pub fn from_hits(hits: &[SearchHit]) -> Self {
        let mut set = Self::default();
        for hit in hits {
            set.insert(hit.chunk.citation());
        }
        set
    }

    pub fn insert(&mut self, citation: Citation) -> bool {
        if self.seen.contains(&citation) {
            return false;
        }
        self.seen.insert(citation.clone());
        self.order.push(citation);
        true
    }

    pub fn is_empty(&self) -> bool { self.order.is_empty() }
    pub fn len(&self) -> usize { self.order.len() }
    pub fn iter(&self) -> impl Iterator<Item = &Citation> { self.order.iter() }

    /// One `path#page=N` line per citation; `None` when there is nothing to cite.
    pub fn render(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        Some(self.order.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"))
    }
}
