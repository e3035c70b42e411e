//! ATX header splitter (levels 1-3) for the markdown export mode.

use crate::parser::Page;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub header_path: Vec<String>,
    pub page_number: Option<u32>,
    pub text: String,
}

/// Returns `(level, title)` for `#`, `##` and `###` heading lines.
pub fn heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 3 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    Some((level, rest.trim().trim_end_matches('#').trim_end()))
}

pub(crate) fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

/// Split pages into header-tagged sections.
///
/// The header path carries over page breaks; a heading resets every deeper
/// level. Heading lines are dropped from the text, and sections with no
/// remaining text are skipped.
pub fn split_sections(pages: &[Page]) -> Vec<Section> {
    let mut headers: [Option<String>; 3] = [None, None, None];
    let mut sections = Vec::new();
    for page in pages {
        let mut in_fence = false;
        let mut body: Vec<&str> = Vec::new();
        for line in page.text.lines() {
            if is_fence(line) {
                in_fence = !in_fence;
                body.push(line);
                continue;
            }
            match (in_fence, heading(line)) {
                (false, Some((level, title))) => {
                    flush(&mut sections, &headers, page.number, &mut body);
                    headers[level - 1] = Some(title.to_string());
                    for deeper in headers.iter_mut().skip(level) {
                        *deeper = None;
                    }
                }
                _ => body.push(line),
            }
        }
        flush(&mut sections, &headers, page.number, &mut body);
    }
    sections
}

fn flush(sections: &mut Vec<Section>, headers: &[Option<String>; 3], page_number: Option<u32>, body: &mut Vec<&str>) {
    let text = body.join("\n").trim().to_string();
    body.clear();
    if text.is_empty() {
        return;
    }
    sections.push(Section { header_path: headers.iter().flatten().cloned().collect(), page_number, text });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(text: &str, number: Option<u32>) -> Page { Page { number, text: text.to_string() } }

    #[test]
    fn heading_requires_space_after_marker() {
        assert_eq!(heading("## Setup"), Some((2, "Setup")));
        assert_eq!(heading("#"), Some((1, "")));
        assert_eq!(heading("#hashtag"), None);
        assert_eq!(heading("#### Deep"), None);
    }

    #[test]
    fn headings_reset_deeper_levels() {
        let text = "# A\nintro\n## B\nbody b\n### C\nbody c\n## D\nbody d\n";
        let sections = split_sections(&[page(text, None)]);
        let paths: Vec<Vec<String>> = sections.iter().map(|s| s.header_path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                vec!["A".to_string()],
                vec!["A".to_string(), "B".to_string()],
                vec!["A".to_string(), "B".to_string(), "C".to_string()],
                vec!["A".to_string(), "D".to_string()],
            ]
        );
        assert_eq!(sections[3].text, "body d");
    }

    #[test]
    fn fenced_code_is_not_split() {
        let text = "# Code\n```\n# not a heading\n```\n";
        let sections = split_sections(&[page(text, None)]);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].text.contains("# not a heading"));
    }

    #[test]
    fn headers_carry_across_pages() {
        let sections = split_sections(&[page("# Intro\nfirst", Some(1)), page("second", Some(2))]);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].header_path, vec!["Intro".to_string()]);
        assert_eq!(sections[1].page_number, Some(2));
    }

    #[test]
    fn empty_sections_are_dropped() {
        let sections = split_sections(&[page("# A\n\n# B\ntext", None)]);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].header_path, vec!["B".to_string()]);
    }
}
