use figment::providers::{Format, Toml};
use figment::Figment;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use localrag_core::config::{EmbeddingFailurePolicy, ExportMode, Settings};
use localrag_core::error::Error;
use localrag_core::loader::{DocumentLoader, LoadStatus};
use localrag_core::parser::LocalParser;
use localrag_core::tokens::TokenCounter;

fn loader(mode: ExportMode, max_tokens: usize) -> DocumentLoader {
    DocumentLoader::from_parts(Arc::new(LocalParser), TokenCounter::Approximate, mode, max_tokens, 2)
}

#[test]
fn settings_defaults_are_valid() {
    let settings = Settings::from_figment(Figment::new()).expect("defaults");
    assert_eq!(settings.retrieval.top_k, 4);
    assert_eq!(settings.ingest.mode, ExportMode::DocChunks);
    assert_eq!(settings.ingest.on_embedding_error, EmbeddingFailurePolicy::Continue);
    assert_eq!(settings.embedding.max_retries, 0);
}

#[test]
fn settings_merge_toml_sections() {
    let toml = r#"
        [index]
        collection = "manuals"
        [embedding]
        provider = "fake"
        model = "hash"
        dimension = 64
        [ingest]
        mode = "markdown"
        on_embedding_error = "abort"
        chunk_max_tokens = 9000
    "#;
    let settings = Settings::from_figment(Figment::new().merge(Toml::string(toml))).expect("settings");
    assert_eq!(settings.index.collection, "manuals");
    assert_eq!(settings.embedding.embedder_id(), "fake:hash:d64");
    assert_eq!(settings.ingest.mode, ExportMode::Markdown);
    assert_eq!(settings.ingest.on_embedding_error, EmbeddingFailurePolicy::Abort);
    // the embedder's own input limit caps the chunk budget
    assert_eq!(settings.chunk_token_budget(), settings.embedding.max_input_tokens);
}

#[test]
fn settings_reject_bad_values() {
    for toml in [
        "[index]\ncollection = \"bad name\"",
        "[llm]\nurl = \"ftp://host\"",
        "[embedding]\ndimension = 0",
        "[retrieval]\ntop_k = 0",
        "[ingest]\ntokenizer_file = \"/definitely/not/here.json\"",
    ] {
        let err = Settings::from_figment(Figment::new().merge(Toml::string(toml))).unwrap_err();
        assert!(err.is_configuration(), "{toml} -> {err}");
    }
}

#[tokio::test]
async fn empty_directory_yields_no_documents() {
    let tmp = TempDir::new().unwrap();
    let outcome = loader(ExportMode::DocChunks, 64).load_path(tmp.path()).await.expect("load");
    assert!(outcome.chunks.is_empty());
    assert!(matches!(outcome.status(), LoadStatus::NoDocuments(msg) if msg.contains("no documents loaded")));
}

#[tokio::test]
async fn missing_path_is_not_an_error() {
    let tmp = TempDir::new().unwrap();
    let outcome = loader(ExportMode::DocChunks, 64).load_path(&tmp.path().join("nope")).await.expect("load");
    assert!(outcome.missing);
    assert!(matches!(outcome.status(), LoadStatus::NoDocuments(msg) if msg.contains("does not exist")));
}

#[tokio::test]
async fn bad_file_in_directory_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("a.txt"), "alpha bravo").unwrap();
    fs::write(dir.join("b.pdf"), b"this is not a pdf").unwrap();
    fs::write(dir.join("c.txt"), "charlie delta").unwrap();

    let outcome = loader(ExportMode::DocChunks, 64).load_path(dir).await.expect("load");
    assert_eq!(outcome.attempted, 3);
    assert_eq!(outcome.loaded, 2);
    assert_eq!(outcome.skipped.len(), 1);
    assert!(outcome.skipped[0].path.ends_with("b.pdf"));
    assert!(!outcome.skipped[0].reason.is_empty());
    let sources: Vec<&str> = outcome.chunks.iter().map(|c| c.source_path.as_str()).collect();
    assert!(sources[0].ends_with("a.txt") && sources[1].ends_with("c.txt"), "sorted order");
}

#[tokio::test]
async fn single_file_failure_propagates() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("deck.odp");
    fs::write(&file, b"zip bytes").unwrap();
    let err = loader(ExportMode::DocChunks, 64).load_path(&file).await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat { .. }));

    let broken = tmp.path().join("deck.pptx");
    fs::write(&broken, b"zip bytes").unwrap();
    let err = loader(ExportMode::DocChunks, 64).load_path(&broken).await.unwrap_err();
    assert!(matches!(err, Error::Load { .. }));
}

#[tokio::test]
async fn directory_walk_is_not_recursive() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("top.txt"), "top level").unwrap();
    fs::create_dir(tmp.path().join("nested")).unwrap();
    fs::write(tmp.path().join("nested/inner.txt"), "inner text").unwrap();
    let outcome = loader(ExportMode::DocChunks, 64).load_path(tmp.path()).await.expect("load");
    assert_eq!(outcome.attempted, 1);
    assert!(outcome.chunks.iter().all(|c| c.source_path.ends_with("top.txt")));
}

#[test]
fn markdown_mode_tags_header_paths() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("guide.md");
    fs::write(&file, "# Guide\nintro\n## Install\nrun it\n### Linux\napt\n## Use\nclick\n").unwrap();
    let chunks = loader(ExportMode::Markdown, 64).load_file(&file).expect("load");
    let paths: Vec<String> = chunks.iter().map(|c| c.header_path.join(" > ")).collect();
    assert_eq!(paths, vec!["Guide", "Guide > Install", "Guide > Install > Linux", "Guide > Use"]);
    assert_eq!(chunks[2].text, "apt");
    assert!(chunks.iter().enumerate().all(|(i, c)| c.chunk_index == i && c.page_number.is_none()));
}

#[test]
fn doc_chunks_respect_token_budget() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("long.txt");
    let sentence = "The quick brown fox jumps over the lazy dog.";
    let paragraph = vec![sentence; 20].join(" ");
    fs::write(&file, format!("short intro\n\nsecond paragraph\n\n{paragraph}")).unwrap();

    let counter = TokenCounter::Approximate;
    let chunks = loader(ExportMode::DocChunks, 30).load_file(&file).expect("load");
    assert!(chunks.len() > 2);
    assert_eq!(chunks[0].text, "short intro\n\nsecond paragraph", "small paragraphs merge");
    for chunk in &chunks {
        assert!(counter.count(&chunk.text) <= 30, "chunk over budget: {}", chunk.text);
    }
    let rebuilt: Vec<&str> = chunks[1..].iter().flat_map(|c| c.text.split_whitespace()).collect();
    assert_eq!(rebuilt.join(" "), paragraph);
}

#[test]
fn doc_chunks_start_new_chunk_per_section() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("notes.md");
    fs::write(&file, "# One\nfirst\n\n# Two\nsecond\n").unwrap();
    let chunks = loader(ExportMode::DocChunks, 500).load_file(&file).expect("load");
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].header_path, vec!["One".to_string()]);
    assert_eq!(chunks[1].text, "second");
}

#[test]
fn html_headings_feed_header_path() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("page.html");
    fs::write(&file, "<html><body><h1>Pumps</h1><p>Prime before use.</p></body></html>").unwrap();
    let chunks = loader(ExportMode::DocChunks, 500).load_file(&file).expect("load");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].header_path, vec!["Pumps".to_string()]);
    assert_eq!(chunks[0].text, "Prime before use.");
}

#[test]
fn lossy_decoding_of_invalid_utf8() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("latin1.txt");
    fs::write(&file, [b'c', b'a', b'f', 0xE9, b' ', b'o', b'k']).unwrap();
    let chunks = loader(ExportMode::DocChunks, 64).load_file(&file).expect("load");
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].text.ends_with(" ok"));
}

#[test]
fn unspaced_cjk_text_stays_within_budget() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("pump.txt");
    let text = "水泵在首次使用前必须灌水。".repeat(800);
    fs::write(&file, &text).unwrap();

    let counter = TokenCounter::Approximate;
    let chunks = loader(ExportMode::DocChunks, 16).load_file(&file).expect("load");
    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| counter.count(&c.text) <= 16));
    assert_eq!(chunks.iter().map(|c| c.text.as_str()).collect::<String>(), text);

    let run = "灌".repeat(100);
    fs::write(&file, &run).unwrap();
    let chunks = loader(ExportMode::DocChunks, 16).load_file(&file).expect("load");
    assert!(chunks.len() >= 7);
    assert!(chunks.iter().all(|c| counter.count(&c.text) <= 16));
    assert_eq!(chunks.iter().map(|c| c.text.as_str()).collect::<String>(), run);
}

fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

#[test]
fn pdf_chunks_carry_page_numbers() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("manual.pdf");
    write_pdf(&file, &["Prime the pump", "Check the seals"]);

    for mode in [ExportMode::DocChunks, ExportMode::Markdown] {
        let chunks = loader(mode, 64).load_file(&file).expect("load");
        let pages: Vec<Option<u32>> = chunks.iter().map(|c| c.page_number).collect();
        assert_eq!(pages, vec![Some(1), Some(2)], "{mode:?}");
        assert!(chunks[0].text.contains("Prime"));
        assert!(chunks[1].text.contains("seals"));
    }
}

fn write_zip(path: &Path, parts: &[(&str, &str)]) {
    let mut zip = zip::ZipWriter::new(fs::File::create(path).unwrap());
    for (name, body) in parts {
        zip.start_file(*name, zip::write::SimpleFileOptions::default()).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

#[test]
fn docx_paragraphs_and_heading_styles() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("care.docx");
    let document = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Chickens</w:t></w:r></w:p>
<w:p><w:r><w:t>Give them grit.</w:t></w:r></w:p>
<w:p><w:r><w:t>Collect eggs daily.</w:t></w:r></w:p>
</w:body></w:document>"#;
    write_zip(&file, &[("[Content_Types].xml", "<Types/>"), ("word/document.xml", document)]);

    let chunks = loader(ExportMode::DocChunks, 64).load_file(&file).expect("load");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].header_path, vec!["Chickens".to_string()]);
    assert_eq!(chunks[0].text, "Give them grit.\n\nCollect eggs daily.");
    assert_eq!(chunks[0].page_number, None);
}

#[test]
fn pptx_slides_become_numbered_pages() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("deck.pptx");
    let slide = |text: &str| {
        format!(
            r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#
        )
    };
    let (s1, s2, s10) = (slide("Seeds"), slide("Soil"), slide("Harvest"));
    write_zip(
        &file,
        &[("ppt/slides/slide10.xml", &s10), ("ppt/slides/slide2.xml", &s2), ("ppt/slides/slide1.xml", &s1)],
    );

    let chunks = loader(ExportMode::DocChunks, 64).load_file(&file).expect("load");
    let got: Vec<(Option<u32>, &str)> = chunks.iter().map(|c| (c.page_number, c.text.as_str())).collect();
    assert_eq!(got, vec![(Some(1), "Seeds"), (Some(2), "Soil"), (Some(10), "Harvest")]);
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_files_are_followed_and_dangling_links_skipped() {
    let tmp = TempDir::new().unwrap();
    let elsewhere = TempDir::new().unwrap();
    let target = elsewhere.path().join("real.txt");
    fs::write(&target, "linked content").unwrap();
    std::os::unix::fs::symlink(&target, tmp.path().join("a_link.txt")).unwrap();
    std::os::unix::fs::symlink(elsewhere.path().join("gone.txt"), tmp.path().join("b_dangling.txt")).unwrap();

    let outcome = loader(ExportMode::DocChunks, 64).load_path(tmp.path()).await.expect("load");
    assert_eq!(outcome.attempted, 2);
    assert_eq!(outcome.loaded, 1);
    assert_eq!(outcome.chunks[0].text, "linked content");
    assert_eq!(outcome.skipped.len(), 1);
    assert!(outcome.skipped[0].path.ends_with("b_dangling.txt"));
}
