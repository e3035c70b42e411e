use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use localrag_core::config::{EmbeddingProviderKind, EmbeddingSettings};
use localrag_core::error::{Error, Result};
use localrag_core::traits::Embedder;
use localrag_embed::{embed_query, embed_with_retry, get_default_embedder, FakeEmbedder};

fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

#[tokio::test]
async fn fake_embedder_shapes_and_determinism() {
    let settings = EmbeddingSettings { provider: EmbeddingProviderKind::Fake, dimension: 256, ..Default::default() };
    let embedder = get_default_embedder(&settings).expect("embedder");
    assert_eq!(embedder.embedder_id(), settings.embedder_id());

    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).await.expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 256);

    // Norm approximately 1.0
    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    // Deterministic for same input
    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn fake_embedder_ranks_shared_words_higher() {
    let e = FakeEmbedder::new(512);
    let q = e.embed_text("How do I prime the water pump?");
    let near = e.embed_text("Prime the water pump before first use.");
    let far = e.embed_text("Chickens need grit and oyster shell.");
    assert!(cosine(&q, &near) > cosine(&q, &far));
}

struct Flaky {
    failures: usize,
    calls: AtomicUsize,
    inner: FakeEmbedder,
}

#[async_trait]
impl Embedder for Flaky {
    fn embedder_id(&self) -> String { self.inner.embedder_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn max_input_tokens(&self) -> usize { 512 }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(Error::Embedding("model is loading".to_string()));
        }
        self.inner.embed_batch(texts).await
    }
}

#[tokio::test]
async fn retry_recovers_from_transient_failures() {
    let flaky = Flaky { failures: 2, calls: AtomicUsize::new(0), inner: FakeEmbedder::new(8) };
    let texts = vec!["a".to_string()];
    let out = embed_with_retry(&flaky, &texts, 2).await.expect("retried");
    assert_eq!(out.len(), 1);
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_gives_up_and_keeps_provider_message() {
    let flaky = Flaky { failures: 10, calls: AtomicUsize::new(0), inner: FakeEmbedder::new(8) };
    let texts = vec!["a".to_string()];
    let err = embed_with_retry(&flaky, &texts, 0).await.unwrap_err();
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 1, "no implicit retry");
    assert!(err.to_string().contains("model is loading"));
}

struct WrongDim;

#[async_trait]
impl Embedder for WrongDim {
    fn embedder_id(&self) -> String { "wrong:d4".to_string() }
    fn dim(&self) -> usize { 4 }
    fn max_input_tokens(&self) -> usize { 512 }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.5; 3]).collect())
    }
}

#[tokio::test]
async fn dimension_mismatch_is_configuration_error_and_not_retried() {
    let texts = vec!["a".to_string()];
    let err = embed_with_retry(&WrongDim, &texts, 3).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 3 }));
    assert!(err.is_configuration());
    assert!(embed_query(&WrongDim, "q").await.is_err());
}

/// Serves a single canned HTTP response and returns the request body.
async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];
        let header_end = loop {
            let n = sock.read(&mut tmp).await.unwrap();
            buf.extend_from_slice(&tmp[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") { break pos + 4; }
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let len: usize = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:").map(|v| v.trim().parse().unwrap()))
            .unwrap_or(0);
        while buf.len() < header_end + len {
            let n = sock.read(&mut tmp).await.unwrap();
            buf.extend_from_slice(&tmp[..n]);
        }
        let resp = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        sock.write_all(resp.as_bytes()).await.unwrap();
        String::from_utf8_lossy(&buf[header_end..]).to_string()
    });
    (url, handle)
}

#[tokio::test]
async fn ollama_embedder_posts_model_and_inputs() {
    let (url, server) = serve_once("200 OK", r#"{"model":"m","embeddings":[[0.1,0.2,0.3],[0.4,0.5,0.6]]}"#).await;
    let settings = EmbeddingSettings { url, model: "m".into(), dimension: 3, ..Default::default() };
    let embedder = get_default_embedder(&settings).unwrap();
    let out = embed_with_retry(embedder.as_ref(), &["a".to_string(), "b".to_string()], 0).await.expect("embed");
    assert_eq!(out[1], vec![0.4, 0.5, 0.6]);
    let request: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
    assert_eq!(request["model"], "m");
    assert_eq!(request["input"][0], "a");
}

#[tokio::test]
async fn ollama_error_message_is_propagated() {
    let (url, _server) = serve_once("404 Not Found", r#"{"error":"model \"m\" not found, try pulling it first"}"#).await;
    let settings = EmbeddingSettings { url, model: "m".into(), dimension: 3, ..Default::default() };
    let embedder = get_default_embedder(&settings).unwrap();
    let err = embedder.embed_batch(&["a".to_string()]).await.unwrap_err();
    assert!(matches!(&err, Error::Embedding(msg) if msg.contains("model \"m\" not found, try pulling it first")));
}
