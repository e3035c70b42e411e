//! Ollama `/api/generate` client with streamed NDJSON decoding.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info};

use localrag_core::config::LlmSettings;
use localrag_core::error::{Error, Result};
use localrag_core::traits::{LanguageModel, TokenStream};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

/// Incremental decoder for the newline-delimited JSON body.
#[derive(Debug, Default)]
pub struct GenerateDecoder {
    buf: Vec<u8>,
    done: bool,
}

impl GenerateDecoder {
    pub fn is_done(&self) -> bool { self.done }

    /// Consume bytes and return the fragments of every complete line.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.decode_line(&line, &mut out)?;
        }
        Ok(out)
    }

    /// Flush a trailing line without a newline.
    pub fn finish(&mut self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let rest = std::mem::take(&mut self.buf);
        self.decode_line(&rest, &mut out)?;
        Ok(out)
    }

    fn decode_line(&mut self, line: &[u8], out: &mut Vec<String>) -> Result<()> {
        if self.done || line.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        let parsed: GenerateLine = serde_json::from_slice(line)
            .map_err(|e| Error::Generation(format!("malformed stream line: {e}")))?;
        if let Some(error) = parsed.error {
            return Err(Error::Generation(error));
        }
        if !parsed.response.is_empty() {
            out.push(parsed.response);
        }
        self.done = parsed.done;
        Ok(())
    }
}

struct StreamState {
    body: BoxStream<'static, Result<Vec<u8>>>,
    decoder: GenerateDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Turn a raw body stream into a token stream. Ends after `done: true`; a body
/// that closes before that is a generation error.
pub fn decode_stream(body: BoxStream<'static, Result<Vec<u8>>>) -> TokenStream {
    let state = StreamState { body, decoder: GenerateDecoder::default(), pending: VecDeque::new(), finished: false };
    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(token) = st.pending.pop_front() {
                return Some((Ok(token), st));
            }
            if st.finished {
                return None;
            }
            let decoded = match st.body.next().await {
                Some(Ok(bytes)) => st.decoder.feed(&bytes),
                Some(Err(e)) => Err(e),
                None => st.decoder.finish().and_then(|tokens| {
                    if st.decoder.is_done() {
                        Ok(tokens)
                    } else {
                        Err(Error::Generation("stream closed before the model finished".to_string()))
                    }
                }),
            };
            match decoded {
                Ok(tokens) => st.pending.extend(tokens),
                Err(e) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
            }
            if st.decoder.is_done() {
                st.finished = true;
            }
        }
    })
    .boxed()
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct OllamaGenerator {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("llm client: {e}")))?;
        let endpoint = settings.url.trim_end_matches('/').to_string();
        info!(endpoint = %endpoint, model = %settings.model, "Ollama generator configured");
        Ok(Self { client, endpoint, model: settings.model.clone() })
    }
}

#[async_trait]
impl LanguageModel for OllamaGenerator {
    fn model_id(&self) -> String { format!("ollama:{}", self.model) }

    async fn generate(&self, prompt: &str) -> Result<TokenStream> {
        debug!(chars = prompt.len(), "generating");
        let resp = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&GenerateRequest { model: &self.model, prompt, stream: true })
            .send()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body).map(|b| b.error).unwrap_or(body);
            return Err(Error::Generation(format!("{status}: {message}")));
        }
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| Error::Generation(e.to_string())))
            .boxed();
        Ok(decode_stream(body))
    }
}
