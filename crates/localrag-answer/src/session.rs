//! Per-question answer state machine.
//!
//! `Idle -> Retrieving -> ContextAssembled -> Generating -> Streaming -> Completed`,
//! with `Failed` reachable from every non-terminal phase. Tokens are forwarded
//! to the caller as they arrive; whatever was streamed before a failure stays
//! in the answer.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use localrag_core::config::Settings;
use localrag_core::error::{Error, Result};
use localrag_core::traits::{Embedder, LanguageModel, VectorIndex};
use localrag_core::types::SearchHit;
use localrag_embed::embed_query;

use crate::citations::CitationSet;
use crate::prompt::{assemble_context, render_prompt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerPhase {
    Idle,
    Retrieving,
    ContextAssembled,
    Generating,
    Streaming,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerEvent {
    Token(String),
    /// Rendered citation block, one `path#page=N` per line.
    Sources(String),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct StreamedAnswer {
    pub question: String,
    pub text: String,
    pub citations: CitationSet,
    pub phase: AnswerPhase,
    pub error: Option<String>,
    pub retrieved: usize,
}

impl StreamedAnswer {
    fn new(question: &str) -> Self {
        Self {
            question: question.to_string(),
            text: String::new(),
            citations: CitationSet::default(),
            phase: AnswerPhase::Idle,
            error: None,
            retrieved: 0,
        }
    }

    pub fn citation_block(&self) -> Option<String> { self.citations.render() }

    pub fn is_completed(&self) -> bool { self.phase == AnswerPhase::Completed }

    /// Answer text, then the error notice. Sources are only listed for a
    /// completed answer.
    pub fn render(&self) -> String {
        let mut out = self.text.clone();
        if let Some(error) = &self.error {
            out.push_str(&format!("\n\n[error] {error}"));
        }
        if let Some(block) = self.citation_block().filter(|_| self.is_completed()) {
            out.push_str("\n\nSources:\n");
            out.push_str(&block);
        }
        out
    }
}

/// Read-only pieces shared by every session.
#[derive(Clone)]
pub struct RagComponents {
    pub index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LanguageModel>,
    pub collection: String,
    pub top_k: usize,
}

impl RagComponents {
    pub fn new(
        settings: &Settings,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self { index, embedder, llm, collection: settings.index.collection.clone(), top_k: settings.retrieval.top_k }
    }

    pub fn session(&self) -> RagSession { RagSession { parts: self.clone(), phase: AnswerPhase::Idle, answered: 0 } }
}

/// One conversation; `ask` takes `&mut self`, so a session never has two
/// questions in flight.
pub struct RagSession {
    parts: RagComponents,
    phase: AnswerPhase,
    answered: usize,
}

// Configuration errors pass through unchanged.
fn as_retrieval(e: Error) -> Error {
    if e.is_configuration() || matches!(e, Error::Retrieval(_)) { e } else { Error::Retrieval(e.to_string()) }
}

fn as_generation(e: Error) -> Error {
    if e.is_configuration() || matches!(e, Error::Generation(_)) { e } else { Error::Generation(e.to_string()) }
}

impl RagSession {
    pub fn phase(&self) -> AnswerPhase { self.phase }
    pub fn answered(&self) -> usize { self.answered }

    pub async fn retrieve(&self, question: &str) -> Result<Vec<SearchHit>> {
        let query = embed_query(self.parts.embedder.as_ref(), question).await.map_err(as_retrieval)?;
        self.parts
            .index
            .search(&self.parts.collection, &self.parts.embedder.embedder_id(), &query, self.parts.top_k)
            .await
            .map_err(as_retrieval)
    }

    pub async fn ask(&mut self, question: &str, events: &mpsc::Sender<AnswerEvent>) -> StreamedAnswer {
        let mut answer = StreamedAnswer::new(question);
        let result = self.run(&mut answer, events).await;
        match result {
            Ok(()) => {
                answer.phase = AnswerPhase::Completed;
                info!(chars = answer.text.len(), sources = answer.citations.len(), "answer completed");
            }
            Err(e) => {
                warn!(phase = ?answer.phase, error = %e, "answer failed");
                let notice = e.to_string();
                answer.phase = AnswerPhase::Failed;
                answer.error = Some(notice.clone());
                // best effort: the consumer may be gone
                let _ = events.send(AnswerEvent::Error(notice)).await;
            }
        }
        self.phase = answer.phase;
        self.answered += 1;
        answer
    }

    async fn run(&mut self, answer: &mut StreamedAnswer, events: &mpsc::Sender<AnswerEvent>) -> Result<()> {
        self.set_phase(answer, AnswerPhase::Retrieving);
        let hits = self.retrieve(&answer.question).await?;
        answer.retrieved = hits.len();

        let context = assemble_context(&hits);
        answer.citations = CitationSet::from_hits(&hits);
        self.set_phase(answer, AnswerPhase::ContextAssembled);
        debug!(chunks = hits.len(), citations = answer.citations.len(), "context assembled");

        let prompt = render_prompt(&context, &answer.question);
        self.set_phase(answer, AnswerPhase::Generating);
        let mut tokens = self.parts.llm.generate(&prompt).await.map_err(as_generation)?;

        self.set_phase(answer, AnswerPhase::Streaming);
        while let Some(token) = tokens.next().await {
            let token = token.map_err(as_generation)?;
            if events.send(AnswerEvent::Token(token.clone())).await.is_err() {
                return Err(Error::Generation("consumer disconnected".to_string()));
            }
            answer.text.push_str(&token);
        }

        if let Some(block) = answer.citation_block() {
            if events.send(AnswerEvent::Sources(block)).await.is_err() {
                return Err(Error::Generation("consumer disconnected".to_string()));
            }
        }
        Ok(())
    }

    fn set_phase(&mut self, answer: &mut StreamedAnswer, phase: AnswerPhase) {
        answer.phase = phase;
        self.phase = phase;
    }
}
