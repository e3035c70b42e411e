use std::sync::Arc;

use localrag_core::config::LlmSettings;
use localrag_core::error::Result;
use localrag_core::traits::LanguageModel;

pub mod citations;
pub mod ollama;
pub mod prompt;
pub mod session;

pub use citations::CitationSet;
pub use ollama::OllamaGenerator;
pub use session::{AnswerEvent, AnswerPhase, RagComponents, RagSession, StreamedAnswer};

pub fn build_generator(settings: &LlmSettings) -> Result<Arc<dyn LanguageModel>> {
    Ok(Arc::new(OllamaGenerator::new(settings)?))
}
