use std::sync::Arc;

use crate::database::VectorStore;
use crate::error::PipelineError;
use crate::providers::traits::{CompletionProvider, ProviderError};

const RAG_TEMPLATE: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Use three sentences maximum and keep the answer concise.

Context: {context}

Question: {question}

Helpful Answer:";

/// Fills the answering template with the question and retrieved chunks.
pub fn render_prompt(question: &str, context: &[String]) -> String {
    RAG_TEMPLATE
        .replace("{context}", &context.join("\n\n"))
        .replace("{question}", question)
}

/// Answers one question from retrieved context. Stateless between calls.
#[derive(Clone)]
pub struct AnswerGenerator {
    provider: Arc<dyn CompletionProvider>,
}

impl AnswerGenerator {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    /// Returns the model's text exactly as produced.
    pub async fn answer(&self, question: &str, context: &[String]) -> Result<String, ProviderError> {
        let prompt = render_prompt(question, context);
        log::debug!(
            "Asking {} with {} context chunks",
            self.provider.model_id(),
            context.len()
        );
        self.provider.complete(&prompt).await
    }

    /// Retrieves the `k` closest chunks from `store`, then answers.
    pub async fn ask(&self, store: &VectorStore, question: &str, k: usize) -> Result<String, PipelineError> {
        let context = store.query(question, k).await?;
        log::info!("Retrieved {} chunks for question", context.len());
        self.answer(question, &context)
            .await
            .map_err(PipelineError::Generation)
    }
}
