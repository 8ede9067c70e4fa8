//! Answer orchestration: retrieve, prompt, generate, cite.
//!
//! The orchestrator never mutates the knowledge base, so abandoning an
//! in-flight `answer` future leaves the index untouched.

use std::sync::Arc;
use std::time::Instant;

use crate::config::{LibpalConfig, RetryConfig};
use crate::error::{GenerationError, Result};
use crate::prompt::{NO_CONTEXT_ANSWER, build_prompt};
use crate::providers::{GenerationRequest, Generator, with_retry};
use crate::retriever::Retriever;
use crate::types::ConversationTurn;

/// Per-question knobs, fixed for the lifetime of an orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerSettings {
    pub top_k: usize,
    pub max_context_chars: usize,
    pub temperature: f32,
    pub max_tokens: usize,
    pub history_turns: usize,
    pub retry: RetryConfig,
}

impl AnswerSettings {
    pub fn from_config(config: &LibpalConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            max_context_chars: config.retrieval.max_context_chars,
            temperature: config.generation.temperature,
            max_tokens: config.generation.max_tokens,
            history_turns: config.session.history_turns,
            retry: config.generation.retry.clone(),
        }
    }
}

impl Default for AnswerSettings {
    fn default() -> Self {
        Self::from_config(&LibpalConfig::default())
    }
}

/// Turns a question into a grounded, cited answer.
pub struct Orchestrator {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    settings: AnswerSettings,
}

impl Orchestrator {
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>, settings: AnswerSettings) -> Self {
        Self {
            retriever,
            generator,
            settings,
        }
    }

    pub fn settings(&self) -> &AnswerSettings {
        &self.settings
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answer `question` from the knowledge base.
    ///
    /// With no retrievable context the returned turn carries the fixed
    /// no-context answer and the generator is never called. Embedding and
    /// generation failures are returned as errors after at most one retry of
    /// a transient generation failure.
    pub async fn answer(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<ConversationTurn> {
        let started = Instant::now();

        let citations = self
            .retriever
            .retrieve(
                question,
                self.settings.top_k,
                self.settings.max_context_chars,
            )
            .await?;

        if citations.is_empty() {
            tracing::info!("No relevant context found; answering without generation");
            return Ok(ConversationTurn::new(
                question,
                NO_CONTEXT_ANSWER,
                Vec::new(),
                false,
                elapsed_ms(started),
            ));
        }

        let request = GenerationRequest {
            prompt: build_prompt(question, &citations, history, self.settings.history_turns),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let answer = with_retry(&self.settings.retry, || {
            let generator = self.generator.clone();
            let request = request.clone();
            async move {
                let text = generator.generate(&request).await?;
                if text.trim().is_empty() {
                    return Err(GenerationError::EmptyResponse);
                }
                Ok(text)
            }
        })
        .await
        .inspect_err(|e| {
            tracing::warn!(model = self.generator.model_name(), error = %e, "Generation failed");
        })?;

        let latency_ms = elapsed_ms(started);
        tracing::info!(
            model = self.generator.model_name(),
            sources = citations.len(),
            latency_ms,
            "Answer generated"
        );

        Ok(ConversationTurn::new(
            question,
            answer.trim(),
            citations,
            true,
            latency_ms,
        ))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
