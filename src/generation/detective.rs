//! Evidence-grounded answering and timeline extraction

use super::{
    answer_prompt, parse_timeline, timeline_prompt, ConversationHistory, GenerationProvider, Turn,
};
use crate::error::Result;
use crate::ingest::EvidenceDocument;
use crate::retrieval::{EvidenceHit, Retriever};
use crate::retry::{with_retry, RetryOutcome, RetryPolicy, UNAVAILABLE_MESSAGE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Reply used when retrieval finds nothing to ground an answer on
pub const INSUFFICIENT_EVIDENCE: &str = "I don't have enough evidence to answer that.";

/// How an answer was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// Generated from retrieved evidence
    Generated,
    /// Nothing relevant was retrieved
    NoEvidence,
    /// A remote service kept rate limiting
    Unavailable,
    /// Retrieval or generation failed with a non rate-limit error
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<EvidenceHit>,
    pub kind: AnswerKind,
}

impl Answer {
    fn no_evidence() -> Self {
        Self {
            text: INSUFFICIENT_EVIDENCE.to_string(),
            sources: Vec::new(),
            kind: AnswerKind::NoEvidence,
        }
    }

    fn unavailable(sources: Vec<EvidenceHit>) -> Self {
        Self {
            text: UNAVAILABLE_MESSAGE.to_string(),
            sources,
            kind: AnswerKind::Unavailable,
        }
    }
}

/// One dated event extracted from the evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub time: String,
    pub event: String,
    pub source: String,
}

/// Answers questions from the evidence store
pub struct Detective {
    retriever: Arc<Retriever>,
    generator: Arc<dyn GenerationProvider>,
    retry: RetryPolicy,
    top_k: usize,
}

impl Detective {
    pub fn new(
        retriever: Arc<Retriever>,
        generator: Arc<dyn GenerationProvider>,
        retry: RetryPolicy,
        top_k: usize,
    ) -> Self {
        Self {
            retriever,
            generator,
            retry,
            top_k,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Answer `question` from the nearest evidence, citing sources
    ///
    /// `history` is sent as-is; trimming it is the caller's job.
    pub async fn ask(&self, question: &str, history: &[Turn]) -> Result<Answer> {
        let hits = match self.retriever.search(question, self.top_k).await? {
            RetryOutcome::Succeeded(result) => result.hits,
            RetryOutcome::Exhausted { .. } => return Ok(Answer::unavailable(Vec::new())),
        };

        if hits.is_empty() {
            tracing::info!("No evidence retrieved for question");
            return Ok(Answer::no_evidence());
        }

        let prompt = answer_prompt(question, &hits);
        let outcome = with_retry(&self.retry, "Answer generation", || {
            self.generator.generate(history, &prompt)
        })
        .await?;

        Ok(match outcome {
            RetryOutcome::Succeeded(text) => Answer {
                text: text.trim().to_string(),
                sources: hits,
                kind: AnswerKind::Generated,
            },
            RetryOutcome::Exhausted { .. } => Answer::unavailable(hits),
        })
    }

    /// One interactive turn: answer, and record the exchange if it was generated
    ///
    /// Errors become a `Failed` answer carrying the error text so that a chat
    /// session outlives a failed request.
    pub async fn converse(&self, question: &str, history: &mut ConversationHistory) -> Answer {
        match self.ask(question, history.turns()).await {
            Ok(answer) => {
                if answer.kind == AnswerKind::Generated {
                    history.record_exchange(question, &answer.text);
                }
                answer
            }
            Err(e) => {
                tracing::warn!("Question failed: {e}");
                Answer {
                    text: format!("Error: {e}"),
                    sources: Vec::new(),
                    kind: AnswerKind::Failed,
                }
            }
        }
    }

    /// Ask the model for a chronological list of events across all documents
    ///
    /// A reply that is not a JSON event list is logged and treated as an
    /// empty timeline.
    pub async fn extract_timeline(
        &self,
        documents: &[EvidenceDocument],
    ) -> Result<RetryOutcome<Vec<TimelineEvent>>> {
        if documents.is_empty() {
            return Ok(RetryOutcome::Succeeded(Vec::new()));
        }

        let prompt = timeline_prompt(documents);
        let outcome = with_retry(&self.retry, "Timeline extraction", || {
            self.generator.generate(&[], &prompt)
        })
        .await?;

        Ok(outcome.map(|reply| match parse_timeline(&reply) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("Could not parse timeline reply: {e}");
                Vec::new()
            }
        }))
    }
}
