//! Answer generation
//!
//! Turns retrieved evidence into a cited answer through a remote text
//! generation API. Conversation history is owned by the caller and passed in
//! on every call.

mod detective;
mod gemini;
mod prompt;

pub use detective::{Answer, AnswerKind, Detective, TimelineEvent, INSUFFICIENT_EVIDENCE};
pub use gemini::GeminiProvider;
pub use prompt::{answer_prompt, format_context, parse_timeline, timeline_prompt};

use crate::config::LlmConfig;
use crate::error::{CasefileError, Result};
use crate::retry::RateLimitSignal;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation service is rate limiting requests")]
    RateLimited,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Generation API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Empty response from {provider}")]
    EmptyResponse { provider: String },
}

impl RateLimitSignal for GenerationError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, GenerationError::RateLimited)
    }
}

/// Who said a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Caller-owned conversation, keeping only the most recent turns
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
    max_turns: usize,
}

impl ConversationHistory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_turns,
        }
    }

    /// Append a turn, dropping the oldest ones past the limit
    ///
    /// The kept history never starts with an assistant turn whose question
    /// was dropped.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        if self.turns.len() > self.max_turns {
            let excess = self.turns.len() - self.max_turns;
            self.turns.drain(..excess);
        }
        let orphaned = self
            .turns
            .iter()
            .take_while(|turn| turn.role == Role::Assistant)
            .count();
        self.turns.drain(..orphaned);
    }

    /// Record a question and the answer it received
    pub fn record_exchange(&mut self, question: &str, answer: &str) {
        self.push(Turn::user(question));
        self.push(Turn::assistant(answer));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Trait for text generation backends
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate a reply to `prompt`, given the earlier turns of the conversation
    async fn generate(&self, history: &[Turn], prompt: &str) -> std::result::Result<String, GenerationError>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Construct the generation provider named by the configuration
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn GenerationProvider>> {
    if !config.enabled {
        return Err(CasefileError::Config(
            "Answer generation is disabled (llm.enabled = false)".to_string(),
        ));
    }

    match config.provider.as_str() {
        "gemini" => {
            let api_key = std::env::var(&config.api_key_env)
                .ok()
                .filter(|key| !key.is_empty())
                .ok_or_else(|| {
                    CasefileError::Config(format!(
                        "Environment variable {} is not set",
                        config.api_key_env
                    ))
                })?;
            Ok(Arc::new(GeminiProvider::new(
                config.base_url.clone(),
                &config.model,
                api_key,
                config.temperature,
            )))
        }
        other => Err(CasefileError::InvalidConfigValue {
            path: "llm.provider".to_string(),
            message: format!("Unknown generation provider '{}'", other),
        }),
    }
}
