//! Translation: external translator capability, content hashing, the
//! persistent translation memory and the batch orchestrator.

pub mod hasher;
pub mod memory;
pub mod openai;
pub mod orchestrator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{ImportReport, MemoryEdit, MemoryEntry, MemoryStats, MemoryStore};
pub use openai::OpenAiTranslator;
pub use orchestrator::{
    BatchItem, BatchReport, QualityReport, TokenEstimate, TranslationOrchestrator,
};

/// Token accounting returned by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Successful translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    pub usage: TokenUsage,
}

/// One problem found by a quality review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityIssue {
    /// `group.key` of the reviewed value.
    pub key: String,
    pub issue: String,
    pub suggestion: String,
}

/// Result of a quality review call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Review {
    pub issues: Vec<QualityIssue>,
    pub usage: TokenUsage,
}

/// Translator trait (adapter for different backends).
#[async_trait]
pub trait Translator: Send + Sync {
    /// False when the backend is switched off or lacks credentials; every
    /// `translate` call then fails with `TranslateError::Disabled`.
    fn is_enabled(&self) -> bool;

    /// Model name recorded in usage logs.
    fn model(&self) -> &str;

    async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        context: Option<&str>,
    ) -> Result<Translation, TranslateError>;

    /// Review translated values given as `group.key: value` lines.
    /// Backends without review support report `Disabled`.
    async fn review(&self, _lines: &str) -> Result<Review, TranslateError> {
        Err(TranslateError::Disabled)
    }
}

/// Failures of a single translator call. Batches count these and move on;
/// a quality review returns them to the caller.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("AI translation is disabled")]
    Disabled,
    #[error("API error: {status}: {body}")]
    Api { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("translation timeout")]
    Timeout,
    #[error("request failed: {0}")]
    Http(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}
